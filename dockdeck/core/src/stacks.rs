//! Compose project and swarm stack summaries derived from container
//! snapshots.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    containers::ContainerStore,
    context::ContextKey,
    docker::{ContainerSnapshot, StackRecord, StackSnapshot},
    subscribers::{notify_all, notify_one, Callback, Subscribers},
};

/// Group containers by compose project (or swarm stack namespace) and count
/// running and total members. Containers without either label are ignored.
pub fn aggregate(containers: &ContainerSnapshot) -> StackSnapshot {
    let mut stacks = StackSnapshot::new();
    for record in containers.values() {
        let Some(name) = record.stack_name() else {
            continue;
        };
        let stack = stacks
            .entry(name.to_string())
            .or_insert_with(|| StackRecord::new(name.to_string(), 0, 0));
        stack.total += 1;
        if record.state.is_running() {
            stack.running += 1;
        }
    }
    stacks
}

#[derive(Debug)]
struct ContextStacks {
    snapshot: Option<Arc<StackSnapshot>>,
    subscribers: Subscribers<Arc<StackSnapshot>>,
    /// Id of our own subscription on the container store.
    container_subscription: String,
}

#[derive(Debug)]
struct Inner {
    containers: ContainerStore,
    contexts: Mutex<HashMap<ContextKey, ContextStacks>>,
}

impl Inner {
    fn contexts(&self) -> MutexGuard<'_, HashMap<ContextKey, ContextStacks>> {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn on_containers(&self, context: &ContextKey, containers: &ContainerSnapshot) {
        let next = aggregate(containers);
        let (snapshot, callbacks) = {
            let mut contexts = self.contexts();
            let Some(entry) = contexts.get_mut(context) else {
                return;
            };
            if entry.snapshot.as_deref() == Some(&next) {
                return;
            }
            debug!(context = %context, stacks = next.len(), "Stack summary changed");
            let snapshot = Arc::new(next);
            entry.snapshot = Some(snapshot.clone());
            (snapshot, entry.subscribers.callbacks())
        };
        notify_all(&callbacks, &snapshot);
    }
}

/// Per-context stack summaries, recomputed whenever the
/// [`ContainerStore`] publishes a new container set and pushed to
/// subscribers only when a count changed.
#[derive(Debug, Clone)]
pub struct StackAggregator {
    inner: Arc<Inner>,
}

impl StackAggregator {
    pub fn new(containers: ContainerStore) -> Self {
        Self {
            inner: Arc::new(Inner {
                containers,
                contexts: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(
        &self,
        context: &ContextKey,
        id: impl Into<String>,
        callback: Callback<Arc<StackSnapshot>>,
    ) {
        let id = id.into();
        let (current, new_subscription) = {
            let mut contexts = self.inner.contexts();
            let mut new_subscription = None;
            let entry = contexts.entry(context.clone()).or_insert_with(|| {
                let subscription = format!("stacks-{}", Uuid::new_v4());
                info!(context = %context, %subscription, "Starting stack aggregation");
                new_subscription = Some(subscription.clone());
                ContextStacks {
                    snapshot: self
                        .inner
                        .containers
                        .snapshot(context)
                        .map(|containers| Arc::new(aggregate(&containers))),
                    subscribers: Subscribers::default(),
                    container_subscription: subscription,
                }
            });
            entry.subscribers.insert(id.clone(), callback.clone());
            (entry.snapshot.clone(), new_subscription)
        };

        // Outside our lock: the container store may call back right away.
        if let Some(subscription) = new_subscription {
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            let target = context.clone();
            self.inner.containers.subscribe(
                context,
                subscription.clone(),
                Arc::new(move |containers: &Arc<ContainerSnapshot>| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_containers(&target, containers);
                    }
                }),
            );
            // Torn down by a concurrent unsubscribe before we got here.
            if self.container_subscription(context).as_deref() != Some(subscription.as_str()) {
                self.inner.containers.unsubscribe(context, &subscription);
            }
        }

        if let Some(snapshot) = current {
            notify_one(&id, &callback, &snapshot);
        }
    }

    /// Remove subscriber `id`. The last one out also drops the internal
    /// container subscription.
    pub fn unsubscribe(&self, context: &ContextKey, id: &str) -> bool {
        let (removed, released) = {
            let mut contexts = self.inner.contexts();
            let Some(entry) = contexts.get_mut(context) else {
                return false;
            };
            let removed = entry.subscribers.remove(id);
            let released = if entry.subscribers.is_empty() {
                contexts
                    .remove(context)
                    .map(|entry| entry.container_subscription)
            } else {
                None
            };
            (removed, released)
        };

        if let Some(subscription) = released {
            self.inner.containers.unsubscribe(context, &subscription);
            info!(context = %context, %subscription, "Stopped stack aggregation");
        }
        removed
    }

    pub fn snapshot(&self, context: &ContextKey) -> Option<Arc<StackSnapshot>> {
        self.inner
            .contexts()
            .get(context)
            .and_then(|entry| entry.snapshot.clone())
    }

    /// Id of the aggregator's own container subscription for `context`.
    pub fn container_subscription(&self, context: &ContextKey) -> Option<String> {
        self.inner
            .contexts()
            .get(context)
            .map(|entry| entry.container_subscription.clone())
    }
}
