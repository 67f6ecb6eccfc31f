//! Per-context container snapshots kept fresh by polling `docker ps -a`.

use std::{
    collections::HashMap,
    sync::{atomic::AtomicBool, Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, instrument};

use crate::{
    context::ContextKey,
    docker::{ContainerSnapshot, DockerClient},
    poll::{spawn_poll_loop, InFlight, PollOutcome},
    subscribers::{notify_all, notify_one, Callback, Subscribers},
};

/// Whether `next` differs from `previous` in membership or in the state of
/// any container. Label changes alone do not count.
pub fn snapshot_changed(previous: &ContainerSnapshot, next: &ContainerSnapshot) -> bool {
    previous.len() != next.len()
        || next
            .iter()
            .any(|(name, record)| previous.get(name).map(|p| &p.state) != Some(&record.state))
}

#[derive(Debug)]
struct ContextContainers {
    snapshot: Option<Arc<ContainerSnapshot>>,
    subscribers: Subscribers<Arc<ContainerSnapshot>>,
    polling: Arc<AtomicBool>,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct Inner {
    docker: DockerClient,
    interval: Duration,
    first_delay: Duration,
    shutdown: CancellationToken,
    contexts: Mutex<HashMap<ContextKey, ContextContainers>>,
}

impl Inner {
    fn contexts(&self) -> MutexGuard<'_, HashMap<ContextKey, ContextContainers>> {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[instrument(skip(self), fields(context = %context))]
    async fn poll(&self, context: &ContextKey) -> PollOutcome {
        let in_flight = {
            let contexts = self.contexts();
            let Some(entry) = contexts.get(context) else {
                return PollOutcome::Inactive;
            };
            match InFlight::try_acquire(&entry.polling) {
                Some(guard) => guard,
                None => {
                    debug!("Previous poll still running, skipping");
                    return PollOutcome::Skipped;
                }
            }
        };

        let records = match self.docker.list_containers(context, true, &[]).await {
            Ok(records) => records,
            Err(e) => {
                debug!(error = %e, "Container poll failed");
                return PollOutcome::Failed;
            }
        };
        let next: ContainerSnapshot = records
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect();

        let (snapshot, callbacks) = {
            let mut contexts = self.contexts();
            let Some(entry) = contexts.get_mut(context) else {
                return PollOutcome::Inactive;
            };
            if !in_flight.guards(&entry.polling) {
                return PollOutcome::Inactive;
            }
            let changed = entry
                .snapshot
                .as_deref()
                .map_or(true, |previous| snapshot_changed(previous, &next));
            if !changed {
                return PollOutcome::Unchanged;
            }

            debug!(containers = next.len(), "Container set changed");
            let snapshot = Arc::new(next);
            entry.snapshot = Some(snapshot.clone());
            (snapshot, entry.subscribers.callbacks())
        };

        drop(in_flight);
        notify_all(&callbacks, &snapshot);
        PollOutcome::Changed
    }
}

/// Shared view of the containers of every subscribed context.
///
/// Each context gets its own polling loop while it has subscribers. The
/// first fetch of a new context happens shortly after the first subscriber
/// arrives; afterwards the regular interval applies and a tick is skipped
/// while the previous fetch is still running.
#[derive(Debug, Clone)]
pub struct ContainerStore {
    inner: Arc<Inner>,
}

impl ContainerStore {
    pub fn new(
        docker: DockerClient,
        interval: Duration,
        first_delay: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                docker,
                interval,
                first_delay,
                shutdown,
                contexts: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register `callback` under `id`. A populated store pushes its current
    /// snapshot to the new subscriber immediately.
    pub fn subscribe(
        &self,
        context: &ContextKey,
        id: impl Into<String>,
        callback: Callback<Arc<ContainerSnapshot>>,
    ) {
        let id = id.into();
        let current = {
            let mut contexts = self.inner.contexts();
            let entry = contexts.entry(context.clone()).or_insert_with(|| {
                info!(context = %context, "Starting container polling");
                let cancel = self.inner.shutdown.child_token();
                self.spawn_poller(context.clone(), cancel.clone());
                ContextContainers {
                    snapshot: None,
                    subscribers: Subscribers::default(),
                    polling: Arc::new(AtomicBool::new(false)),
                    cancel,
                }
            });
            entry.subscribers.insert(id.clone(), callback.clone());
            entry.snapshot.clone()
        };

        if let Some(snapshot) = current {
            notify_one(&id, &callback, &snapshot);
        }
    }

    /// Remove subscriber `id`; the last one out stops polling and frees the
    /// snapshot. Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, context: &ContextKey, id: &str) -> bool {
        let mut contexts = self.inner.contexts();
        let Some(entry) = contexts.get_mut(context) else {
            return false;
        };
        let removed = entry.subscribers.remove(id);
        if entry.subscribers.is_empty() {
            if let Some(entry) = contexts.remove(context) {
                entry.cancel.cancel();
                info!(context = %context, "Stopped container polling");
            }
        }
        removed
    }

    pub fn snapshot(&self, context: &ContextKey) -> Option<Arc<ContainerSnapshot>> {
        self.inner
            .contexts()
            .get(context)
            .and_then(|entry| entry.snapshot.clone())
    }

    pub fn subscriber_count(&self, context: &ContextKey) -> usize {
        self.inner
            .contexts()
            .get(context)
            .map_or(0, |entry| entry.subscribers.len())
    }

    pub fn is_polling(&self, context: &ContextKey) -> bool {
        self.inner.contexts().contains_key(context)
    }

    /// Refresh `context` now instead of waiting for the next tick.
    pub async fn poll_now(&self, context: &ContextKey) -> PollOutcome {
        self.inner.poll(context).await
    }

    fn spawn_poller(&self, context: ContextKey, cancel: CancellationToken) {
        let inner = self.inner.clone();
        let span = info_span!("container_poll", context = %context);
        spawn_poll_loop(
            span,
            cancel,
            self.inner.first_delay,
            self.inner.interval,
            move || {
                let inner = inner.clone();
                let context = context.clone();
                async move {
                    inner.poll(&context).await;
                }
            },
        );
    }
}
