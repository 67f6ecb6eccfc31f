//! Up/down tracking of docker daemons, one poller per watched context.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span};

use crate::{
    cache::PingCache,
    context::ContextKey,
    poll::spawn_poll_loop,
    subscribers::{notify_all, notify_one, Callback, Subscribers},
};

#[derive(Debug)]
struct ContextHealth {
    /// `None` until the first probe finished.
    up: Option<bool>,
    subscribers: Subscribers<bool>,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct Inner {
    cache: Arc<PingCache>,
    interval: Duration,
    shutdown: CancellationToken,
    contexts: Mutex<HashMap<ContextKey, ContextHealth>>,
}

impl Inner {
    fn contexts(&self) -> MutexGuard<'_, HashMap<ContextKey, ContextHealth>> {
        self.contexts.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn probe(&self, context: &ContextKey, token: &CancellationToken) {
        let up = self.cache.cached_ping(context).await;

        let callbacks = {
            let mut contexts = self.contexts();
            let Some(health) = contexts.get_mut(context) else {
                return;
            };
            // A late probe of a monitor that was torn down and recreated.
            if token.is_cancelled() {
                return;
            }
            if health.up == Some(up) {
                return;
            }
            let previous = health.up.replace(up);
            info!(context = %context, ?previous, up, "Docker health changed");
            health.subscribers.callbacks()
        };

        notify_all(&callbacks, &up);
    }
}

/// Watches whether the daemon behind each subscribed context answers.
///
/// Subscribers hear about transitions only. Polling starts with the first
/// subscriber of a context and stops when the last one leaves.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    inner: Arc<Inner>,
}

impl HealthMonitor {
    pub fn new(cache: Arc<PingCache>, interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                interval,
                shutdown,
                contexts: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register `callback` under `id` for `context`, replacing an earlier
    /// callback with the same id. Called right away when the state is known.
    pub fn subscribe(&self, context: &ContextKey, id: impl Into<String>, callback: Callback<bool>) {
        let id = id.into();
        let known = {
            let mut contexts = self.inner.contexts();
            let health = contexts.entry(context.clone()).or_insert_with(|| {
                info!(context = %context, "Starting health monitor");
                let cancel = self.inner.shutdown.child_token();
                self.spawn_poller(context.clone(), cancel.clone());
                ContextHealth {
                    up: None,
                    subscribers: Subscribers::default(),
                    cancel,
                }
            });
            health.subscribers.insert(id.clone(), callback.clone());
            health.up
        };

        if let Some(up) = known {
            notify_one(&id, &callback, &up);
        }
    }

    /// Remove subscriber `id`. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, context: &ContextKey, id: &str) -> bool {
        let mut contexts = self.inner.contexts();
        let Some(health) = contexts.get_mut(context) else {
            return false;
        };
        let removed = health.subscribers.remove(id);
        if health.subscribers.is_empty() {
            if let Some(health) = contexts.remove(context) {
                health.cancel.cancel();
                info!(context = %context, "Stopped health monitor");
            }
        }
        removed
    }

    /// Last known state; `None` before the first probe or when unwatched.
    pub fn state(&self, context: &ContextKey) -> Option<bool> {
        self.inner.contexts().get(context).and_then(|h| h.up)
    }

    pub fn is_watching(&self, context: &ContextKey) -> bool {
        self.inner.contexts().contains_key(context)
    }

    fn spawn_poller(&self, context: ContextKey, cancel: CancellationToken) {
        let inner = self.inner.clone();
        let token = cancel.clone();
        let span = info_span!("health_poll", context = %context);
        spawn_poll_loop(span, cancel, Duration::ZERO, self.inner.interval, move || {
            let inner = inner.clone();
            let context = context.clone();
            let token = token.clone();
            async move {
                inner.probe(&context, &token).await;
                debug!("Health probe done");
            }
        });
    }
}
