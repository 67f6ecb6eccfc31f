//! The configured docker contexts, polled while anyone is interested.

use std::{
    sync::{atomic::AtomicBool, Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, instrument};

use crate::{
    docker::{ContextRecord, ContextSnapshot, DockerClient},
    poll::{spawn_poll_loop, InFlight, PollOutcome},
    subscribers::{notify_all, notify_one, Callback, Subscribers},
};

#[derive(Debug, Default)]
struct State {
    snapshot: Option<Arc<ContextSnapshot>>,
    subscribers: Subscribers<Arc<ContextSnapshot>>,
    polling: Arc<AtomicBool>,
    /// Set while the poll loop runs.
    cancel: Option<CancellationToken>,
}

#[derive(Debug)]
struct Inner {
    docker: DockerClient,
    interval: Duration,
    first_delay: Duration,
    shutdown: CancellationToken,
    state: Mutex<State>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[instrument(skip(self))]
    async fn poll(&self) -> PollOutcome {
        let in_flight = {
            let state = self.state();
            if state.cancel.is_none() {
                return PollOutcome::Inactive;
            }
            match InFlight::try_acquire(&state.polling) {
                Some(guard) => guard,
                None => return PollOutcome::Skipped,
            }
        };

        let next: ContextSnapshot = self
            .docker
            .list_contexts()
            .await
            .into_iter()
            .map(|record: ContextRecord| (record.name.clone(), record))
            .collect();

        let (snapshot, callbacks) = {
            let mut state = self.state();
            if state.cancel.is_none() || !in_flight.guards(&state.polling) {
                return PollOutcome::Inactive;
            }
            let changed = state
                .snapshot
                .as_deref()
                .map_or(true, |previous| !previous.keys().eq(next.keys()));
            if !changed {
                return PollOutcome::Unchanged;
            }
            debug!(contexts = next.len(), "Context list changed");
            let snapshot = Arc::new(next);
            state.snapshot = Some(snapshot.clone());
            (snapshot, state.subscribers.callbacks())
        };

        drop(in_flight);
        notify_all(&callbacks, &snapshot);
        PollOutcome::Changed
    }
}

/// Global list of docker contexts with the same subscription lifecycle as
/// the [`ContainerStore`](crate::containers::ContainerStore).
#[derive(Debug, Clone)]
pub struct ContextStore {
    inner: Arc<Inner>,
}

impl ContextStore {
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
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn subscribe(&self, id: impl Into<String>, callback: Callback<Arc<ContextSnapshot>>) {
        let id = id.into();
        let current = {
            let mut state = self.inner.state();
            if state.cancel.is_none() {
                info!("Starting context polling");
                let cancel = self.inner.shutdown.child_token();
                self.spawn_poller(cancel.clone());
                state.cancel = Some(cancel);
            }
            state.subscribers.insert(id.clone(), callback.clone());
            state.snapshot.clone()
        };

        if let Some(snapshot) = current {
            notify_one(&id, &callback, &snapshot);
        }
    }

    pub fn unsubscribe(&self, id: &str) -> bool {
        let mut state = self.inner.state();
        let removed = state.subscribers.remove(id);
        if state.subscribers.is_empty() {
            if let Some(cancel) = state.cancel.take() {
                cancel.cancel();
                info!("Stopped context polling");
            }
            state.snapshot = None;
            // Fresh flag so a poll of the stopped loop cannot block the next.
            state.polling = Arc::default();
        }
        removed
    }

    pub fn snapshot(&self) -> Option<Arc<ContextSnapshot>> {
        self.inner.state().snapshot.clone()
    }

    pub async fn poll_now(&self) -> PollOutcome {
        self.inner.poll().await
    }

    fn spawn_poller(&self, cancel: CancellationToken) {
        let inner = self.inner.clone();
        spawn_poll_loop(
            info_span!("context_poll"),
            cancel,
            self.inner.first_delay,
            self.inner.interval,
            move || {
                let inner = inner.clone();
                async move {
                    inner.poll().await;
                }
            },
        );
    }
}
