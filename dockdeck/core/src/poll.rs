//! Cancellable fixed-cadence loop shared by the polled stores.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument, Span};

/// Call `tick` after `first_delay` and then every `period` until `token` is
/// cancelled. A tick in progress is abandoned on cancellation.
pub(crate) fn spawn_poll_loop<F, Fut>(
    span: Span,
    token: CancellationToken,
    first_delay: Duration,
    period: Duration,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(
        async move {
            let mut ticker = time::interval_at(Instant::now() + first_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick() => {}
                }
            }
            debug!("Polling stopped");
        }
        .instrument(span),
    )
}

/// Marks a poll as in flight until dropped.
#[derive(Debug)]
pub(crate) struct InFlight {
    flag: Arc<AtomicBool>,
}

impl InFlight {
    /// `None` when another poll already holds `flag`.
    pub(crate) fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }

    /// Whether this guard was taken on `flag`, i.e. the entry it was taken
    /// for has not been replaced in the meantime.
    pub(crate) fn guards(&self, flag: &Arc<AtomicBool>) -> bool {
        Arc::ptr_eq(&self.flag, flag)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// What a single on-demand poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Fetched and published a new snapshot.
    Changed,
    /// Fetched a snapshot equal to the current one.
    Unchanged,
    /// The docker command failed; the previous snapshot stays.
    Failed,
    /// Another poll for the same store was still in flight.
    Skipped,
    /// Nobody is subscribed, so there is nothing to refresh.
    Inactive,
}
