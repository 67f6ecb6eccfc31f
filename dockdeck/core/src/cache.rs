use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::{
    context::ContextKey,
    scheduler::{Priority, Scheduler},
};

#[derive(Debug, Clone, Copy)]
struct CachedPing {
    ok: bool,
    at: Instant,
}

/// Short-lived memo of `docker version` outcomes per context.
///
/// Many UI elements ask for health independently; the cache keeps that down
/// to one probe per context per TTL. Entries are only replaced when a call
/// finds them stale, never evicted in the background.
#[derive(Debug)]
pub struct PingCache {
    scheduler: Scheduler,
    ttl: Duration,
    entries: Mutex<HashMap<ContextKey, CachedPing>>,
}

impl PingCache {
    pub fn new(scheduler: Scheduler, ttl: Duration) -> Self {
        Self {
            scheduler,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ContextKey, CachedPing>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the daemon behind `context` answered, reusing a fresh result
    /// when one exists. Failures are cached too.
    #[instrument(skip(self), fields(context = %context))]
    pub async fn cached_ping(&self, context: &ContextKey) -> bool {
        if let Some(cached) = self.entries().get(context).copied() {
            if cached.at.elapsed() < self.ttl {
                return cached.ok;
            }
        }

        let at = Instant::now();
        let ok = match self
            .scheduler
            .run(context, Priority::Normal, vec!["version".to_string()])
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Health probe failed");
                false
            }
        };

        self.entries().insert(context.clone(), CachedPing { ok, at });
        ok
    }

    /// Last cached outcome regardless of age.
    pub fn peek(&self, context: &ContextKey) -> Option<bool> {
        self.entries().get(context).map(|cached| cached.ok)
    }

    /// Drop the entry for `context` so the next call probes again.
    pub fn invalidate(&self, context: &ContextKey) {
        self.entries().remove(context);
    }
}
