//! Ordering and backpressure for docker invocations.
//!
//! Every command the crate issues goes through [`Scheduler`]:
//!
//! - a global semaphore caps how many run at once across all contexts
//!   (waiters are served FIFO),
//! - each context runs at most one command at a time,
//! - queued commands of a context are drained urgent, then high, then
//!   normal, FIFO within a priority.
//!
//! Interactive commands (a key press starting a container) go in as
//! [`Priority::Urgent`], list refreshes as [`Priority::High`] and background
//! probes as [`Priority::Normal`]. Strict lane order means sustained urgent
//! traffic can delay normal work indefinitely.
//!
//! Processing is always handed to a freshly spawned task, both when a job is
//! enqueued and when a finished job finds more work queued behind it, so the
//! call stack never grows with queue length.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Poll},
};

use futures::{future::BoxFuture, FutureExt};
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, error, trace, Instrument};
use uuid::Uuid;

use crate::{
    cli::CommandRunner,
    context::ContextKey,
    error::{Error, Result},
};

mod queue;

use queue::ContextQueue;

/// Relative urgency of a queued command within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Background probes and follow-up commands.
    Normal,
    /// List refreshes feeding the UI.
    High,
    /// Commands triggered directly by the user.
    Urgent,
}

impl Priority {
    fn lane(self) -> usize {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Normal => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        })
    }
}

/// A queued unit of work. The handler owns the channel its result goes to.
pub(crate) struct Job {
    pub(crate) id: Uuid,
    pub(crate) priority: Priority,
    pub(crate) handler: BoxFuture<'static, ()>,
}

/// Result of a scheduled task, available once the task has run.
///
/// Resolves to [`Error::TaskAborted`] when the task panicked or the
/// scheduler went away before running it.
#[must_use = "the task runs regardless, but its result is lost unless awaited"]
pub struct Pending<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::TaskAborted)))
    }
}

struct Inner {
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    queues: Mutex<HashMap<ContextKey, ContextQueue>>,
    runner: Arc<dyn CommandRunner>,
}

impl Inner {
    fn queues(&self) -> MutexGuard<'_, HashMap<ContextKey, ContextQueue>> {
        // A poisoned map only means a panic happened between two plain
        // field updates; the data is still consistent.
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Global concurrency limiter plus per-context priority queues.
///
/// Cheap to clone; clones share the same queues and permits.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("max_concurrency", &self.inner.max_concurrency)
            .field("available_permits", &self.available_permits())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Create a scheduler running at most `max_concurrency` commands at once.
    /// A value of zero is treated as one.
    pub fn new(max_concurrency: usize, runner: Arc<dyn CommandRunner>) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            inner: Arc::new(Inner {
                permits: Arc::new(Semaphore::new(max_concurrency)),
                max_concurrency,
                queues: Mutex::new(HashMap::new()),
                runner,
            }),
        }
    }

    /// Enqueue `task` for `context` and return a handle to its result.
    ///
    /// The task is queued immediately; it starts once it reaches the head of
    /// its context's queue and a global slot is free. Must be called from
    /// within a Tokio runtime.
    pub fn schedule<F, Fut, T>(&self, context: &ContextKey, priority: Priority, task: F) -> Pending<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let handler = Box::pin(async move {
            let result = task().await;
            // The caller may have stopped waiting; the work still counts.
            let _ = tx.send(result);
        });
        let job = Job {
            id: Uuid::new_v4(),
            priority,
            handler,
        };

        trace!(context = %context, job_id = %job.id, %priority, "Enqueueing task");
        self.inner
            .queues()
            .entry(context.clone())
            .or_default()
            .push(job);

        spawn_drain(self.inner.clone(), context.clone());
        Pending { rx }
    }

    /// Schedule one docker invocation through the configured runner.
    pub fn run(&self, context: &ContextKey, priority: Priority, args: Vec<String>) -> Pending<String> {
        let runner = self.inner.runner.clone();
        let target = context.clone();
        self.schedule(context, priority, move || async move {
            runner.execute(args, &target).await
        })
    }

    /// Tasks waiting (not yet started) for `context`.
    pub fn queued(&self, context: &ContextKey) -> usize {
        self.inner.queues().get(context).map_or(0, ContextQueue::len)
    }

    /// Tasks waiting for `context` at one priority.
    pub fn queued_at(&self, context: &ContextKey, priority: Priority) -> usize {
        self.inner
            .queues()
            .get(context)
            .map_or(0, |queue| queue.queued_at(priority))
    }

    /// Whether `context` currently has a task holding its turn.
    pub fn is_busy(&self, context: &ContextKey) -> bool {
        self.inner
            .queues()
            .get(context)
            .is_some_and(|queue| queue.running)
    }

    /// Free global slots right now.
    pub fn available_permits(&self) -> usize {
        self.inner.permits.available_permits()
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    /// Contexts with queued or running work.
    pub fn tracked_contexts(&self) -> usize {
        self.inner.queues().len()
    }
}

fn spawn_drain(inner: Arc<Inner>, context: ContextKey) {
    tokio::spawn(drain_next(inner, context));
}

/// Run the next job of `context` if the context is idle, then hand the
/// remainder of the queue to a new task.
async fn drain_next(inner: Arc<Inner>, context: ContextKey) {
    let job = {
        let mut queues = inner.queues();
        let Some(queue) = queues.get_mut(&context) else {
            return;
        };
        if queue.running {
            return;
        }
        match queue.pop() {
            Some(job) => {
                queue.running = true;
                job
            }
            None => {
                queues.remove(&context);
                return;
            }
        }
    };

    let job_id = job.id;
    let priority = job.priority;
    let span = tracing::debug_span!("docker_task", context = %context, job_id = %job_id, %priority);

    async {
        // The semaphore is never closed, so acquiring cannot fail.
        let permit = inner.permits.clone().acquire_owned().await.ok();
        debug!("Running task");

        if AssertUnwindSafe(job.handler).catch_unwind().await.is_err() {
            error!("Task panicked; continuing with the rest of the queue");
        }

        drop(permit);
    }
    .instrument(span)
    .await;

    let more = {
        let mut queues = inner.queues();
        match queues.get_mut(&context) {
            Some(queue) => {
                queue.running = false;
                if queue.is_idle() {
                    queues.remove(&context);
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    };

    if more {
        spawn_drain(inner, context);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;

    use super::*;

    struct EchoRunner;

    #[async_trait]
    impl CommandRunner for EchoRunner {
        async fn execute(&self, args: Vec<String>, context: &ContextKey) -> Result<String> {
            Ok(format!("{context}: {}", args.join(" ")))
        }
    }

    fn scheduler(max: usize) -> Scheduler {
        Scheduler::new(max, Arc::new(EchoRunner))
    }

    #[tokio::test]
    async fn runs_urgent_then_high_then_normal() {
        let scheduler = scheduler(5);
        let ctx = ContextKey::Default;
        let order = Arc::new(Mutex::new(Vec::new()));

        let record = |label: &'static str| {
            let order = order.clone();
            move || async move {
                order.lock().unwrap().push(label);
                Ok(())
            }
        };

        let normal = scheduler.schedule(&ctx, Priority::Normal, record("normal"));
        let high = scheduler.schedule(&ctx, Priority::High, record("high"));
        let urgent = scheduler.schedule(&ctx, Priority::Urgent, record("urgent"));

        normal.await.unwrap();
        high.await.unwrap();
        urgent.await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["urgent", "high", "normal"]);
    }

    #[tokio::test]
    async fn keeps_fifo_within_a_priority() {
        let scheduler = scheduler(5);
        let ctx = ContextKey::named("ci");
        let order = Arc::new(Mutex::new(Vec::new()));

        let pending: Vec<_> = (0..5)
            .map(|i| {
                let order = order.clone();
                scheduler.schedule(&ctx, Priority::High, move || async move {
                    order.lock().unwrap().push(i);
                    Ok(())
                })
            })
            .collect();

        for p in pending {
            p.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_the_global_cap() {
        let cap = 2;
        let scheduler = scheduler(cap);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut pending = Vec::new();
        for ctx in ["a", "b", "c", "d"] {
            for _ in 0..3 {
                let current = current.clone();
                let peak = peak.clone();
                pending.push(scheduler.schedule(
                    &ContextKey::named(ctx),
                    Priority::Normal,
                    move || async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    },
                ));
            }
        }

        for p in pending {
            p.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= cap);
        assert_eq!(peak.load(Ordering::SeqCst), cap);
        assert_eq!(scheduler.available_permits(), cap);
    }

    #[tokio::test]
    async fn runs_one_task_per_context_at_a_time() {
        let scheduler = scheduler(5);
        let ctx = ContextKey::Default;
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let pending: Vec<_> = (0..4)
            .map(|_| {
                let current = current.clone();
                let peak = peak.clone();
                scheduler.schedule(&ctx, Priority::Normal, move || async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        for p in pending {
            p.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failing_task_does_not_stop_the_queue() {
        let scheduler = scheduler(1);
        let ctx = ContextKey::Default;

        let failing = scheduler.schedule(&ctx, Priority::Normal, || async {
            Err::<(), _>(Error::MissingInput("container"))
        });
        let next = scheduler.schedule(&ctx, Priority::Normal, || async { Ok(7) });

        assert!(matches!(failing.await, Err(Error::MissingInput(_))));
        assert_eq!(next.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn panicking_task_is_reported_as_aborted() {
        let scheduler = scheduler(1);
        let ctx = ContextKey::Default;

        let panicking = scheduler.schedule(&ctx, Priority::Urgent, || async {
            if true {
                panic!("boom");
            }
            Ok(())
        });
        let next = scheduler.schedule(&ctx, Priority::Normal, || async { Ok("still running") });

        assert!(matches!(panicking.await, Err(Error::TaskAborted)));
        assert_eq!(next.await.unwrap(), "still running");
        assert_eq!(scheduler.available_permits(), 1);
    }

    #[tokio::test]
    async fn run_forwards_args_and_context_to_runner() {
        let scheduler = scheduler(2);
        let out = scheduler
            .run(
                &ContextKey::named("remote"),
                Priority::High,
                vec!["ps".into(), "-a".into()],
            )
            .await
            .unwrap();
        assert_eq!(out, "remote: ps -a");
    }

    #[tokio::test]
    async fn idle_contexts_are_forgotten() {
        let scheduler = scheduler(2);
        let ctx = ContextKey::named("tmp");
        scheduler
            .schedule(&ctx, Priority::Normal, || async { Ok(()) })
            .await
            .unwrap();

        // The bookkeeping update happens right after the result is sent.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(scheduler.queued(&ctx), 0);
        assert!(!scheduler.is_busy(&ctx));
        assert_eq!(scheduler.tracked_contexts(), 0);
    }

    #[tokio::test]
    async fn queued_counts_waiting_tasks() {
        let scheduler = scheduler(1);
        let ctx = ContextKey::Default;
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let blocker = scheduler.schedule(&ctx, Priority::Normal, move || async move {
            let _ = release_rx.await;
            Ok(())
        });
        let later = scheduler.schedule(&ctx, Priority::High, || async { Ok(()) });

        // Let the blocker start.
        while !scheduler.is_busy(&ctx) {
            tokio::task::yield_now().await;
        }
        assert_eq!(scheduler.queued(&ctx), 1);
        assert_eq!(scheduler.queued_at(&ctx, Priority::High), 1);

        release_tx.send(()).unwrap();
        blocker.await.unwrap();
        later.await.unwrap();
    }
}
