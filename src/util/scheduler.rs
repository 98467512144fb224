//! Periodic task scheduling.
//!
//! The cluster core never owns a runtime; it schedules its health-check and
//! load-reset ticks through an injected [`TaskExecutor`] and keeps a
//! [`CancelKey`] per scheduled task. [`IoThread`] is the affinity handle a
//! node is pinned to for its entire lifetime.

use async_trait::async_trait;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// A task that runs once per scheduler tick.
///
/// Ticks for the same task never overlap; the next tick does not start
/// until the previous `run` has returned.
#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    async fn run(&self);
}

/// Schedules periodic tasks and hands out cancel keys.
pub trait TaskExecutor: Send + Sync + 'static {
    /// Run `task` every `period`, starting one period from now.
    fn execute_at_interval(&self, task: Arc<dyn PeriodicTask>, period: Duration) -> CancelKey;
}

/// Handle to a scheduled task.
///
/// After `cancel` returns, no further tick starts. A tick already in
/// flight is allowed to finish.
pub struct CancelKey {
    cancel: Box<dyn Fn() + Send + Sync>,
}

impl CancelKey {
    pub fn new(cancel: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Box::new(cancel),
        }
    }

    /// Stop the task.
    pub fn cancel(self) {
        (self.cancel)();
    }
}

impl fmt::Debug for CancelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CancelKey")
    }
}

/// Tokio-backed executor.
///
/// Spawns one task per schedule onto the captured runtime handle. Missed
/// ticks are skipped rather than bursted, so a slow probe round does not
/// pile up follow-up rounds behind it.
#[derive(Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    /// Capture the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; use [`with_handle`]
    /// when scheduling from a plain thread.
    ///
    /// [`with_handle`]: TokioExecutor::with_handle
    pub fn new() -> Self {
        Self::with_handle(tokio::runtime::Handle::current())
    }

    pub fn with_handle(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl TaskExecutor for TokioExecutor {
    fn execute_at_interval(&self, task: Arc<dyn PeriodicTask>, period: Duration) -> CancelKey {
        let join = self.handle.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick of a tokio interval completes immediately;
            // consume it so the task first runs one period from now.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                task.run().await;
            }
        });
        let abort = join.abort_handle();
        CancelKey::new(move || abort.abort())
    }
}

/// Affinity handle for one I/O thread of the proxy.
///
/// Each node is pinned to exactly one `IoThread` when it registers, and all
/// of its health-check ticks are scheduled through that handle. Equality
/// and hashing go by the thread id, so the handle doubles as the key of the
/// per-thread health-check task table.
#[derive(Clone)]
pub struct IoThread {
    id: usize,
    executor: Arc<dyn TaskExecutor>,
}

impl IoThread {
    pub fn new(id: usize, executor: Arc<dyn TaskExecutor>) -> Self {
        Self { id, executor }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn execute_at_interval(&self, task: Arc<dyn PeriodicTask>, period: Duration) -> CancelKey {
        self.executor.execute_at_interval(task, period)
    }
}

impl PartialEq for IoThread {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for IoThread {}

impl Hash for IoThread {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for IoThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoThread").field("id", &self.id).finish()
    }
}

/// Fixed set of I/O thread handles with round-robin assignment.
pub struct IoThreadPool {
    threads: Vec<IoThread>,
    next: AtomicUsize,
}

impl IoThreadPool {
    /// Create `size` thread handles backed by the same executor.
    pub fn new(size: usize, executor: Arc<dyn TaskExecutor>) -> Self {
        let threads = (0..size.max(1))
            .map(|id| IoThread::new(id, Arc::clone(&executor)))
            .collect();
        Self {
            threads,
            next: AtomicUsize::new(0),
        }
    }

    /// Hand out the next thread handle, round-robin.
    pub fn assign(&self) -> IoThread {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.threads.len();
        self.threads[i].clone()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct CountingTask {
        ticks: AtomicU32,
    }

    #[async_trait]
    impl PeriodicTask for CountingTask {
        async fn run(&self) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_executor_ticks_at_interval() {
        let executor = TokioExecutor::new();
        let task = Arc::new(CountingTask {
            ticks: AtomicU32::new(0),
        });

        let key = executor.execute_at_interval(task.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(130)).await;
        key.cancel();

        let ticks = task.ticks.load(Ordering::SeqCst);
        assert!(ticks >= 3, "expected at least 3 ticks, got {}", ticks);
    }

    #[tokio::test]
    async fn test_cancel_stops_ticks() {
        let executor = TokioExecutor::new();
        let task = Arc::new(CountingTask {
            ticks: AtomicU32::new(0),
        });

        let key = executor.execute_at_interval(task.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(55)).await;
        key.cancel();

        let after_cancel = task.ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(task.ticks.load(Ordering::SeqCst), after_cancel);
    }

    #[tokio::test]
    async fn test_first_tick_is_delayed() {
        let executor = TokioExecutor::new();
        let task = Arc::new(CountingTask {
            ticks: AtomicU32::new(0),
        });

        let key = executor.execute_at_interval(task.clone(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(task.ticks.load(Ordering::SeqCst), 0);
        key.cancel();
    }

    #[tokio::test]
    async fn test_pool_round_robin() {
        let executor: Arc<dyn TaskExecutor> = Arc::new(TokioExecutor::new());
        let pool = IoThreadPool::new(3, executor);

        assert_eq!(pool.assign().id(), 0);
        assert_eq!(pool.assign().id(), 1);
        assert_eq!(pool.assign().id(), 2);
        assert_eq!(pool.assign().id(), 0);
    }

    #[test]
    fn test_io_thread_identity() {
        struct NoopExecutor;
        impl TaskExecutor for NoopExecutor {
            fn execute_at_interval(
                &self,
                _task: Arc<dyn PeriodicTask>,
                _period: Duration,
            ) -> CancelKey {
                CancelKey::new(|| {})
            }
        }

        let executor: Arc<dyn TaskExecutor> = Arc::new(NoopExecutor);
        let a = IoThread::new(1, Arc::clone(&executor));
        let b = IoThread::new(1, Arc::clone(&executor));
        let c = IoThread::new(2, executor);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
