//! Bounded background task pool.
//!
//! Deferred cache writes and source prefetches run here instead of on
//! fire-and-forget threads: every submission returns a handle, so tests
//! await completion rather than sleeping, and a semaphore keeps the
//! number of in-flight tasks at the configured worker count.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

/// Fixed-size pool for background work.
///
/// The render path submits work here and continues; it must never wait
/// on a handle. Tests do await the handles.
#[derive(Clone)]
pub struct RenderPool {
    semaphore: Arc<Semaphore>,
    workers: usize,
}

impl RenderPool {
    /// Create a pool running at most `workers` tasks concurrently.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Create a pool sized to available hardware concurrency.
    pub fn with_hardware_concurrency() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self::new(workers)
    }

    /// Submit work. The returned handle resolves when the work has run;
    /// excess submissions queue on the semaphore rather than growing the
    /// number of live tasks.
    pub fn spawn<F, T>(&self, future: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            let _permit = semaphore
                .acquire()
                .await
                .expect("pool semaphore never closes");
            future.await
        })
    }

    /// Configured worker count.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Tasks currently runnable without queueing.
    pub fn idle_workers(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl std::fmt::Debug for RenderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPool")
            .field("workers", &self.workers)
            .field("idle", &self.idle_workers())
            .finish()
    }
}

impl Default for RenderPool {
    fn default() -> Self {
        debug!("sizing render pool to hardware concurrency");
        Self::with_hardware_concurrency()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_completion_is_observable() {
        let pool = RenderPool::new(2);
        let handle = pool.spawn(async { 21 * 2 });
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = RenderPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                pool.spawn(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(
            peak.load(Ordering::SeqCst) <= 2,
            "more than `workers` tasks ran concurrently: {}",
            peak.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_idle_workers_recovers() {
        let pool = RenderPool::new(3);
        assert_eq!(pool.idle_workers(), 3);
        let handle = pool.spawn(async {});
        handle.await.unwrap();
        assert_eq!(pool.idle_workers(), 3);
    }
}
