use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const DEFAULT_MAX_WORKERS: usize = 8;

/// Bounded-concurrency async worker pool. Each job handler gets one pool;
/// work items within a job are independent and run concurrently up to
/// `max_workers`, and the pool awaits all of them before returning — there
/// is no cross-project ordering guarantee.
pub struct WorkerPool {
    max_workers: usize,
    shutdown: CancellationToken,
}

impl Default for WorkerPool {
    fn default() -> Self {
        WorkerPool::new(DEFAULT_MAX_WORKERS, CancellationToken::new())
    }
}

impl WorkerPool {
    pub fn new(max_workers: usize, shutdown: CancellationToken) -> Self {
        WorkerPool {
            max_workers: max_workers.max(1),
            shutdown,
        }
    }

    /// Runs `task` over every item in `items`, at most `max_workers`
    /// concurrently, and returns one result per surviving item in
    /// completion order (not input order — callers that need positional
    /// results should carry the input's key through `R`). Once the pool's
    /// cancellation token fires, no further items are dispatched, but every
    /// item already spawned still runs to completion.
    pub async fn run_all<T, R, F, Fut>(&self, items: Vec<T>, task: F) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let task = Arc::new(task);
        let mut set = JoinSet::new();

        for item in items {
            if self.shutdown.is_cancelled() {
                warn!("pool shutting down, dropping remaining unstarted items");
                break;
            }
            let semaphore = semaphore.clone();
            let task = task.clone();
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("pool semaphore is never closed");
                task(item).await
            });
        }

        let mut results = Vec::with_capacity(set.len());
        while let Some(outcome) = set.join_next().await {
            match outcome {
                Ok(value) => results.push(value),
                Err(join_err) => warn!(error = %join_err, "worker task panicked, dropping its result"),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_configured_concurrency() {
        let pool = WorkerPool::new(4, CancellationToken::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let items: Vec<usize> = (0..40).collect();
        let in_flight_for_task = in_flight.clone();
        let peak_for_task = peak.clone();
        pool.run_all(items, move |_| {
            let in_flight = in_flight_for_task.clone();
            let peak = peak_for_task.clone();
            async move {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn awaits_every_item_before_returning() {
        let pool = WorkerPool::default();
        let results = pool.run_all(vec![1, 2, 3, 4, 5], |n| async move { n * 2 }).await;
        let mut sorted = results;
        sorted.sort_unstable();
        assert_eq!(sorted, vec![2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn cancelled_pool_dispatches_nothing_new() {
        let token = CancellationToken::new();
        token.cancel();
        let pool = WorkerPool::new(4, token);
        let results = pool.run_all(vec![1, 2, 3], |n| async move { n }).await;
        assert!(results.is_empty());
    }
}
