//! Bounded worker pool over tokio tasks.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

/// Outcome counts of one pool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub completed: usize,
    pub panicked: usize,
}

/// Runs one task per item with at most `workers` in flight.
///
/// Completions are handed back as they arrive, in no particular order.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawn `task(item)` for every item and call `on_done` with each output.
    ///
    /// A task that panics is logged and counted; the remaining tasks still run.
    pub async fn run<I, T, F, Fut, D>(&self, items: Vec<I>, task: F, mut on_done: D) -> PoolReport
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
        D: FnMut(T),
    {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut join_set = JoinSet::new();

        for item in items {
            let semaphore = semaphore.clone();
            let work = task(item);
            join_set.spawn(async move {
                // The semaphore is never closed, so acquiring cannot fail.
                let _permit = semaphore.acquire_owned().await.ok();
                work.await
            });
        }

        let mut report = PoolReport::default();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(output) => {
                    report.completed += 1;
                    on_done(output);
                }
                Err(e) => {
                    report.panicked += 1;
                    error!(error = %e, "worker task failed");
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_worker_limit() {
        let pool = WorkerPool::new(3);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut outputs = Vec::new();
        let report = pool
            .run(
                (0..20).collect(),
                |i: usize| {
                    let active = active.clone();
                    let peak = peak.clone();
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        i * 2
                    }
                },
                |out| outputs.push(out),
            )
            .await;

        assert_eq!(report, PoolReport { completed: 20, panicked: 0 });
        assert!(peak.load(Ordering::SeqCst) <= 3);
        outputs.sort_unstable();
        assert_eq!(outputs, (0..20).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn panics_are_counted_not_fatal() {
        let pool = WorkerPool::new(2);
        let mut seen = 0;
        let report = pool
            .run(
                vec![1, 2, 3, 4],
                |i: u32| async move {
                    if i == 3 {
                        panic!("boom");
                    }
                    i
                },
                |_| seen += 1,
            )
            .await;

        assert_eq!(report.completed, 3);
        assert_eq!(report.panicked, 1);
        assert_eq!(seen, 3);
    }

    #[test]
    fn zero_workers_means_one() {
        assert_eq!(WorkerPool::new(0).workers(), 1);
    }
}
