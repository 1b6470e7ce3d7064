use crate::metrics::FanoutMetrics;
use crate::CacheResult;
use resilience::timeout::with_timeout;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bounded pool for background read-through writes.
///
/// Tasks are detached from the request that produced them and carry their
/// own deadline. When every permit is taken the write is skipped; the next
/// cold read will try again.
#[derive(Clone)]
pub struct PopulatePool {
    permits: Arc<Semaphore>,
    capacity: u32,
    deadline: Duration,
    metrics: FanoutMetrics,
}

impl PopulatePool {
    pub fn new(capacity: usize, deadline: Duration) -> Self {
        let capacity = capacity.clamp(1, u32::MAX as usize) as u32;
        Self {
            permits: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
            deadline,
            metrics: FanoutMetrics::new(),
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Submit a populate task. Returns `None` when the pool is saturated.
    pub fn submit<F>(&self, view: &'static str, key: String, task: F) -> Option<JoinHandle<()>>
    where
        F: Future<Output = CacheResult<()>> + Send + 'static,
    {
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(view, key = %key, "Populate pool saturated, skipping cache write");
                self.metrics.record_populate(view, "saturated");
                return None;
            }
        };

        let deadline = self.deadline;
        let metrics = self.metrics;
        Some(tokio::spawn(async move {
            let _permit = permit;
            match with_timeout(deadline, task).await {
                Ok(Ok(())) => {
                    debug!(view, key = %key, "Cache populated from store");
                    metrics.record_populate(view, "ok");
                }
                Ok(Err(e)) => {
                    warn!(view, key = %key, error = %e, "Cache populate failed");
                    metrics.record_populate(view, "error");
                }
                Err(e) => {
                    warn!(view, key = %key, error = %e, "Cache populate timed out");
                    metrics.record_populate(view, "timeout");
                }
            }
        }))
    }

    /// Wait until every in-flight task has finished.
    pub async fn wait_idle(&self) {
        if let Ok(all) = self.permits.acquire_many(self.capacity).await {
            drop(all);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_submit_runs_task() {
        let pool = PopulatePool::new(2, Duration::from_secs(1));
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();

        let handle = pool
            .submit("test", "k".to_string(), async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        handle.await.unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_saturated_pool_skips() {
        let pool = PopulatePool::new(1, Duration::from_secs(5));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let first = pool.submit("test", "a".to_string(), async move {
            let _ = rx.await;
            Ok(())
        });
        assert!(first.is_some());
        assert!(pool.submit("test", "b".to_string(), async { Ok(()) }).is_none());

        tx.send(()).unwrap();
        pool.wait_idle().await;
        assert!(pool.submit("test", "c".to_string(), async { Ok(()) }).is_some());
    }

    #[tokio::test]
    async fn test_deadline_and_errors_are_swallowed() {
        let pool = PopulatePool::new(2, Duration::from_millis(20));

        let slow = pool
            .submit("test", "slow".to_string(), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .unwrap();
        let failing = pool
            .submit("test", "bad".to_string(), async {
                Err(CacheError::Unavailable("down".to_string()))
            })
            .unwrap();

        // Both tasks finish without panicking
        slow.await.unwrap();
        failing.await.unwrap();
    }
}
