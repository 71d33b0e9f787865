//! Bounded worker pool for analytics computations.
//!
//! Tasks are submitted to a bounded queue drained by a fixed set of worker
//! tasks. When the queue is full, [`WorkerPool::submit`] fails fast with
//! [`PoolError::Saturated`] instead of blocking, so load is shaped rather
//! than accumulated. Callers await a [`TaskHandle`] with their own deadline;
//! a timeout surfaces as [`PoolError::Timeout`], a kind distinct from
//! computation failure, while the underlying task keeps running and may
//! still populate the cache for the next caller.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{AnalyticsError, ComputeError, PoolError};

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Job {
    id: Uuid,
    label: String,
    task: BoxedTask,
}

/// Counters exposed by [`WorkerPool::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Tasks accepted into the queue.
    pub submitted: u64,
    /// Tasks that ran to completion.
    pub completed: u64,
    /// Submissions rejected because the queue was full.
    pub rejected: u64,
}

/// Handle to a submitted task's eventual output.
#[derive(Debug)]
pub struct TaskHandle<T> {
    id: Uuid,
    label: String,
    rx: oneshot::Receiver<Result<T, ComputeError>>,
}

impl<T> TaskHandle<T> {
    /// The task's id, for log correlation.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Await the task's output with a caller-supplied deadline.
    ///
    /// # Errors
    ///
    /// - [`PoolError::Timeout`] if the deadline elapses first (the task is
    ///   not aborted);
    /// - [`PoolError::Closed`] if the pool shut down before running it;
    /// - [`AnalyticsError::Compute`] if the task itself failed.
    pub async fn await_with_timeout(self, timeout: Duration) -> Result<T, AnalyticsError> {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        match tokio::time::timeout(timeout, self.rx).await {
            Err(_) => {
                tracing::debug!(task_id = %self.id, label = %self.label, "task await timed out");
                Err(PoolError::Timeout { timeout_ms }.into())
            }
            Ok(Err(_)) => Err(PoolError::Closed.into()),
            Ok(Ok(result)) => result.map_err(AnalyticsError::Compute),
        }
    }
}

/// Fixed-size worker pool with a bounded task queue.
#[derive(Debug)]
pub struct WorkerPool {
    queue: Mutex<Option<mpsc::Sender<Job>>>,
    queue_depth: usize,
    workers: Mutex<Vec<JoinHandle<()>>>,
    submitted: Arc<AtomicU64>,
    completed: Arc<AtomicU64>,
    rejected: AtomicU64,
}

impl WorkerPool {
    /// Start `worker_count` workers draining a queue of `queue_depth` slots.
    #[must_use]
    pub fn new(worker_count: usize, queue_depth: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>(queue_depth.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let completed = Arc::new(AtomicU64::new(0));

        let workers = (0..worker_count.max(1))
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let completed = Arc::clone(&completed);
                tokio::spawn(async move {
                    tracing::debug!(worker_id, "analytics worker started");
                    loop {
                        let job = {
                            let mut guard = rx.lock().await;
                            guard.recv().await
                        };
                        let Some(job) = job else {
                            tracing::debug!(worker_id, "analytics worker stopping");
                            break;
                        };
                        tracing::debug!(worker_id, task_id = %job.id, label = %job.label, "task started");
                        job.task.await;
                        completed.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        Self {
            queue: Mutex::new(Some(tx)),
            queue_depth: queue_depth.max(1),
            workers: Mutex::new(workers),
            submitted: Arc::new(AtomicU64::new(0)),
            completed,
            rejected: AtomicU64::new(0),
        }
    }

    /// Submit a computation, receiving a [`TaskHandle`] for its output.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Saturated`] immediately when the queue is full,
    /// or [`PoolError::Closed`] after [`Self::shutdown`].
    pub fn submit<T, F>(&self, label: &str, fut: F) -> Result<TaskHandle<T>, PoolError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, ComputeError>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        let job = Job {
            id,
            label: label.to_string(),
            task: Box::pin(async move {
                let result = fut.await;
                // Receiver may have timed out and gone away; the work is
                // still done and cache side effects already happened.
                let _ = tx.send(result);
            }),
        };

        let queue = match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(sender) = queue.as_ref() else {
            return Err(PoolError::Closed);
        };
        match sender.try_send(job) {
            Ok(()) => {
                self.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(TaskHandle {
                    id,
                    label: label.to_string(),
                    rx,
                })
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(label, queue_depth = self.queue_depth, "worker pool saturated");
                Err(PoolError::Saturated {
                    queue_depth: self.queue_depth,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PoolError::Closed),
        }
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }

    /// Close the queue and wait for workers to drain it. Submissions after
    /// this point fail with [`PoolError::Closed`].
    pub async fn shutdown(&self) {
        let sender = match self.queue.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        // Dropping the sender closes the channel once queued jobs drain.
        drop(sender);

        let handles = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for worker in handles {
            if let Err(e) = worker.await {
                tracing::warn!(error = %e, "worker task failed during shutdown");
            }
        }
        tracing::info!("worker pool stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submitted_task_completes() {
        let pool = WorkerPool::new(2, 16);
        let handle = pool
            .submit("double", async { Ok(21 * 2) })
            .unwrap();
        let value = handle
            .await_with_timeout(Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn saturation_fails_fast() {
        // One worker stuck on a slow task, queue depth 1: the first extra
        // submission queues, the second is rejected immediately.
        let pool = WorkerPool::new(1, 1);
        let _slow = pool
            .submit("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .unwrap();
        // Give the worker a chance to pick up the slow task.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _queued = pool.submit("queued", async { Ok(()) }).unwrap();

        let err = pool.submit("rejected", async { Ok(()) }).unwrap_err();
        assert_eq!(err, PoolError::Saturated { queue_depth: 1 });
        assert_eq!(pool.stats().rejected, 1);
    }

    #[tokio::test]
    async fn timeout_is_distinct_from_failure() {
        let pool = WorkerPool::new(1, 16);
        let handle = pool
            .submit("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .unwrap();

        let err = handle
            .await_with_timeout(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::Pool(PoolError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn compute_failure_propagates_as_compute_error() {
        let pool = WorkerPool::new(1, 16);
        let handle = pool
            .submit::<(), _>("broken", async {
                Err(ComputeError::Internal {
                    message: "boom".into(),
                })
            })
            .unwrap();

        let err = handle
            .await_with_timeout(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::Compute(_)));
    }

    #[tokio::test]
    async fn shutdown_drains_queued_tasks() {
        let pool = WorkerPool::new(2, 16);
        let handles: Vec<_> = (0..6)
            .map(|i| pool.submit("work", async move { Ok(i) }).unwrap())
            .collect();
        pool.shutdown().await;
        for (i, handle) in handles.into_iter().enumerate() {
            let value = handle
                .await_with_timeout(Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(value, i);
        }
    }
}
