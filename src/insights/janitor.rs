//! Expiry janitor.
//!
//! Background loop deleting insights whose `expires_at` has passed. Runs on
//! a fixed interval independent of request traffic; a failed cycle is
//! logged and retried on the next tick rather than treated as fatal.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use super::InsightStore;

/// Periodic deleter of expired insights.
pub struct ExpiryJanitor {
    store: Arc<InsightStore>,
    interval: Duration,
}

impl ExpiryJanitor {
    /// Create a janitor sweeping `store` every `interval`.
    #[must_use]
    pub fn new(store: Arc<InsightStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run until the shutdown signal flips to `true`.
    ///
    /// The first sweep happens one full interval after start.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        // Skip the immediate first tick.
        interval.tick().await;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "expiry janitor started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep().await;
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("expiry janitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One deletion cycle. Failures are logged and retried next cycle.
    pub async fn sweep(&self) {
        match self.store.delete_expired(Utc::now()).await {
            Ok(0) => {}
            Ok(removed) => {
                tracing::info!(removed, "expired insights removed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "expiry sweep failed, will retry next cycle");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::insights::{InsightLevel, InsightPayload, InsightType, NewInsight, StreakKind};
    use chrono::Duration as ChronoDuration;

    fn expiring(user_id: i64, hours_from_now: i64) -> NewInsight {
        NewInsight {
            user_id,
            insight_type: InsightType::Streak,
            level: InsightLevel::Success,
            title: "streak".into(),
            message: "m".into(),
            payload: InsightPayload::Streak {
                streak: StreakKind::Win,
                length: 5,
            },
            action_url: None,
            expires_at: Some(Utc::now() + ChronoDuration::hours(hours_from_now)),
        }
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_rows() {
        let store = Arc::new(InsightStore::new_in_memory().await.unwrap());
        store.insert(&expiring(1, -2)).await.unwrap();
        store.insert(&expiring(1, 48)).await.unwrap();
        let mut durable = expiring(1, 48);
        durable.expires_at = None;
        store.insert(&durable).await.unwrap();

        let janitor = ExpiryJanitor::new(Arc::clone(&store), Duration::from_secs(600));
        janitor.sweep().await;

        let remaining = store.list(1, None, false).await.unwrap();
        assert_eq!(remaining.len(), 2);
        janitor.sweep().await;
        assert_eq!(store.list(1, None, false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn run_loop_sweeps_and_honors_shutdown() {
        let store = Arc::new(InsightStore::new_in_memory().await.unwrap());
        store.insert(&expiring(1, -1)).await.unwrap();

        let janitor = ExpiryJanitor::new(Arc::clone(&store), Duration::from_millis(20));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(janitor.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.list(1, None, false).await.unwrap().is_empty());

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
