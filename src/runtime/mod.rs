//! Composition root.
//!
//! Every shared component (cache table, worker pool, subscriber table,
//! insight store) is owned by one [`AnalyticsRuntime`], constructed once at
//! process start and handed around by `Arc`. There is no package-level
//! mutable state anywhere in the crate.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::analytics::AnalyticsEngine;
use crate::api::AnalyticsApi;
use crate::broker::NotificationBroker;
use crate::cache::{CacheManager, CacheStats};
use crate::config::Config;
use crate::error::AnalyticsError;
use crate::insights::{ExpiryJanitor, InsightGenerator, InsightStore};
use crate::matches::MatchStore;
use crate::pool::{PoolStats, WorkerPool};

/// Owns and wires every component of the analytics core.
pub struct AnalyticsRuntime {
    config: Config,
    cache: Arc<CacheManager>,
    pool: Arc<WorkerPool>,
    broker: Arc<NotificationBroker>,
    insights: Arc<InsightStore>,
    engine: Arc<AnalyticsEngine>,
    api: AnalyticsApi,
    shutdown_tx: watch::Sender<bool>,
    janitor: JoinHandle<()>,
}

impl AnalyticsRuntime {
    /// Build the runtime against the configured `SQLite` insight database.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Storage`] if the insight store cannot be
    /// opened or migrated.
    pub async fn new(
        config: Config,
        match_store: Arc<dyn MatchStore>,
    ) -> Result<Self, AnalyticsError> {
        let insights = Arc::new(InsightStore::new(&config.database_path).await?);
        Ok(Self::assemble(config, match_store, insights))
    }

    /// Build the runtime with an in-memory insight store (standalone binary
    /// and tests).
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Storage`] if the in-memory store cannot be
    /// created.
    pub async fn new_in_memory(
        config: Config,
        match_store: Arc<dyn MatchStore>,
    ) -> Result<Self, AnalyticsError> {
        let insights = Arc::new(InsightStore::new_in_memory().await?);
        Ok(Self::assemble(config, match_store, insights))
    }

    fn assemble(
        config: Config,
        match_store: Arc<dyn MatchStore>,
        insights: Arc<InsightStore>,
    ) -> Self {
        let cache = Arc::new(CacheManager::new());
        let pool = Arc::new(WorkerPool::new(config.worker_count, config.queue_depth));
        let broker = Arc::new(NotificationBroker::new(config.subscriber_buffer));
        let generator = Arc::new(InsightGenerator::new(
            Arc::clone(&insights),
            Arc::clone(&broker),
        ));
        let engine = Arc::new(AnalyticsEngine::new(
            Arc::clone(&cache),
            Arc::clone(&pool),
            match_store,
            generator,
            config.clone(),
        ));
        let api = AnalyticsApi::new(
            Arc::clone(&engine),
            Arc::clone(&insights),
            Arc::clone(&broker),
            config.clone(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let janitor = tokio::spawn(
            ExpiryJanitor::new(Arc::clone(&insights), config.janitor_interval())
                .run(shutdown_rx),
        );

        tracing::info!(
            workers = config.worker_count,
            queue_depth = config.queue_depth,
            janitor_interval_secs = config.janitor_interval_secs,
            "analytics runtime started"
        );

        Self {
            config,
            cache,
            pool,
            broker,
            insights,
            engine,
            api,
            shutdown_tx,
            janitor,
        }
    }

    /// The request handlers.
    #[must_use]
    pub const fn api(&self) -> &AnalyticsApi {
        &self.api
    }

    /// The analytics engine (ingest hooks, warmup).
    #[must_use]
    pub fn engine(&self) -> Arc<AnalyticsEngine> {
        Arc::clone(&self.engine)
    }

    /// The notification broker.
    #[must_use]
    pub fn broker(&self) -> Arc<NotificationBroker> {
        Arc::clone(&self.broker)
    }

    /// The durable insight store.
    #[must_use]
    pub fn insight_store(&self) -> Arc<InsightStore> {
        Arc::clone(&self.insights)
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Cache counters, for operational visibility.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Pool counters, for operational visibility.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Stop background work: signals the janitor, then drains and joins the
    /// worker pool.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.janitor.await {
            tracing::warn!(error = %e, "janitor task failed during shutdown");
        }
        self.pool.shutdown().await;
        tracing::info!("analytics runtime stopped");
    }
}
