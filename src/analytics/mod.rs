//! Analytics calculators and the cached async facade over them.
//!
//! [`AnalyticsEngine`] is the entry point: each product call checks the
//! cache, and on a miss submits the calculator to the bounded worker pool
//! and awaits it under the configured timeout. Fresh computations triggered
//! by the ingest path (warmup) also hand their derived facts to the insight
//! generator; plain reads never generate insights, so recomputing a cache
//! entry cannot spam a user's feed.

pub mod batch;
pub mod mmr;
pub mod period;
pub mod recommend;
pub mod weights;

pub use batch::{AnalyticsProduct, BatchOutcome, BATCH_ALLOW_LIST};
pub use mmr::{MmrEstimator, MmrTrajectory, Rank, RankPrediction};
pub use period::{Period, PeriodStats, PeriodStatsCalculator};
pub use recommend::{Recommendation, RecommendationEngine};

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::CacheManager;
use crate::config::{CachePolicy, Config};
use crate::error::{AnalyticsError, CacheError, ComputeError};
use crate::insights::InsightGenerator;
use crate::matches::{MatchRecord, MatchStore};
use crate::pool::WorkerPool;

/// Direction a metric series is moving in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    /// Meaningfully better than before.
    Improving,
    /// Meaningfully worse than before.
    Declining,
    /// Within the noise band.
    Stable,
}

/// Days of history used when the MMR trajectory is warmed or batched.
pub const DEFAULT_MMR_DAYS: u16 = 30;

/// Cached async facade over the calculators.
pub struct AnalyticsEngine {
    cache: Arc<CacheManager>,
    pool: Arc<WorkerPool>,
    store: Arc<dyn MatchStore>,
    generator: Arc<InsightGenerator>,
    config: Config,
}

impl AnalyticsEngine {
    /// Wire the engine to its collaborators.
    #[must_use]
    pub fn new(
        cache: Arc<CacheManager>,
        pool: Arc<WorkerPool>,
        store: Arc<dyn MatchStore>,
        generator: Arc<InsightGenerator>,
        config: Config,
    ) -> Self {
        Self {
            cache,
            pool,
            store,
            generator,
            config,
        }
    }

    /// Period statistics for a user, cache-first.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Pool`] on saturation or timeout,
    /// [`AnalyticsError::Compute`] if the calculator fails.
    pub async fn get_period_stats(
        &self,
        user_id: i64,
        period: Period,
    ) -> Result<PeriodStats, AnalyticsError> {
        let key = CacheManager::key(user_id, "period_stats", &period.to_string());
        self.cached_product(
            &key,
            self.config.period_stats_cache,
            "period_stats",
            self.period_compute(user_id, period, false),
            self.period_compute(user_id, period, false),
        )
        .await
    }

    /// MMR trajectory over the last `days` days, cache-first.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Compute`] with [`ComputeError::NoData`]
    /// when the window holds no matches; pool errors as in
    /// [`Self::get_period_stats`].
    pub async fn get_mmr_trajectory(
        &self,
        user_id: i64,
        days: u16,
    ) -> Result<MmrTrajectory, AnalyticsError> {
        let key = CacheManager::key(user_id, "mmr_trajectory", &days.to_string());
        self.cached_product(
            &key,
            self.config.mmr_cache,
            "mmr_trajectory",
            self.mmr_compute(user_id, days, false),
            self.mmr_compute(user_id, days, false),
        )
        .await
    }

    /// Ranked recommendations for a user, cache-first.
    ///
    /// # Errors
    ///
    /// As in [`Self::get_period_stats`].
    pub async fn get_recommendations(
        &self,
        user_id: i64,
    ) -> Result<Vec<Recommendation>, AnalyticsError> {
        let key = CacheManager::key(user_id, "recommendations", "month");
        self.cached_product(
            &key,
            self.config.recommendations_cache,
            "recommendations",
            self.recommend_compute(user_id, false),
            self.recommend_compute(user_id, false),
        )
        .await
    }

    /// Drop every cached product for a user. Returns how many entries went.
    pub fn invalidate_user(&self, user_id: i64) -> usize {
        let removed = self
            .cache
            .invalidate_prefix(&CacheManager::user_prefix(user_id));
        tracing::info!(user_id, removed, "user cache invalidated");
        removed
    }

    /// Synchronously recompute a user's cached products, regardless of
    /// freshness. Computations on this path, and only this path, hand their
    /// derived facts to the insight generator.
    ///
    /// A user with no matches in an MMR window is not an error for warmup;
    /// that product is simply skipped.
    ///
    /// # Errors
    ///
    /// Returns the first non-`NoData` computation failure.
    pub async fn warm_user_caches(&self, user_id: i64) -> Result<(), AnalyticsError> {
        // Only the week warmup emits insights; the month window covers the
        // same fresh matches and would duplicate every streak and mastery
        // notification.
        for (period, emit) in [(Period::Week, true), (Period::Month, false)] {
            let key = CacheManager::key(user_id, "period_stats", &period.to_string());
            self.cache
                .warmup(
                    &key,
                    self.config.period_stats_cache,
                    self.period_compute(user_id, period, emit),
                )
                .await
                .map_err(flatten_cache_error)?;
        }

        let key = CacheManager::key(user_id, "mmr_trajectory", &DEFAULT_MMR_DAYS.to_string());
        match self
            .cache
            .warmup(
                &key,
                self.config.mmr_cache,
                self.mmr_compute(user_id, DEFAULT_MMR_DAYS, true),
            )
            .await
        {
            Ok(_) => {}
            Err(CacheError::Compute(ComputeError::NoData { .. })) => {
                tracing::debug!(user_id, "no matches yet, skipping MMR warmup");
            }
            Err(e) => return Err(flatten_cache_error(e).into()),
        }

        let key = CacheManager::key(user_id, "recommendations", "month");
        self.cache
            .warmup(
                &key,
                self.config.recommendations_cache,
                self.recommend_compute(user_id, true),
            )
            .await
            .map_err(flatten_cache_error)?;

        tracing::info!(user_id, "user caches warmed");
        Ok(())
    }

    /// Ingest hook: generate key-moment insights for the new match, drop the
    /// user's stale caches, and warm them (which generates the remaining
    /// insight kinds).
    ///
    /// # Errors
    ///
    /// As in [`Self::warm_user_caches`].
    pub async fn on_match_ingested(
        &self,
        user_id: i64,
        m: &MatchRecord,
    ) -> Result<(), AnalyticsError> {
        self.generator.process_match(user_id, m).await;
        self.invalidate_user(user_id);
        self.warm_user_caches(user_id).await
    }

    /// Cache-check → pool submit → await with timeout, decoding the cached
    /// JSON payload into the product type.
    ///
    /// Takes the computation future twice because the two paths consume it
    /// differently: `refresh` feeds a possible stale-serve background
    /// recompute, `compute` runs in the pool on a miss. Futures are lazy,
    /// so whichever path is not taken costs nothing.
    async fn cached_product<T, Fut>(
        &self,
        key: &str,
        policy: CachePolicy,
        label: &str,
        refresh: Fut,
        compute: Fut,
    ) -> Result<T, AnalyticsError>
    where
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = Result<Vec<u8>, ComputeError>> + Send + 'static,
    {
        if let Some(cached) = self.cache.get_cached(key, policy, refresh) {
            return decode(&cached?);
        }

        let cache = Arc::clone(&self.cache);
        let key_owned = key.to_string();
        let handle = self.pool.submit(label, async move {
            cache
                .get_or_compute(&key_owned, policy, compute)
                .await
                .map_err(flatten_cache_error)
        })?;

        let bytes = handle
            .await_with_timeout(self.config.compute_timeout())
            .await?;
        decode(&bytes)
    }

    /// Build the period-stats computation future. `emit_insights` is set
    /// only on the ingest/warmup path.
    fn period_compute(
        &self,
        user_id: i64,
        period: Period,
        emit_insights: bool,
    ) -> impl Future<Output = Result<Vec<u8>, ComputeError>> + Send + 'static {
        let store = Arc::clone(&self.store);
        let generator = emit_insights.then(|| Arc::clone(&self.generator));
        let min_games = self.config.min_games;
        async move {
            let now = Utc::now();
            let calculator = PeriodStatsCalculator::new(Arc::clone(&store), min_games);
            let stats = calculator.calculate(user_id, period, now).await?;
            if let Some(generator) = generator {
                let (from, to) = period.window(now);
                let matches = store
                    .matches_between(user_id, from, to)
                    .await
                    .unwrap_or_default();
                generator
                    .process_period_stats(user_id, &stats, &matches)
                    .await;
            }
            encode(&stats)
        }
    }

    fn mmr_compute(
        &self,
        user_id: i64,
        days: u16,
        emit_insights: bool,
    ) -> impl Future<Output = Result<Vec<u8>, ComputeError>> + Send + 'static {
        let store = Arc::clone(&self.store);
        let generator = emit_insights.then(|| Arc::clone(&self.generator));
        async move {
            let estimator = MmrEstimator::new(store);
            let trajectory = estimator.trajectory(user_id, days, Utc::now()).await?;
            if let Some(generator) = generator {
                generator.process_mmr(user_id, &trajectory).await;
            }
            encode(&trajectory)
        }
    }

    fn recommend_compute(
        &self,
        user_id: i64,
        emit_insights: bool,
    ) -> impl Future<Output = Result<Vec<u8>, ComputeError>> + Send + 'static {
        let store = Arc::clone(&self.store);
        let generator = emit_insights.then(|| Arc::clone(&self.generator));
        async move {
            let engine = RecommendationEngine::new(store);
            let recommendations = engine.recommend(user_id, Utc::now()).await?;
            if let Some(generator) = generator {
                generator
                    .process_recommendations(user_id, &recommendations)
                    .await;
            }
            encode(&recommendations)
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ComputeError> {
    serde_json::to_vec(value).map_err(|e| ComputeError::Serialization {
        message: format!("{e}"),
    })
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, AnalyticsError> {
    serde_json::from_slice(bytes).map_err(|e| {
        AnalyticsError::Compute(ComputeError::Serialization {
            message: format!("{e}"),
        })
    })
}

/// Collapse cache-layer failures into the compute taxonomy for pool tasks:
/// the shared computation's own error passes through, codec and abandoned
/// flights become internal errors.
fn flatten_cache_error(e: CacheError) -> ComputeError {
    match e {
        CacheError::Compute(inner) => inner,
        other => ComputeError::Internal {
            message: format!("{other}"),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::broker::NotificationBroker;
    use crate::insights::InsightStore;
    use crate::matches::{InMemoryMatchStore, Role};
    use chrono::{DateTime, Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).single().unwrap()
    }

    fn game(days_ago: i64, win: bool) -> MatchRecord {
        MatchRecord {
            match_id: format!("m-{days_ago}"),
            played_at: fixed_now() - Duration::days(days_ago),
            win,
            role: Role::Middle,
            champion: "Ahri".into(),
            kills: 7,
            deaths: 3,
            assists: 5,
            cs: 200,
            gold: 11_000,
            damage_to_champions: 20_000,
            damage_share: 0.26,
            vision_score: 19,
            objectives: 2,
            duration_secs: 1850,
            first_blood: false,
            largest_multi_kill: 1,
            shutdown_gold: 0,
        }
    }

    async fn engine_with(
        matches: Vec<MatchRecord>,
    ) -> (AnalyticsEngine, Arc<InsightStore>, Arc<NotificationBroker>) {
        let store = Arc::new(InMemoryMatchStore::new());
        store.insert(1, matches);
        let insight_store = Arc::new(InsightStore::new_in_memory().await.unwrap());
        let broker = Arc::new(NotificationBroker::new(20));
        let generator = Arc::new(InsightGenerator::new(
            Arc::clone(&insight_store),
            Arc::clone(&broker),
        ));
        let engine = AnalyticsEngine::new(
            Arc::new(CacheManager::new()),
            Arc::new(WorkerPool::new(2, 32)),
            store,
            generator,
            Config::default(),
        );
        (engine, insight_store, broker)
    }

    #[tokio::test]
    async fn period_stats_round_trip_through_cache() {
        let (engine, _insights, _broker) = engine_with((1..=6).map(|d| game(d, true)).collect()).await;

        let first = engine.get_period_stats(1, Period::Week).await.unwrap();
        assert_eq!(first.total_games, 6);

        // Second call is a cache hit with an identical payload.
        let second = engine.get_period_stats(1, Period::Week).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn reads_do_not_generate_insights_but_warmup_does() {
        let (engine, insights, _broker) =
            engine_with((1..=8).rev().map(|d| game(d, true)).collect()).await;

        engine.get_period_stats(1, Period::Week).await.unwrap();
        assert!(insights.list(1, None, false).await.unwrap().is_empty());

        engine.warm_user_caches(1).await.unwrap();
        let generated = insights.list(1, None, false).await.unwrap();
        assert!(
            !generated.is_empty(),
            "warmup path should emit streak/mmr insights for a winning run"
        );
    }

    #[tokio::test]
    async fn mmr_no_data_surfaces_as_compute_error() {
        let (engine, _insights, _broker) = engine_with(Vec::new()).await;
        let err = engine.get_mmr_trajectory(1, 30).await.unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::Compute(ComputeError::NoData { user_id: 1 })
        ));
    }

    #[tokio::test]
    async fn warmup_tolerates_users_with_no_matches() {
        let (engine, _insights, _broker) = engine_with(Vec::new()).await;
        engine.warm_user_caches(1).await.unwrap();
    }

    #[tokio::test]
    async fn invalidate_user_drops_cached_products() {
        let (engine, _insights, _broker) = engine_with((1..=6).map(|d| game(d, true)).collect()).await;
        engine.get_period_stats(1, Period::Week).await.unwrap();
        engine.get_recommendations(1).await.unwrap();

        let removed = engine.invalidate_user(1);
        assert_eq!(removed, 2);
    }
}
