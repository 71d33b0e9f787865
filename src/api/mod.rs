//! Transport-agnostic request layer.
//!
//! The HTTP router and its auth middleware are the host's concern; once a
//! request carries an authenticated user id, it lands here. This module
//! validates parameters, shapes responses, and enforces that cache
//! operations only ever touch the calling user's entries.

pub mod params;
pub mod responses;

pub use params::{BatchRequest, MarkReadRequest};
pub use responses::{CacheOpResponse, ErrorBody, InsightListResponse, MarkReadResponse};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::analytics::{AnalyticsEngine, BatchOutcome, MmrTrajectory, PeriodStats, Recommendation};
use crate::broker::NotificationBroker;
use crate::config::Config;
use crate::error::AnalyticsError;
use crate::insights::{InsightStats, InsightStore};
use crate::stream::{SseFrame, SseStreamHandler, StreamSummary};

/// Capacity of the frame channel handed to the host per stream.
const STREAM_SINK_CAPACITY: usize = 32;

/// Request handlers for every external operation.
pub struct AnalyticsApi {
    engine: Arc<AnalyticsEngine>,
    insights: Arc<InsightStore>,
    broker: Arc<NotificationBroker>,
    config: Config,
}

impl AnalyticsApi {
    /// Wire the api layer to its collaborators.
    #[must_use]
    pub fn new(
        engine: Arc<AnalyticsEngine>,
        insights: Arc<InsightStore>,
        broker: Arc<NotificationBroker>,
        config: Config,
    ) -> Self {
        Self {
            engine,
            insights,
            broker,
            config,
        }
    }

    /// `GET /analytics/period/{period}`.
    ///
    /// # Errors
    ///
    /// `invalid_period` for an unknown period; compute/pool errors from the
    /// engine otherwise.
    pub async fn period_stats(
        &self,
        user_id: i64,
        period: &str,
    ) -> Result<PeriodStats, AnalyticsError> {
        let period = params::parse_period(period)?;
        self.engine.get_period_stats(user_id, period).await
    }

    /// `GET /analytics/mmr?days=N`.
    ///
    /// # Errors
    ///
    /// `invalid_days` outside 1..=365; compute/pool errors otherwise.
    pub async fn mmr_trajectory(
        &self,
        user_id: i64,
        days: i64,
    ) -> Result<MmrTrajectory, AnalyticsError> {
        let days = params::parse_days(days)?;
        self.engine.get_mmr_trajectory(user_id, days).await
    }

    /// `GET /analytics/recommendations`.
    ///
    /// # Errors
    ///
    /// Compute/pool errors from the engine.
    pub async fn recommendations(
        &self,
        user_id: i64,
    ) -> Result<Vec<Recommendation>, AnalyticsError> {
        self.engine.get_recommendations(user_id).await
    }

    /// `POST /analytics/batch`.
    ///
    /// # Errors
    ///
    /// `invalid_request_type` when any name is outside the allow-list; the
    /// whole batch is rejected before any work.
    pub async fn batch(
        &self,
        user_id: i64,
        request: &BatchRequest,
    ) -> Result<HashMap<String, BatchOutcome>, AnalyticsError> {
        self.engine.run_batch(user_id, &request.requests).await
    }

    /// `POST /analytics/cache/invalidate`, scoped to the calling user.
    pub fn invalidate_cache(&self, user_id: i64) -> CacheOpResponse {
        let removed = self.engine.invalidate_user(user_id);
        CacheOpResponse {
            success: true,
            message: format!("{removed} cache entries invalidated"),
        }
    }

    /// `POST /analytics/cache/warmup`, scoped to the calling user.
    ///
    /// # Errors
    ///
    /// Compute errors from the forced recomputation.
    pub async fn warmup_cache(&self, user_id: i64) -> Result<CacheOpResponse, AnalyticsError> {
        self.engine.warm_user_caches(user_id).await?;
        Ok(CacheOpResponse {
            success: true,
            message: "user caches warmed".to_string(),
        })
    }

    /// `GET /notifications/insights?limit=N&only_unread=bool`.
    ///
    /// # Errors
    ///
    /// `invalid_limit` for a bad limit; storage errors otherwise.
    pub async fn insights(
        &self,
        user_id: i64,
        limit: Option<i64>,
        only_unread: bool,
    ) -> Result<InsightListResponse, AnalyticsError> {
        let limit = params::parse_limit(limit)?;
        let insights = self.insights.list(user_id, limit, only_unread).await?;
        let (total, unread_count) = self.insights.counts(user_id).await?;
        Ok(InsightListResponse {
            insights,
            total,
            unread_count,
        })
    }

    /// `POST /notifications/insights/read`.
    ///
    /// # Errors
    ///
    /// "No insight IDs provided" for an empty list; storage errors
    /// otherwise.
    pub async fn mark_insights_read(
        &self,
        user_id: i64,
        request: &MarkReadRequest,
    ) -> Result<MarkReadResponse, AnalyticsError> {
        request.validate()?;
        let count = self
            .insights
            .mark_read(user_id, &request.insight_ids)
            .await?;
        Ok(MarkReadResponse {
            success: true,
            count,
        })
    }

    /// `GET /notifications/stats`.
    ///
    /// # Errors
    ///
    /// Storage errors from the insight store.
    pub async fn insight_stats(&self, user_id: i64) -> Result<InsightStats, AnalyticsError> {
        Ok(self.insights.stats(user_id).await?)
    }

    /// `GET /notifications/stream`.
    ///
    /// Opens the long-lived event stream: the host forwards rendered frames
    /// from the returned receiver onto its response body and flips the
    /// cancellation signal when the client goes away.
    pub fn open_stream(
        &self,
        user_id: i64,
        cancel: watch::Receiver<bool>,
    ) -> (mpsc::Receiver<SseFrame>, JoinHandle<StreamSummary>) {
        let (sink_tx, sink_rx) = mpsc::channel(STREAM_SINK_CAPACITY);
        let handler = SseStreamHandler::new(
            Arc::clone(&self.broker),
            self.config.heartbeat_interval(),
        );
        let handle = tokio::spawn(async move { handler.run(user_id, sink_tx, cancel).await });
        (sink_rx, handle)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::cache::CacheManager;
    use crate::error::ValidationError;
    use crate::insights::InsightGenerator;
    use crate::matches::{InMemoryMatchStore, MatchRecord, Role};
    use crate::pool::WorkerPool;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    fn game(days_ago: i64, win: bool) -> MatchRecord {
        MatchRecord {
            match_id: format!("m-{days_ago}"),
            played_at: Utc::now() - Duration::days(days_ago),
            win,
            role: Role::Bottom,
            champion: "Jinx".into(),
            kills: 8,
            deaths: 4,
            assists: 6,
            cs: 220,
            gold: 12_000,
            damage_to_champions: 24_000,
            damage_share: 0.30,
            vision_score: 14,
            objectives: 2,
            duration_secs: 1900,
            first_blood: false,
            largest_multi_kill: 2,
            shutdown_gold: 0,
        }
    }

    async fn api_with(matches: Vec<MatchRecord>) -> AnalyticsApi {
        let store = Arc::new(InMemoryMatchStore::new());
        store.insert(1, matches);
        let insights = Arc::new(InsightStore::new_in_memory().await.unwrap());
        let broker = Arc::new(NotificationBroker::new(20));
        let generator = Arc::new(InsightGenerator::new(
            Arc::clone(&insights),
            Arc::clone(&broker),
        ));
        let config = Config::default();
        let engine = Arc::new(AnalyticsEngine::new(
            Arc::new(CacheManager::new()),
            Arc::new(WorkerPool::new(2, 32)),
            store,
            generator,
            config.clone(),
        ));
        AnalyticsApi::new(engine, insights, broker, config)
    }

    #[tokio::test]
    async fn unknown_period_maps_to_invalid_period() {
        let api = api_with(vec![game(1, true)]).await;
        let err = api.period_stats(1, "year").await.unwrap_err();
        let AnalyticsError::Validation(validation) = err else {
            panic!("expected validation error");
        };
        assert_eq!(validation.code(), "invalid_period");
    }

    #[tokio::test]
    async fn days_400_maps_to_invalid_days() {
        let api = api_with(vec![game(1, true)]).await;
        let err = api.mmr_trajectory(1, 400).await.unwrap_err();
        let AnalyticsError::Validation(validation) = err else {
            panic!("expected validation error");
        };
        assert_eq!(validation.code(), "invalid_days");
        assert_eq!(ErrorBody::from(&validation).error, "invalid_days");
    }

    #[tokio::test]
    async fn batch_rejects_before_executing_valid_entries() {
        let api = api_with((1..=6).map(|d| game(d, true)).collect()).await;
        let request = BatchRequest {
            requests: vec![
                "period_stats_week".to_string(),
                "not_a_real_request".to_string(),
            ],
        };
        let err = api.batch(1, &request).await.unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::Validation(ValidationError::UnknownBatchRequest { .. })
        ));
        // No entry ran: nothing was cached for the valid name either.
        let response = api.invalidate_cache(1);
        assert_eq!(response.message, "0 cache entries invalidated");
    }

    #[tokio::test]
    async fn valid_batch_resolves_every_entry() {
        let api = api_with((1..=6).map(|d| game(d, true)).collect()).await;
        let request = BatchRequest {
            requests: vec![
                "period_stats_week".to_string(),
                "mmr_trajectory".to_string(),
                "recommendations".to_string(),
            ],
        };
        let outcomes = api.batch(1, &request).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.values().all(BatchOutcome::is_success));
    }

    #[tokio::test]
    async fn empty_mark_read_is_rejected_with_contract_message() {
        let api = api_with(Vec::new()).await;
        let request = MarkReadRequest {
            insight_ids: Vec::new(),
        };
        let err = api.mark_insights_read(1, &request).await.unwrap_err();
        let AnalyticsError::Validation(validation) = err else {
            panic!("expected validation error");
        };
        assert_eq!(validation.to_string(), "No insight IDs provided");
    }
}
