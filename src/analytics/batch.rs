//! Batch coordination: several analytics products in one round trip.
//!
//! Request names are validated against a fixed allow-list before any work
//! happens: one unknown name rejects the whole batch, enumerating the
//! valid set. Once validated, each request resolves independently through
//! the cache/pool path; a runtime failure on one entry degrades that entry,
//! not the batch. The asymmetry is deliberate and both halves are tested.

use std::collections::HashMap;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use super::{
    AnalyticsEngine, MmrTrajectory, Period, PeriodStats, Recommendation, DEFAULT_MMR_DAYS,
};
use crate::error::{AnalyticsError, ValidationError};

/// Request names accepted by [`AnalyticsEngine::run_batch`].
pub const BATCH_ALLOW_LIST: [&str; 4] = [
    "period_stats_week",
    "period_stats_month",
    "mmr_trajectory",
    "recommendations",
];

/// A computed analytics product.
///
/// Closed union over everything the calculators produce. A product is
/// immutable once computed; recomputation supersedes the cache entry, it
/// never mutates one in place. Serialization is untagged so each entry's
/// wire shape is the product's own payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalyticsProduct {
    /// A windowed performance summary.
    PeriodStats(Box<PeriodStats>),
    /// An MMR trajectory.
    MmrTrajectory(Box<MmrTrajectory>),
    /// Ranked recommendations.
    Recommendations(Vec<Recommendation>),
}

/// Per-entry outcome of a batch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchOutcome {
    /// The entry failed at runtime; the rest of the batch is unaffected.
    Failure {
        /// Human-readable failure description.
        error: String,
    },
    /// The entry's product.
    Success(AnalyticsProduct),
}

impl BatchOutcome {
    /// True for the success variant.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Validate batch request names against [`BATCH_ALLOW_LIST`].
///
/// # Errors
///
/// Returns [`ValidationError::UnknownBatchRequest`] naming the first
/// unknown request and the full valid set.
pub fn validate_requests(requests: &[String]) -> Result<(), ValidationError> {
    for request in requests {
        if !BATCH_ALLOW_LIST.contains(&request.as_str()) {
            return Err(ValidationError::UnknownBatchRequest {
                given: request.clone(),
                valid: BATCH_ALLOW_LIST.join(", "),
            });
        }
    }
    Ok(())
}

impl AnalyticsEngine {
    /// Resolve several analytics products for one user.
    ///
    /// Validation is atomic: any unknown name rejects the entire batch
    /// before any computation starts. Runtime failures are recorded
    /// per-entry as [`BatchOutcome::Failure`].
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Validation`] for an unknown request name.
    pub async fn run_batch(
        &self,
        user_id: i64,
        requests: &[String],
    ) -> Result<HashMap<String, BatchOutcome>, AnalyticsError> {
        validate_requests(requests)?;

        let entries = join_all(requests.iter().map(|name| async move {
            let outcome = self.resolve(user_id, name).await;
            (name.clone(), outcome)
        }))
        .await;

        Ok(entries.into_iter().collect())
    }

    async fn resolve(&self, user_id: i64, name: &str) -> BatchOutcome {
        let result = match name {
            "period_stats_week" => self
                .get_period_stats(user_id, Period::Week)
                .await
                .map(|stats| AnalyticsProduct::PeriodStats(Box::new(stats))),
            "period_stats_month" => self
                .get_period_stats(user_id, Period::Month)
                .await
                .map(|stats| AnalyticsProduct::PeriodStats(Box::new(stats))),
            "mmr_trajectory" => self
                .get_mmr_trajectory(user_id, DEFAULT_MMR_DAYS)
                .await
                .map(|trajectory| AnalyticsProduct::MmrTrajectory(Box::new(trajectory))),
            "recommendations" => self
                .get_recommendations(user_id)
                .await
                .map(AnalyticsProduct::Recommendations),
            // Unreachable after validation; degrade like a runtime failure.
            other => Err(ValidationError::UnknownBatchRequest {
                given: other.to_string(),
                valid: BATCH_ALLOW_LIST.join(", "),
            }
            .into()),
        };

        match result {
            Ok(product) => BatchOutcome::Success(product),
            Err(e) => {
                tracing::warn!(user_id, request = name, error = %e, "batch entry failed");
                BatchOutcome::Failure {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn known_names_validate() {
        let requests: Vec<String> = BATCH_ALLOW_LIST.iter().map(ToString::to_string).collect();
        assert!(validate_requests(&requests).is_ok());
    }

    #[test]
    fn one_unknown_name_rejects_with_the_valid_set() {
        let requests = vec![
            "period_stats_week".to_string(),
            "not_a_real_request".to_string(),
        ];
        let err = validate_requests(&requests).unwrap_err();
        assert_eq!(err.code(), "invalid_request_type");
        let message = err.to_string();
        assert!(message.contains("not_a_real_request"));
        for name in BATCH_ALLOW_LIST {
            assert!(message.contains(name), "valid set must list {name}");
        }
    }

    #[test]
    fn outcome_serializes_flat() {
        let ok = BatchOutcome::Success(AnalyticsProduct::Recommendations(Vec::new()));
        assert_eq!(serde_json::to_string(&ok).unwrap(), "[]");
        assert!(ok.is_success());

        let failed = BatchOutcome::Failure {
            error: "no matches".into(),
        };
        assert_eq!(
            serde_json::to_string(&failed).unwrap(),
            r#"{"error":"no matches"}"#
        );
        assert!(!failed.is_success());
    }
}
