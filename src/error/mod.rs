//! Error types for the analytics core.
//!
//! This module defines a hierarchical error system:
//! - [`AnalyticsError`]: Top-level application errors
//! - [`ValidationError`]: Request validation errors (4xx-equivalent, never retried)
//! - [`ComputeError`]: Calculator execution errors
//! - [`PoolError`]: Worker pool saturation and timeout errors
//! - [`CacheError`]: Cache manager errors
//! - [`StorageError`]: Insight store errors
//! - [`ConfigError`]: Configuration errors
//!
//! Saturation and timeout are deliberately distinct from computation failure
//! so callers can retry with backoff on the former and surface the latter.
//! All errors implement `Send + Sync` for async compatibility.

use thiserror::Error;

/// Top-level application error.
///
/// This is the main error type returned by public API functions.
/// It wraps all subsystem errors for unified error handling.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Request validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Calculator execution error.
    #[error("Computation error: {0}")]
    Compute(#[from] ComputeError),

    /// Worker pool error.
    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    /// Cache manager error.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Insight store error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AnalyticsError {
    /// Returns true if this error is retryable.
    ///
    /// Pool saturation and timeouts are retryable with backoff.
    /// Validation errors never are.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Pool(PoolError::Saturated { .. } | PoolError::Timeout { .. })
        )
    }
}

/// Request validation errors.
///
/// These map to 4xx responses in the host HTTP layer. Each variant carries
/// a stable machine-readable code via [`ValidationError::code`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Unknown analytics period.
    #[error("Valid periods: today, week, month, season, all")]
    InvalidPeriod {
        /// The period string that was rejected.
        given: String,
    },

    /// Days parameter out of range.
    #[error("Days must be between 1 and 365")]
    InvalidDays {
        /// The value that was rejected.
        given: i64,
    },

    /// Batch request name not in the allow-list.
    #[error("Invalid request type: {given}; valid types: {valid}")]
    UnknownBatchRequest {
        /// The request name that was rejected.
        given: String,
        /// Comma-separated allow-list, enumerated for the client.
        valid: String,
    },

    /// Mark-read called with an empty id list.
    #[error("No insight IDs provided")]
    EmptyInsightIds,

    /// Limit parameter out of range.
    #[error("Limit must be between 1 and {max}")]
    InvalidLimit {
        /// The value that was rejected.
        given: i64,
        /// Maximum accepted limit.
        max: i64,
    },
}

impl ValidationError {
    /// Stable machine-readable error code for the host HTTP layer.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidPeriod { .. } => "invalid_period",
            Self::InvalidDays { .. } => "invalid_days",
            Self::UnknownBatchRequest { .. } => "invalid_request_type",
            Self::EmptyInsightIds => "empty_insight_ids",
            Self::InvalidLimit { .. } => "invalid_limit",
        }
    }
}

/// Calculator execution errors.
///
/// These are `Clone` because a single computation result is fanned out to
/// every caller waiting on the same single-flight guard.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ComputeError {
    /// The upstream match store failed.
    #[error("Upstream match store failed: {message}")]
    Upstream {
        /// Description of the upstream failure.
        message: String,
    },

    /// No match data available for the user.
    #[error("No matches found for user {user_id}")]
    NoData {
        /// The user with no match history.
        user_id: i64,
    },

    /// Result serialization failed.
    #[error("Serialization failed: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// Internal calculator error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

/// Worker pool errors.
///
/// [`PoolError::Saturated`] and [`PoolError::Timeout`] are distinct kinds so
/// a caller can tell "too busy" and "too slow" apart from "broken".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The task queue is full; the submission was rejected without blocking.
    #[error("Worker pool saturated: queue depth {queue_depth} reached")]
    Saturated {
        /// Configured queue depth that was exceeded.
        queue_depth: usize,
    },

    /// The caller's deadline elapsed before the task completed.
    ///
    /// The task itself keeps running and may still populate the cache.
    #[error("Task timed out after {timeout_ms}ms")]
    Timeout {
        /// The caller-supplied timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The pool has shut down or the task was dropped without a result.
    #[error("Worker pool unavailable")]
    Closed,
}

/// Cache manager errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The computation run under the single-flight guard failed.
    ///
    /// Failed results are not cached; the next caller retries.
    #[error("Cached computation failed: {0}")]
    Compute(#[from] ComputeError),

    /// The compression codec failed.
    #[error("Codec failed: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    /// The single-flight broadcast closed before delivering a result.
    #[error("In-flight computation was abandoned")]
    FlightAbandoned,
}

/// Insight store errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to connect to the database.
    #[error("Database connection failed: {message}")]
    ConnectionFailed {
        /// Description of the connection failure.
        message: String,
    },

    /// A database query failed.
    #[error("Query failed: {message}")]
    QueryFailed {
        /// Description of the failure.
        message: String,
    },

    /// Database migration failed.
    #[error("Migration failed: {version} - {message}")]
    MigrationFailed {
        /// The migration version that failed.
        version: String,
        /// Description of the failure.
        message: String,
    },
}

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required configuration is missing.
    #[error("Missing required: {var}")]
    MissingRequired {
        /// The missing variable name.
        var: String,
    },

    /// Configuration value is invalid.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// The variable name.
        var: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// Configuration value failed to parse.
    #[error("Failed to parse {var}: {reason}")]
    ParseFailed {
        /// The variable name.
        var: String,
        /// Why parsing failed.
        reason: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn validation_codes_are_stable() {
        assert_eq!(
            ValidationError::InvalidPeriod {
                given: "year".into()
            }
            .code(),
            "invalid_period"
        );
        assert_eq!(
            ValidationError::InvalidDays { given: 400 }.code(),
            "invalid_days"
        );
        assert_eq!(ValidationError::EmptyInsightIds.code(), "empty_insight_ids");
    }

    #[test]
    fn empty_ids_message_matches_contract() {
        assert_eq!(
            ValidationError::EmptyInsightIds.to_string(),
            "No insight IDs provided"
        );
    }

    #[test]
    fn saturation_and_timeout_are_retryable() {
        assert!(AnalyticsError::Pool(PoolError::Saturated { queue_depth: 64 }).is_retryable());
        assert!(AnalyticsError::Pool(PoolError::Timeout { timeout_ms: 5000 }).is_retryable());
        assert!(!AnalyticsError::Validation(ValidationError::EmptyInsightIds).is_retryable());
        assert!(!AnalyticsError::Compute(ComputeError::Internal {
            message: "boom".into()
        })
        .is_retryable());
    }

    #[test]
    fn compute_error_is_cloneable_for_single_flight() {
        let err = ComputeError::Upstream {
            message: "connection reset".into(),
        };
        let cloned = err.clone();
        assert_eq!(err, cloned);
    }
}
