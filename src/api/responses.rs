//! Response shapes returned to the host HTTP layer.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::insights::Insight;

/// Body of `GET /notifications/insights`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightListResponse {
    /// The matching insights, newest first.
    pub insights: Vec<Insight>,
    /// Non-expired insights stored for the user.
    pub total: i64,
    /// Non-expired unread insights for the user.
    pub unread_count: i64,
}

/// Body of `POST /notifications/insights/read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReadResponse {
    /// Always true on the success path.
    pub success: bool,
    /// How many insights changed state.
    pub count: u64,
}

/// Body of the cache invalidate/warmup endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOpResponse {
    /// Always true on the success path.
    pub success: bool,
    /// What happened, for operators reading responses.
    pub message: String,
}

/// Machine-readable error body for 4xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error code.
    pub error: String,
    /// Human-readable message (enumerates valid values where applicable).
    pub message: String,
}

impl From<&ValidationError> for ErrorBody {
    fn from(e: &ValidationError) -> Self {
        Self {
            error: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn error_body_carries_code_and_message() {
        let err = ValidationError::InvalidDays { given: 400 };
        let body = ErrorBody::from(&err);
        assert_eq!(body.error, "invalid_days");
        assert_eq!(body.message, "Days must be between 1 and 365");
    }

    #[test]
    fn batch_error_body_lists_valid_types() {
        let err = ValidationError::UnknownBatchRequest {
            given: "bogus".into(),
            valid: "period_stats_week, recommendations".into(),
        };
        let body = ErrorBody::from(&err);
        assert_eq!(body.error, "invalid_request_type");
        assert!(body.message.contains("period_stats_week"));
    }
}
