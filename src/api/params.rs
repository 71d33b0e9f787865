//! Request parameter parsing and validation.
//!
//! The host HTTP layer hands over raw strings and numbers once a request is
//! authenticated; everything here is validated synchronously with stable
//! machine-readable error codes before any work is scheduled.

use serde::{Deserialize, Serialize};

use crate::analytics::Period;
use crate::error::ValidationError;

/// Inclusive bounds on the MMR trajectory `days` parameter.
pub const DAYS_RANGE: (i64, i64) = (1, 365);

/// Maximum accepted insight listing limit.
pub const MAX_INSIGHT_LIMIT: i64 = 200;

/// Parse a period path segment.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidPeriod`] for anything outside
/// {today, week, month, season, all}.
pub fn parse_period(raw: &str) -> Result<Period, ValidationError> {
    raw.parse()
}

/// Validate the `days` query parameter (1..=365).
///
/// # Errors
///
/// Returns [`ValidationError::InvalidDays`] when out of range.
pub fn parse_days(days: i64) -> Result<u16, ValidationError> {
    if days < DAYS_RANGE.0 || days > DAYS_RANGE.1 {
        return Err(ValidationError::InvalidDays { given: days });
    }
    u16::try_from(days).map_err(|_| ValidationError::InvalidDays { given: days })
}

/// Validate an optional insight listing limit.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidLimit`] for non-positive or oversized
/// values.
pub fn parse_limit(limit: Option<i64>) -> Result<Option<u32>, ValidationError> {
    match limit {
        None => Ok(None),
        Some(value) if value >= 1 && value <= MAX_INSIGHT_LIMIT => {
            let value = u32::try_from(value).map_err(|_| ValidationError::InvalidLimit {
                given: value,
                max: MAX_INSIGHT_LIMIT,
            })?;
            Ok(Some(value))
        }
        Some(value) => Err(ValidationError::InvalidLimit {
            given: value,
            max: MAX_INSIGHT_LIMIT,
        }),
    }
}

/// Body of `POST /analytics/batch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Requested product names, drawn from the batch allow-list.
    pub requests: Vec<String>,
}

/// Body of `POST /notifications/insights/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkReadRequest {
    /// Insight ids to mark read; must be non-empty.
    pub insight_ids: Vec<i64>,
}

impl MarkReadRequest {
    /// Reject empty id lists.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyInsightIds`] ("No insight IDs
    /// provided") when the list is empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.insight_ids.is_empty() {
            return Err(ValidationError::EmptyInsightIds);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(0)]
    #[test_case(-1)]
    #[test_case(366)]
    #[test_case(400)]
    fn out_of_range_days_rejected(days: i64) {
        let err = parse_days(days).unwrap_err();
        assert_eq!(err.code(), "invalid_days");
        assert_eq!(err.to_string(), "Days must be between 1 and 365");
    }

    #[test_case(1)]
    #[test_case(30)]
    #[test_case(365)]
    fn in_range_days_accepted(days: i64) {
        assert_eq!(parse_days(days).unwrap(), u16::try_from(days).unwrap());
    }

    #[test]
    fn empty_mark_read_body_rejected() {
        let request = MarkReadRequest {
            insight_ids: Vec::new(),
        };
        let err = request.validate().unwrap_err();
        assert_eq!(err.to_string(), "No insight IDs provided");
    }

    #[test]
    fn limit_bounds_enforced() {
        assert_eq!(parse_limit(None).unwrap(), None);
        assert_eq!(parse_limit(Some(50)).unwrap(), Some(50));
        assert!(parse_limit(Some(0)).is_err());
        assert!(parse_limit(Some(MAX_INSIGHT_LIMIT + 1)).is_err());
    }

    #[test]
    fn batch_request_deserializes() {
        let request: BatchRequest =
            serde_json::from_str(r#"{"requests":["period_stats_week"]}"#).unwrap();
        assert_eq!(request.requests, vec!["period_stats_week".to_string()]);
    }
}
