//! Configuration validation.
//!
//! This module provides validation logic for configuration values,
//! ensuring they are within acceptable ranges.

use super::Config;
use crate::error::ConfigError;

/// Minimum allowed compute timeout in milliseconds (1 second).
pub const MIN_TIMEOUT_MS: u64 = 1000;

/// Maximum allowed compute timeout in milliseconds (5 minutes).
pub const MAX_TIMEOUT_MS: u64 = 300_000;

/// Maximum allowed worker count.
pub const MAX_WORKERS: usize = 64;

/// Maximum allowed task queue depth.
pub const MAX_QUEUE_DEPTH: usize = 100_000;

/// Validate configuration values.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if any value is out of range:
/// - `WORKER_COUNT` must be between 1 and 64
/// - `QUEUE_DEPTH` must be between 1 and 100000
/// - `COMPUTE_TIMEOUT_MS` must be between 1000 and 300000
/// - `SUBSCRIBER_BUFFER` must be between 1 and 1000
/// - Every cache policy must keep `refresh_threshold < ttl`
#[must_use = "validation result should be checked"]
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.worker_count == 0 || config.worker_count > MAX_WORKERS {
        return Err(ConfigError::InvalidValue {
            var: "WORKER_COUNT".into(),
            reason: format!("must be between 1 and {MAX_WORKERS}"),
        });
    }

    if config.queue_depth == 0 || config.queue_depth > MAX_QUEUE_DEPTH {
        return Err(ConfigError::InvalidValue {
            var: "QUEUE_DEPTH".into(),
            reason: format!("must be between 1 and {MAX_QUEUE_DEPTH}"),
        });
    }

    if config.compute_timeout_ms < MIN_TIMEOUT_MS || config.compute_timeout_ms > MAX_TIMEOUT_MS {
        return Err(ConfigError::InvalidValue {
            var: "COMPUTE_TIMEOUT_MS".into(),
            reason: format!("must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS} ms"),
        });
    }

    if config.subscriber_buffer == 0 || config.subscriber_buffer > 1000 {
        return Err(ConfigError::InvalidValue {
            var: "SUBSCRIBER_BUFFER".into(),
            reason: "must be between 1 and 1000".into(),
        });
    }

    if config.janitor_interval_secs == 0 {
        return Err(ConfigError::InvalidValue {
            var: "JANITOR_INTERVAL_SECS".into(),
            reason: "must be positive".into(),
        });
    }

    for (name, policy) in [
        ("period_stats", &config.period_stats_cache),
        ("mmr", &config.mmr_cache),
        ("recommendations", &config.recommendations_cache),
    ] {
        if policy.refresh_threshold >= policy.ttl {
            return Err(ConfigError::InvalidValue {
                var: format!("{name}_cache"),
                reason: "refresh_threshold must be below ttl".into(),
            });
        }
    }

    Ok(())
}
