//! Configuration management.
//!
//! This module handles:
//! - Environment variable loading
//! - Configuration validation
//! - Default value handling
//!
//! # Example
//!
//! ```
//! use rift_analytics::config::Config;
//!
//! let config = Config::default();
//! assert_eq!(config.worker_count, 4);
//! assert!(config.period_stats_cache.refresh_threshold < config.period_stats_cache.ttl);
//! ```

mod validation;

pub use validation::{
    validate_config, MAX_QUEUE_DEPTH, MAX_TIMEOUT_MS, MAX_WORKERS, MIN_TIMEOUT_MS,
};

use std::time::Duration;

use crate::error::ConfigError;

/// Default database path for the insight store.
pub const DEFAULT_DATABASE_PATH: &str = "./data/insights.db";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default number of analytics workers.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default task queue depth (tasks beyond this are rejected, not queued).
pub const DEFAULT_QUEUE_DEPTH: usize = 400;

/// Default caller-side compute timeout in milliseconds.
pub const DEFAULT_COMPUTE_TIMEOUT_MS: u64 = 15_000;

/// Default per-subscriber delivery buffer capacity.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 20;

/// Default stream heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default expiry janitor interval in seconds.
pub const DEFAULT_JANITOR_INTERVAL_SECS: u64 = 1800;

/// Minimum games in a window before a period score is considered meaningful.
pub const DEFAULT_MIN_GAMES: usize = 5;

/// Freshness policy for one cached analytics product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Age at which an entry stops being served at all.
    pub ttl: Duration,
    /// Age past which a hit is still served but triggers a background recompute.
    pub refresh_threshold: Duration,
    /// Whether the stored payload is gzip-compressed.
    pub compress: bool,
}

impl CachePolicy {
    /// Policy for period statistics (medium-lived, compressed).
    #[must_use]
    pub const fn period_stats() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            refresh_threshold: Duration::from_secs(20 * 60),
            compress: true,
        }
    }

    /// Policy for MMR trajectories (long histories, compressed).
    #[must_use]
    pub const fn mmr_trajectory() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            refresh_threshold: Duration::from_secs(40 * 60),
            compress: true,
        }
    }

    /// Policy for recommendations (short-lived, already compact).
    #[must_use]
    pub const fn recommendations() -> Self {
        Self {
            ttl: Duration::from_secs(15 * 60),
            refresh_threshold: Duration::from_secs(10 * 60),
            compress: false,
        }
    }
}

/// Application configuration.
///
/// Use [`Config::from_env`] to load configuration from environment
/// variables; [`Config::default`] gives the documented defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Path to the `SQLite` insight database.
    pub database_path: String,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: String,
    /// Number of worker tasks in the analytics pool.
    pub worker_count: usize,
    /// Bounded task queue depth; submissions beyond it fail fast.
    pub queue_depth: usize,
    /// Caller-side timeout for awaiting a pooled computation, in milliseconds.
    pub compute_timeout_ms: u64,
    /// Per-subscriber delivery buffer capacity (drop-on-full beyond it).
    pub subscriber_buffer: usize,
    /// Stream heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Expiry janitor cycle interval in seconds.
    pub janitor_interval_secs: u64,
    /// Minimum games before a period score is reported without the
    /// insufficient-data flag.
    pub min_games: usize,
    /// Freshness policy for period statistics.
    pub period_stats_cache: CachePolicy,
    /// Freshness policy for MMR trajectories.
    pub mmr_cache: CachePolicy,
    /// Freshness policy for recommendations.
    pub recommendations_cache: CachePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            worker_count: DEFAULT_WORKER_COUNT,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            compute_timeout_ms: DEFAULT_COMPUTE_TIMEOUT_MS,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            janitor_interval_secs: DEFAULT_JANITOR_INTERVAL_SECS,
            min_games: DEFAULT_MIN_GAMES,
            period_stats_cache: CachePolicy::period_stats(),
            mmr_cache: CachePolicy::mmr_trajectory(),
            recommendations_cache: CachePolicy::recommendations(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables (with defaults):
    /// - `DATABASE_PATH`: Path to the `SQLite` database (default: `./data/insights.db`)
    /// - `LOG_LEVEL`: Logging level (default: `info`)
    /// - `WORKER_COUNT`: Analytics worker tasks (default: `4`)
    /// - `QUEUE_DEPTH`: Bounded task queue depth (default: `400`)
    /// - `COMPUTE_TIMEOUT_MS`: Caller-side compute timeout (default: `15000`)
    /// - `SUBSCRIBER_BUFFER`: Per-subscriber channel capacity (default: `20`)
    /// - `HEARTBEAT_INTERVAL_SECS`: Stream heartbeat cadence (default: `30`)
    /// - `JANITOR_INTERVAL_SECS`: Expiry janitor cadence (default: `1800`)
    /// - `MIN_GAMES`: Minimum games for a meaningful period score (default: `5`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable fails to parse or any value
    /// fails validation (see [`validate_config`]).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DATABASE_PATH.into());
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.into());

        let config = Self {
            database_path,
            log_level,
            worker_count: parse_env_usize("WORKER_COUNT", DEFAULT_WORKER_COUNT)?,
            queue_depth: parse_env_usize("QUEUE_DEPTH", DEFAULT_QUEUE_DEPTH)?,
            compute_timeout_ms: parse_env_u64("COMPUTE_TIMEOUT_MS", DEFAULT_COMPUTE_TIMEOUT_MS)?,
            subscriber_buffer: parse_env_usize("SUBSCRIBER_BUFFER", DEFAULT_SUBSCRIBER_BUFFER)?,
            heartbeat_interval_secs: parse_env_u64(
                "HEARTBEAT_INTERVAL_SECS",
                DEFAULT_HEARTBEAT_INTERVAL_SECS,
            )?,
            janitor_interval_secs: parse_env_u64(
                "JANITOR_INTERVAL_SECS",
                DEFAULT_JANITOR_INTERVAL_SECS,
            )?,
            min_games: parse_env_usize("MIN_GAMES", DEFAULT_MIN_GAMES)?,
            ..Self::default()
        };

        validate_config(&config)?;
        Ok(config)
    }

    /// Caller-side compute timeout as a [`Duration`].
    #[must_use]
    pub const fn compute_timeout(&self) -> Duration {
        Duration::from_millis(self.compute_timeout_ms)
    }

    /// Heartbeat interval as a [`Duration`].
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Janitor interval as a [`Duration`].
    #[must_use]
    pub const fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }
}

fn parse_env_u64(var: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value.parse().map_err(|e| ConfigError::ParseFailed {
            var: var.into(),
            reason: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_usize(var: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value.parse().map_err(|e| ConfigError::ParseFailed {
            var: var.into(),
            reason: format!("{e}"),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn policies_keep_refresh_below_ttl() {
        for policy in [
            CachePolicy::period_stats(),
            CachePolicy::mmr_trajectory(),
            CachePolicy::recommendations(),
        ] {
            assert!(policy.refresh_threshold < policy.ttl);
        }
    }

    #[test]
    fn duration_accessors_match_fields() {
        let config = Config::default();
        assert_eq!(
            config.compute_timeout(),
            Duration::from_millis(DEFAULT_COMPUTE_TIMEOUT_MS)
        );
        assert_eq!(
            config.janitor_interval(),
            Duration::from_secs(DEFAULT_JANITOR_INTERVAL_SECS)
        );
    }
}
