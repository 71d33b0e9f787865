//! Standalone analytics runtime binary.
//!
//! Runs the analytics core against the bundled in-memory match store: the
//! expiry janitor, worker pool, and notification broker all come up, and
//! the process serves until SIGINT. A host application embeds
//! [`rift_analytics::runtime::AnalyticsRuntime`] with its own
//! `MatchStore` implementation and HTTP layer instead.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use std::sync::Arc;

use rift_analytics::config::Config;
use rift_analytics::matches::InMemoryMatchStore;
use rift_analytics::runtime::AnalyticsRuntime;

#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string())
                .parse()
                .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("rift-analytics starting...");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        database = %config.database_path,
        workers = config.worker_count,
        timeout_ms = config.compute_timeout_ms,
        "configuration loaded"
    );

    let match_store = Arc::new(InMemoryMatchStore::new());
    let runtime = match AnalyticsRuntime::new(config, match_store).await {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Startup error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }

    tracing::info!("shutdown signal received");
    runtime.shutdown().await;
    tracing::info!("rift-analytics shutdown complete");
}
