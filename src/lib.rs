//! Gaming analytics computation and caching core.
//!
//! Turns raw per-match statistics into windowed performance summaries, MMR
//! trajectories, and personalized recommendations; caches the expensive
//! computations; and pushes derived insights to connected clients over a
//! long-lived SSE stream.
//!
//! # Features
//!
//! - TTL + single-flight cache with proactive background refresh
//! - Bounded worker pool with fail-fast saturation and distinct timeouts
//! - Period statistics, MMR trajectory, and recommendation calculators
//! - Rules-based insight generation with a durable `SQLite` store
//! - Non-blocking per-user insight fan-out (drop-on-full)
//! - SSE stream handling as an explicit, testable state machine
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   product    ┌───────────────┐  miss   ┌─────────────┐
//! │ HTTP handler │─────────────▶│ Cache Manager │────────▶│ Worker Pool │
//! │  (external)  │◀─────────────│ (single-flight)│◀───────│ calculators │
//! └──────┬───────┘              └───────────────┘         └──────┬──────┘
//!        │ SSE                                            derived │facts
//!        ▼                                                        ▼
//! ┌──────────────┐  subscribe  ┌────────────────┐  publish ┌─────────────┐
//! │Stream Handler│◀───────────▶│ Notif. Broker  │◀─────────│  Insight    │
//! └──────────────┘             └────────────────┘          │  Generator  │
//!                                                          └──────┬──────┘
//!                                                                 ▼
//!                                                              SQLite
//! ```
//!
//! The HTTP router, session auth, the relational match store, and the
//! game-data provider are external collaborators; the crate consumes them
//! through [`matches::MatchStore`] and the [`api`] layer.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod analytics;
pub mod api;
pub mod broker;
pub mod cache;
pub mod config;
pub mod error;
pub mod insights;
pub mod matches;
pub mod pool;
pub mod runtime;
pub mod stream;
