//! Insight model, generation rules, durable storage, and expiry.
//!
//! An insight is a typed notification describing a noteworthy analytics
//! event: a performance shift, a streak, an MMR move, a champion milestone,
//! or a fresh recommendation digest. Insights are written once, mutated only
//! by mark-as-read, pushed to live subscribers through the broker, and
//! removed by the expiry janitor once past their `expires_at`.

pub mod generator;
pub mod janitor;
pub mod store;

pub use generator::InsightGenerator;
pub use janitor::ExpiryJanitor;
pub use store::{InsightStats, InsightStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Insight category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    /// Performance score movement or standout match events.
    Performance,
    /// Win or loss streaks.
    Streak,
    /// New recommendation digest.
    Recommendation,
    /// MMR movement or rank changes.
    Mmr,
    /// Champion-specific milestones.
    Champion,
}

impl InsightType {
    /// Stable string tag, matching the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Performance => "performance",
            Self::Streak => "streak",
            Self::Recommendation => "recommendation",
            Self::Mmr => "mmr",
            Self::Champion => "champion",
        }
    }

    /// Parse the wire tag.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "performance" => Some(Self::Performance),
            "streak" => Some(Self::Streak),
            "recommendation" => Some(Self::Recommendation),
            "mmr" => Some(Self::Mmr),
            "champion" => Some(Self::Champion),
            _ => None,
        }
    }
}

/// Urgency level of an insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightLevel {
    /// Neutral information.
    Info,
    /// Something needs attention.
    Warning,
    /// A positive event.
    Success,
    /// A major event, positive or negative.
    Critical,
}

impl InsightLevel {
    /// Stable string tag, matching the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Success => "success",
            Self::Critical => "critical",
        }
    }

    /// Parse the wire tag.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "success" => Some(Self::Success),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Kind of streak an insight describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakKind {
    /// Consecutive wins.
    Win,
    /// Consecutive losses.
    Loss,
}

/// Typed payload attached to an insight.
///
/// Closed tagged union: every insight type carries exactly the structured
/// data its consumers need, with no opaque maps to type-assert at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InsightPayload {
    /// Composite performance score moved between windows.
    PerformanceShift {
        /// Fractional score change; positive is improvement.
        change: f64,
    },
    /// A standout in-match event.
    KeyMoment {
        /// Match the moment happened in.
        match_id: String,
        /// Event name (first blood, multi kill, shutdown, ...).
        event: String,
        /// Magnitude where applicable (multi-kill size, bounty gold).
        magnitude: i64,
    },
    /// An active win or loss streak.
    Streak {
        /// Streak direction.
        streak: StreakKind,
        /// Current length.
        length: u32,
    },
    /// Aggregate MMR movement over recent games.
    MmrShift {
        /// Net MMR change.
        change: i32,
    },
    /// The estimated rank crossed a boundary upward.
    RankPromotion {
        /// The new rank, display form.
        new_rank: String,
    },
    /// Sustained success on one champion.
    ChampionMastery {
        /// Champion name.
        champion: String,
        /// Win rate on the champion, [0,1].
        win_rate: f64,
        /// Games in the sample.
        games: u32,
    },
    /// Fresh high-priority recommendations are available.
    RecommendationDigest {
        /// Number of high-priority entries.
        high_priority: u32,
        /// Total recommendations generated.
        total: u32,
    },
}

/// A stored, deliverable insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    /// Store-assigned identifier.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// Category tag.
    #[serde(rename = "type")]
    pub insight_type: InsightType,
    /// Urgency level.
    pub level: InsightLevel,
    /// Short headline.
    pub title: String,
    /// Full message.
    pub message: String,
    /// Typed payload.
    pub payload: InsightPayload,
    /// Page that explains the insight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    /// Whether the user has read it.
    pub is_read: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time after which the janitor removes it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// An insight that has not been persisted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInsight {
    /// Owning user.
    pub user_id: i64,
    /// Category tag.
    pub insight_type: InsightType,
    /// Urgency level.
    pub level: InsightLevel,
    /// Short headline.
    pub title: String,
    /// Full message.
    pub message: String,
    /// Typed payload.
    pub payload: InsightPayload,
    /// Page that explains the insight.
    pub action_url: Option<String>,
    /// Time after which the janitor removes it.
    pub expires_at: Option<DateTime<Utc>>,
}
