//! Raw match data types and the seam to the host's relational store.
//!
//! The analytics core never talks to the game-data provider or the match
//! database directly; it consumes [`MatchStore`], which the host application
//! implements against its own storage. An [`InMemoryMatchStore`] is bundled
//! for the standalone binary and for tests.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ComputeError;

/// A player's position for one match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Top lane.
    Top,
    /// Jungle.
    Jungle,
    /// Mid lane.
    Middle,
    /// Bot lane carry.
    Bottom,
    /// Support.
    Utility,
}

impl Role {
    /// All roles, in draft order.
    pub const ALL: [Self; 5] = [
        Self::Top,
        Self::Jungle,
        Self::Middle,
        Self::Bottom,
        Self::Utility,
    ];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Top => "TOP",
            Self::Jungle => "JUNGLE",
            Self::Middle => "MIDDLE",
            Self::Bottom => "BOTTOM",
            Self::Utility => "UTILITY",
        };
        f.write_str(name)
    }
}

/// Ranked ladder tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Iron.
    Iron,
    /// Bronze.
    Bronze,
    /// Silver.
    Silver,
    /// Gold.
    Gold,
    /// Platinum.
    Platinum,
    /// Emerald.
    Emerald,
    /// Diamond.
    Diamond,
    /// Master (single-division apex tier).
    Master,
    /// Grandmaster (single-division apex tier).
    Grandmaster,
    /// Challenger (single-division apex tier).
    Challenger,
}

impl Tier {
    /// Tiers in ascending skill order.
    pub const ORDERED: [Self; 10] = [
        Self::Iron,
        Self::Bronze,
        Self::Silver,
        Self::Gold,
        Self::Platinum,
        Self::Emerald,
        Self::Diamond,
        Self::Master,
        Self::Grandmaster,
        Self::Challenger,
    ];

    /// Whether this tier has a single division.
    #[must_use]
    pub const fn is_apex(self) -> bool {
        matches!(self, Self::Master | Self::Grandmaster | Self::Challenger)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Iron => "IRON",
            Self::Bronze => "BRONZE",
            Self::Silver => "SILVER",
            Self::Gold => "GOLD",
            Self::Platinum => "PLATINUM",
            Self::Emerald => "EMERALD",
            Self::Diamond => "DIAMOND",
            Self::Master => "MASTER",
            Self::Grandmaster => "GRANDMASTER",
            Self::Challenger => "CHALLENGER",
        };
        f.write_str(name)
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IRON" => Ok(Self::Iron),
            "BRONZE" => Ok(Self::Bronze),
            "SILVER" => Ok(Self::Silver),
            "GOLD" => Ok(Self::Gold),
            "PLATINUM" => Ok(Self::Platinum),
            "EMERALD" => Ok(Self::Emerald),
            "DIAMOND" => Ok(Self::Diamond),
            "MASTER" => Ok(Self::Master),
            "GRANDMASTER" => Ok(Self::Grandmaster),
            "CHALLENGER" => Ok(Self::Challenger),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Division within a tier, IV (lowest) to I (highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Division {
    /// Fourth division (entry).
    IV,
    /// Third division.
    III,
    /// Second division.
    II,
    /// First division (promotion gate).
    I,
}

impl Division {
    /// Divisions in ascending order within a tier.
    pub const ORDERED: [Self; 4] = [Self::IV, Self::III, Self::II, Self::I];

    /// Zero-based step of this division within its tier.
    #[must_use]
    pub const fn step(self) -> i32 {
        match self {
            Self::IV => 0,
            Self::III => 1,
            Self::II => 2,
            Self::I => 3,
        }
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IV => "IV",
            Self::III => "III",
            Self::II => "II",
            Self::I => "I",
        };
        f.write_str(name)
    }
}

impl FromStr for Division {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IV" => Ok(Self::IV),
            "III" => Ok(Self::III),
            "II" => Ok(Self::II),
            "I" => Ok(Self::I),
            other => Err(format!("unknown division: {other}")),
        }
    }
}

/// One raw match row, as exported by the host's match ingestion pipeline.
///
/// Carries every per-participant fact the calculators and the insight rules
/// consume; anything else in the provider payload stays with the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Provider match identifier.
    pub match_id: String,
    /// Match start time.
    pub played_at: DateTime<Utc>,
    /// Whether the player's team won.
    pub win: bool,
    /// The player's position.
    pub role: Role,
    /// Champion played.
    pub champion: String,
    /// Kills.
    pub kills: u32,
    /// Deaths.
    pub deaths: u32,
    /// Assists.
    pub assists: u32,
    /// Total minions and monsters killed.
    pub cs: u32,
    /// Gold earned.
    pub gold: u32,
    /// Damage dealt to champions.
    pub damage_to_champions: u32,
    /// Share of the team's champion damage, [0,1].
    pub damage_share: f64,
    /// Vision score.
    pub vision_score: u32,
    /// Turret and epic-monster takedowns.
    pub objectives: u32,
    /// Match duration in seconds.
    pub duration_secs: u32,
    /// Whether the player drew first blood.
    pub first_blood: bool,
    /// Largest multi-kill in the match (2 = double, 5 = penta).
    pub largest_multi_kill: u32,
    /// Gold collected from shutting down a bounty, 0 if none.
    pub shutdown_gold: u32,
}

impl MatchRecord {
    /// (Kills + Assists) / Deaths, with deaths floored at 1.
    #[must_use]
    pub fn kda(&self) -> f64 {
        f64::from(self.kills + self.assists) / f64::from(self.deaths.max(1))
    }

    /// Match duration in minutes, floored at one minute.
    #[must_use]
    pub fn duration_mins(&self) -> f64 {
        (f64::from(self.duration_secs) / 60.0).max(1.0)
    }

    /// Creep score per minute.
    #[must_use]
    pub fn cs_per_min(&self) -> f64 {
        f64::from(self.cs) / self.duration_mins()
    }

    /// Gold per minute.
    #[must_use]
    pub fn gold_per_min(&self) -> f64 {
        f64::from(self.gold) / self.duration_mins()
    }

    /// Damage to champions per minute.
    #[must_use]
    pub fn damage_per_min(&self) -> f64 {
        f64::from(self.damage_to_champions) / self.duration_mins()
    }
}

/// Read access to a user's raw match history.
///
/// Implemented by the host application against its relational store; the
/// bundled [`InMemoryMatchStore`] serves the standalone binary and tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Matches for a user with `from <= played_at < to`, ordered by
    /// `played_at` ascending.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Upstream`] if the underlying store fails.
    async fn matches_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MatchRecord>, ComputeError>;
}

/// Simple in-memory match store.
#[derive(Debug, Default)]
pub struct InMemoryMatchStore {
    rows: RwLock<HashMap<i64, Vec<MatchRecord>>>,
}

impl InMemoryMatchStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append matches for a user.
    pub fn insert(&self, user_id: i64, mut matches: Vec<MatchRecord>) {
        let mut rows = match self.rows.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = rows.entry(user_id).or_default();
        entry.append(&mut matches);
        entry.sort_by_key(|m| m.played_at);
    }
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn matches_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MatchRecord>, ComputeError> {
        let rows = match self.rows.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(rows
            .get(&user_id)
            .map(|matches| {
                matches
                    .iter()
                    .filter(|m| m.played_at >= from && m.played_at < to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
