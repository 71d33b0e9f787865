//! Windowed period statistics.
//!
//! Aggregates a user's matches over a named time window into per-metric
//! averages and a composite performance score in [0,100]. The composite is
//! a weighted sum over six components with role-specific weights, blended
//! across game-phase buckets; trend compares the current window against the
//! immediately preceding window of equal length.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::weights::{
    role_weights, EARLY_GAME_MAX_SECS, MID_GAME_MAX_SECS, PHASE_WEIGHTS,
};
use super::TrendDirection;
use crate::error::{ComputeError, ValidationError};
use crate::matches::{MatchRecord, MatchStore, Role};

/// Score-point delta beyond which a window counts as improving/declining.
pub const TREND_THRESHOLD: f64 = 2.0;

/// Named analytics time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    /// Last 24 hours.
    Today,
    /// Last 7 days.
    Week,
    /// Last 30 days.
    Month,
    /// Current ranked season (last 365 days).
    Season,
    /// Entire recorded history.
    All,
}

impl Period {
    /// All valid periods, for error messages and iteration.
    pub const ALL_PERIODS: [Self; 5] = [Self::Today, Self::Week, Self::Month, Self::Season, Self::All];

    /// Window length, `None` for [`Period::All`].
    #[must_use]
    pub fn length(self) -> Option<Duration> {
        match self {
            Self::Today => Some(Duration::days(1)),
            Self::Week => Some(Duration::days(7)),
            Self::Month => Some(Duration::days(30)),
            Self::Season => Some(Duration::days(365)),
            Self::All => None,
        }
    }

    /// The `[from, to)` window ending at `now`.
    #[must_use]
    pub fn window(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        self.length().map_or_else(
            || (DateTime::<Utc>::MIN_UTC, now),
            |len| (now - len, now),
        )
    }

    /// The equal-length window immediately preceding this one, used for
    /// trend detection. `None` for [`Period::All`].
    #[must_use]
    pub fn preceding_window(self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.length().map(|len| (now - len - len, now - len))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Today => "today",
            Self::Week => "week",
            Self::Month => "month",
            Self::Season => "season",
            Self::All => "all",
        };
        f.write_str(name)
    }
}

impl FromStr for Period {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Self::Today),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "season" => Ok(Self::Season),
            "all" => Ok(Self::All),
            other => Err(ValidationError::InvalidPeriod {
                given: other.to_string(),
            }),
        }
    }
}

/// Aggregated performance for one role within a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolePerformance {
    /// The role.
    pub role: Role,
    /// Games played in the role.
    pub games: u32,
    /// Games won.
    pub wins: u32,
    /// Win rate, [0,1].
    pub win_rate: f64,
    /// Average KDA.
    pub avg_kda: f64,
    /// Composite performance score, [0,100].
    pub performance_score: f64,
}

/// Aggregated performance on one champion within a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChampionPerformance {
    /// Champion name.
    pub champion: String,
    /// Games played on the champion.
    pub games: u32,
    /// Win rate, [0,1].
    pub win_rate: f64,
    /// Average KDA.
    pub avg_kda: f64,
    /// Composite performance score, [0,100].
    pub performance_score: f64,
}

/// Windowed performance summary for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    /// The window this summary covers.
    pub period: Period,
    /// Total games in the window.
    pub total_games: u32,
    /// Games won.
    pub wins: u32,
    /// Games lost.
    pub losses: u32,
    /// Win rate, [0,1].
    pub win_rate: f64,
    /// Average KDA.
    pub avg_kda: f64,
    /// Average creep score per minute.
    pub avg_cs_per_min: f64,
    /// Average gold per minute.
    pub avg_gold_per_min: f64,
    /// Average damage to champions per minute.
    pub avg_damage_per_min: f64,
    /// Average vision score.
    pub avg_vision_score: f64,
    /// Composite performance score, [0,100].
    pub performance_score: f64,
    /// Fractional score change against the preceding window, when one with
    /// games exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_change: Option<f64>,
    /// Direction of movement against the preceding window.
    pub trend: TrendDirection,
    /// Best-scoring role, when any games were played.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_role: Option<Role>,
    /// Worst-scoring role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worst_role: Option<Role>,
    /// Per-role breakdown, best first.
    pub role_performance: Vec<RolePerformance>,
    /// Top champions by performance score, at most five.
    pub top_champions: Vec<ChampionPerformance>,
    /// Improvement suggestions derived from the weakest components.
    pub suggestions: Vec<String>,
    /// Set when the window holds fewer games than the configured minimum;
    /// the score is reported but should not be over-read.
    pub insufficient_data: bool,
}

/// Per-match component scores, each normalized to [0,100].
#[derive(Debug, Clone, Copy)]
struct ComponentScores {
    kda: f64,
    farming: f64,
    vision: f64,
    damage: f64,
    objectives: f64,
    survival: f64,
}

impl ComponentScores {
    fn of(m: &MatchRecord) -> Self {
        Self {
            kda: (m.kda() / 4.0 * 100.0).min(100.0),
            farming: (m.cs_per_min() / 10.0 * 100.0).min(100.0),
            vision: (f64::from(m.vision_score) * 5.0).min(100.0),
            damage: (m.damage_per_min() / 1000.0 * 100.0).min(100.0),
            objectives: (f64::from(m.objectives) * 20.0).min(100.0),
            survival: (f64::from(m.deaths).mul_add(-12.5, 100.0)).max(0.0),
        }
    }
}

/// Composite score for one match under its role's weight table.
#[must_use]
pub fn match_score(m: &MatchRecord) -> f64 {
    let c = ComponentScores::of(m);
    let w = role_weights(m.role);
    c.kda * w.kda
        + c.farming * w.farming
        + c.vision * w.vision
        + c.damage * w.damage
        + c.objectives * w.objectives
        + c.survival * w.survival
}

/// Phase-weighted composite score for a set of matches.
///
/// Matches are bucketed by the phase the game was decided in (short games
/// end in the early phase, standard games mid, long games late); bucket
/// averages blend under the phase weights, with empty buckets falling back
/// to the overall average.
#[must_use]
pub fn window_score(matches: &[MatchRecord]) -> f64 {
    if matches.is_empty() {
        return 0.0;
    }

    let mut buckets: [Vec<f64>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for m in matches {
        let bucket = if m.duration_secs < EARLY_GAME_MAX_SECS {
            0
        } else if m.duration_secs < MID_GAME_MAX_SECS {
            1
        } else {
            2
        };
        buckets[bucket].push(match_score(m));
    }

    let overall = mean(&buckets.iter().flatten().copied().collect::<Vec<_>>());
    let score = buckets
        .iter()
        .zip(PHASE_WEIGHTS)
        .map(|(bucket, weight)| {
            let avg = if bucket.is_empty() { overall } else { mean(bucket) };
            avg * weight
        })
        .sum::<f64>();
    (score * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Period statistics calculator.
pub struct PeriodStatsCalculator {
    store: Arc<dyn MatchStore>,
    min_games: usize,
}

impl PeriodStatsCalculator {
    /// Create a calculator over the given match store.
    #[must_use]
    pub fn new(store: Arc<dyn MatchStore>, min_games: usize) -> Self {
        Self { store, min_games }
    }

    /// Compute period statistics for a user.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Upstream`] if the match store fails.
    pub async fn calculate(
        &self,
        user_id: i64,
        period: Period,
        now: DateTime<Utc>,
    ) -> Result<PeriodStats, ComputeError> {
        let (from, to) = period.window(now);
        let matches = self.store.matches_between(user_id, from, to).await?;

        if matches.is_empty() {
            return Ok(empty_stats(period));
        }

        let total_games = matches.len() as u32;
        let wins = matches.iter().filter(|m| m.win).count() as u32;
        let win_rate = f64::from(wins) / f64::from(total_games);

        let avg_kda = mean(&matches.iter().map(MatchRecord::kda).collect::<Vec<_>>());
        let avg_cs_per_min = mean(&matches.iter().map(MatchRecord::cs_per_min).collect::<Vec<_>>());
        let avg_gold_per_min =
            mean(&matches.iter().map(MatchRecord::gold_per_min).collect::<Vec<_>>());
        let avg_damage_per_min =
            mean(&matches.iter().map(MatchRecord::damage_per_min).collect::<Vec<_>>());
        let avg_vision_score = mean(
            &matches
                .iter()
                .map(|m| f64::from(m.vision_score))
                .collect::<Vec<_>>(),
        );

        let performance_score = window_score(&matches);

        let role_performance = analyze_roles(&matches);
        let best_role = role_performance.first().map(|r| r.role);
        let worst_role = if role_performance.len() > 1 {
            role_performance.last().map(|r| r.role)
        } else {
            None
        };

        let (score_change, trend) = self
            .trend_against_preceding(user_id, period, now, performance_score)
            .await?;

        let suggestions = build_suggestions(avg_cs_per_min, avg_vision_score, &matches);

        Ok(PeriodStats {
            period,
            total_games,
            wins,
            losses: total_games - wins,
            win_rate,
            avg_kda,
            avg_cs_per_min,
            avg_gold_per_min,
            avg_damage_per_min,
            avg_vision_score,
            performance_score,
            score_change,
            trend,
            best_role,
            worst_role,
            role_performance,
            top_champions: top_champions(&matches, 5),
            suggestions,
            insufficient_data: (total_games as usize) < self.min_games,
        })
    }

    async fn trend_against_preceding(
        &self,
        user_id: i64,
        period: Period,
        now: DateTime<Utc>,
        current_score: f64,
    ) -> Result<(Option<f64>, TrendDirection), ComputeError> {
        let Some((from, to)) = period.preceding_window(now) else {
            return Ok((None, TrendDirection::Stable));
        };
        let previous = self.store.matches_between(user_id, from, to).await?;
        if previous.is_empty() {
            return Ok((None, TrendDirection::Stable));
        }

        let previous_score = window_score(&previous);
        let delta = current_score - previous_score;
        let trend = if delta > TREND_THRESHOLD {
            TrendDirection::Improving
        } else if delta < -TREND_THRESHOLD {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        };
        let change = if previous_score > 0.0 {
            Some(delta / previous_score)
        } else {
            None
        };
        Ok((change, trend))
    }
}

fn empty_stats(period: Period) -> PeriodStats {
    PeriodStats {
        period,
        total_games: 0,
        wins: 0,
        losses: 0,
        win_rate: 0.0,
        avg_kda: 0.0,
        avg_cs_per_min: 0.0,
        avg_gold_per_min: 0.0,
        avg_damage_per_min: 0.0,
        avg_vision_score: 0.0,
        performance_score: 0.0,
        score_change: None,
        trend: TrendDirection::Stable,
        best_role: None,
        worst_role: None,
        role_performance: Vec::new(),
        top_champions: Vec::new(),
        suggestions: Vec::new(),
        insufficient_data: true,
    }
}

fn analyze_roles(matches: &[MatchRecord]) -> Vec<RolePerformance> {
    let mut groups: HashMap<Role, Vec<&MatchRecord>> = HashMap::new();
    for m in matches {
        groups.entry(m.role).or_default().push(m);
    }

    let mut result: Vec<RolePerformance> = groups
        .into_iter()
        .map(|(role, group)| {
            let games = group.len() as u32;
            let wins = group.iter().filter(|m| m.win).count() as u32;
            let owned: Vec<MatchRecord> = group.iter().map(|&m| m.clone()).collect();
            RolePerformance {
                role,
                games,
                wins,
                win_rate: f64::from(wins) / f64::from(games),
                avg_kda: mean(&owned.iter().map(MatchRecord::kda).collect::<Vec<_>>()),
                performance_score: window_score(&owned),
            }
        })
        .collect();

    result.sort_by(|a, b| {
        b.performance_score
            .partial_cmp(&a.performance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    result
}

fn top_champions(matches: &[MatchRecord], limit: usize) -> Vec<ChampionPerformance> {
    let mut groups: HashMap<&str, Vec<&MatchRecord>> = HashMap::new();
    for m in matches {
        groups.entry(m.champion.as_str()).or_default().push(m);
    }

    let mut result: Vec<ChampionPerformance> = groups
        .into_iter()
        .map(|(champion, group)| {
            let games = group.len() as u32;
            let wins = group.iter().filter(|m| m.win).count() as u32;
            let owned: Vec<MatchRecord> = group.iter().map(|&m| m.clone()).collect();
            ChampionPerformance {
                champion: champion.to_string(),
                games,
                win_rate: f64::from(wins) / f64::from(games),
                avg_kda: mean(&owned.iter().map(MatchRecord::kda).collect::<Vec<_>>()),
                performance_score: window_score(&owned),
            }
        })
        .collect();

    result.sort_by(|a, b| {
        b.performance_score
            .partial_cmp(&a.performance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    result.truncate(limit);
    result
}

fn build_suggestions(
    avg_cs_per_min: f64,
    avg_vision_score: f64,
    matches: &[MatchRecord],
) -> Vec<String> {
    let mut suggestions = Vec::new();

    if avg_cs_per_min < 5.0 {
        suggestions.push(
            "Farming is below expectations; aim for 7+ CS per minute in laning phase".to_string(),
        );
    }
    if avg_vision_score < 15.0 {
        suggestions
            .push("Vision score is low; buy control wards and sweep objectives".to_string());
    }

    let avg_deaths = mean(&matches.iter().map(|m| f64::from(m.deaths)).collect::<Vec<_>>());
    if avg_deaths > 6.0 {
        suggestions.push(
            "Deaths per game are high; play around vision and track enemy cooldowns".to_string(),
        );
    }

    let high_death_games = matches.iter().filter(|m| m.deaths >= 8).count();
    if high_death_games * 10 >= matches.len() * 3 {
        suggestions.push(
            "Nearly a third of games end with 8+ deaths; review positioning in lost fights"
                .to_string(),
        );
    }

    suggestions
}
