//! MMR trajectory estimation.
//!
//! The ladder gives players a visible tier/division but hides the matchmaking
//! rating underneath. This module estimates that hidden number from match
//! performance: a static (tier, division) → base-MMR table anchors the scale,
//! each match contributes a bounded delta relative to the role-expected
//! baseline, and the resulting history yields volatility, trend, a confidence
//! grade, and rank predictions.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::period::match_score;
use super::TrendDirection;
use crate::error::ComputeError;
use crate::matches::{Division, MatchRecord, MatchStore, Tier};

/// MMR the trajectory starts from when no history is known.
pub const STARTING_MMR: i32 = 1200;

/// Hard bound on a single match's MMR movement.
pub const MAX_DELTA: i32 = 50;

/// Base MMR awarded for a win (lost for a loss) before the performance term.
pub const WIN_DELTA: i32 = 14;

/// MMR width of one division.
pub const DIVISION_STEP: i32 = 100;

/// A visible ladder position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rank {
    /// Ladder tier.
    pub tier: Tier,
    /// Division within the tier (always `I` for apex tiers).
    pub division: Division,
}

impl Rank {
    /// Base MMR at the bottom of this rank.
    #[must_use]
    pub const fn base_mmr(self) -> i32 {
        let tier_base = match self.tier {
            Tier::Iron => 0,
            Tier::Bronze => 400,
            Tier::Silver => 800,
            Tier::Gold => 1200,
            Tier::Platinum => 1600,
            Tier::Emerald => 2000,
            Tier::Diamond => 2400,
            Tier::Master => 2800,
            Tier::Grandmaster => 3000,
            Tier::Challenger => 3200,
        };
        if self.tier.is_apex() {
            tier_base
        } else {
            tier_base + self.division.step() * DIVISION_STEP
        }
    }

    /// MMR at the middle of this rank's band.
    #[must_use]
    pub const fn mid_mmr(self) -> i32 {
        self.base_mmr() + DIVISION_STEP / 2
    }

    /// The rank directly above this one; `None` at Challenger.
    #[must_use]
    pub fn next_up(self) -> Option<Self> {
        if self.tier.is_apex() || self.division == Division::I {
            let idx = Tier::ORDERED.iter().position(|&t| t == self.tier)?;
            let next_tier = *Tier::ORDERED.get(idx + 1)?;
            let division = if next_tier.is_apex() {
                Division::I
            } else {
                Division::IV
            };
            Some(Self {
                tier: next_tier,
                division,
            })
        } else {
            let step = self.division.step();
            let division = *Division::ORDERED.get(step as usize + 1)?;
            Some(Self {
                tier: self.tier,
                division,
            })
        }
    }

    /// The rank whose band contains `mmr`.
    #[must_use]
    pub fn from_mmr(mmr: i32) -> Self {
        let mut best = Self {
            tier: Tier::Iron,
            division: Division::IV,
        };
        for tier in Tier::ORDERED {
            let divisions: &[Division] = if tier.is_apex() {
                &[Division::I]
            } else {
                &Division::ORDERED
            };
            for &division in divisions {
                let candidate = Self { tier, division };
                if candidate.base_mmr() <= mmr {
                    best = candidate;
                }
            }
        }
        best
    }

    /// LP progress within the division, clamped to [0,100].
    #[must_use]
    pub fn lp_within(self, mmr: i32) -> i32 {
        (mmr - self.base_mmr()).clamp(0, DIVISION_STEP)
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.tier, self.division)
    }
}

impl FromStr for Rank {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let tier: Tier = parts
            .next()
            .ok_or_else(|| "empty rank".to_string())?
            .parse()?;
        let division = match parts.next() {
            Some(d) => d.parse()?,
            None if tier.is_apex() => Division::I,
            None => return Err(format!("missing division in rank: {s}")),
        };
        Ok(Self { tier, division })
    }
}

/// One estimated point on the MMR timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MmrDataPoint {
    /// When the match was played.
    pub date: DateTime<Utc>,
    /// Provider match identifier.
    pub match_id: String,
    /// Estimated MMR after this match.
    pub estimated_mmr: i32,
    /// MMR movement contributed by this match, within ±[`MAX_DELTA`].
    pub delta: i32,
    /// Confidence in this single estimate, [0,1].
    pub confidence: f64,
    /// Ladder rank the estimate corresponds to.
    pub rank_estimate: Rank,
}

/// Observed MMR bounds across a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MmrRange {
    /// Lowest estimated MMR.
    pub min: i32,
    /// Highest estimated MMR.
    pub max: i32,
}

/// A user's estimated MMR history over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MmrTrajectory {
    /// Ordered per-match history, oldest first.
    pub history: Vec<MmrDataPoint>,
    /// Estimated MMR after the newest match.
    pub current_mmr: i32,
    /// Ladder rank of the current estimate.
    pub current_rank: Rank,
    /// Observed bounds.
    pub mmr_range: MmrRange,
    /// Standard deviation of per-match deltas.
    pub volatility: f64,
    /// Sign of the least-squares slope over the history.
    pub trend: TrendDirection,
    /// Overall confidence, [0,1]: grows with sample size, shrinks with
    /// delta variance.
    pub confidence_grade: f64,
}

/// Projection of what reaching a target rank would take.
///
/// `assumed_win_rate` states the win-rate assumption the projection rests
/// on; it is an extrapolation of recent results, not a guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankPrediction {
    /// Rank of the current MMR estimate.
    pub current_rank: Rank,
    /// Rank the projection targets.
    pub target_rank: Rank,
    /// Current estimated MMR.
    pub current_mmr: i32,
    /// MMR at the middle of the target rank's band.
    pub target_mmr: i32,
    /// Estimated LP still needed.
    pub lp_needed: i32,
    /// Games needed at the recent average gain; capped at 999 when recent
    /// results are not gaining MMR.
    pub games_needed: u32,
    /// The recent win rate the projection assumes holds, [0,1].
    pub assumed_win_rate: f64,
    /// Win rate required to stay on the projected pace, [0.5,1].
    pub required_win_rate: f64,
    /// Calendar estimate at the recent games-per-day pace, capped at 365.
    pub timeline_days: u32,
    /// Confidence inherited from the trajectory, [0,1].
    pub confidence: f64,
}

/// Slope magnitude (MMR per game) below which a trajectory is stable.
const TREND_SLOPE_THRESHOLD: f64 = 1.0;

/// MMR trajectory estimator.
pub struct MmrEstimator {
    store: Arc<dyn MatchStore>,
}

impl MmrEstimator {
    /// Create an estimator over the given match store.
    #[must_use]
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        Self { store }
    }

    /// Estimate the MMR trajectory over the last `days` days.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::NoData`] when the window holds no matches,
    /// or [`ComputeError::Upstream`] if the match store fails.
    pub async fn trajectory(
        &self,
        user_id: i64,
        days: u16,
        now: DateTime<Utc>,
    ) -> Result<MmrTrajectory, ComputeError> {
        let from = now - Duration::days(i64::from(days));
        let matches = self.store.matches_between(user_id, from, now).await?;
        if matches.is_empty() {
            return Err(ComputeError::NoData { user_id });
        }

        let mut history = Vec::with_capacity(matches.len());
        let mut current = STARTING_MMR;
        for m in &matches {
            let delta = match_delta(m);
            current += delta;
            history.push(MmrDataPoint {
                date: m.played_at,
                match_id: m.match_id.clone(),
                estimated_mmr: current,
                delta,
                confidence: point_confidence(m),
                rank_estimate: Rank::from_mmr(current),
            });
        }

        let deltas: Vec<f64> = history.iter().map(|p| f64::from(p.delta)).collect();
        let values: Vec<f64> = history.iter().map(|p| f64::from(p.estimated_mmr)).collect();
        let min = history.iter().map(|p| p.estimated_mmr).min().unwrap_or(current);
        let max = history.iter().map(|p| p.estimated_mmr).max().unwrap_or(current);

        Ok(MmrTrajectory {
            current_mmr: current,
            current_rank: Rank::from_mmr(current),
            mmr_range: MmrRange { min, max },
            volatility: std_dev(&deltas),
            trend: slope_trend(&values),
            confidence_grade: confidence_grade(history.len(), variance(&deltas)),
            history,
        })
    }

    /// Project the games and LP needed to reach `target` (or the next rank
    /// up when `target` is `None`), assuming the recent win rate holds.
    ///
    /// # Errors
    ///
    /// Same as [`Self::trajectory`].
    pub async fn predict_rank(
        &self,
        user_id: i64,
        target: Option<Rank>,
        now: DateTime<Utc>,
    ) -> Result<RankPrediction, ComputeError> {
        let trajectory = self.trajectory(user_id, 30, now).await?;
        let current_rank = trajectory.current_rank;
        let target_rank = target
            .or_else(|| current_rank.next_up())
            .unwrap_or(current_rank);

        let target_mmr = target_rank.mid_mmr();
        let mmr_needed = (target_mmr - trajectory.current_mmr).max(0);

        // Recent week of results drives the pace assumptions.
        let week_ago = now - Duration::days(7);
        let recent: Vec<&MmrDataPoint> = trajectory
            .history
            .iter()
            .filter(|p| p.date >= week_ago)
            .collect();

        let assumed_win_rate = if recent.is_empty() {
            0.5
        } else {
            recent.iter().filter(|p| p.delta > 0).count() as f64 / recent.len() as f64
        };
        let avg_gain = if recent.is_empty() {
            15.0
        } else {
            recent.iter().map(|p| f64::from(p.delta)).sum::<f64>() / recent.len() as f64
        };

        let games_needed = if avg_gain > 0.0 {
            let games = (f64::from(mmr_needed) / avg_gain).ceil();
            if games.is_finite() && games < 999.0 {
                games.max(0.0) as u32
            } else {
                999
            }
        } else {
            999
        };

        let required_win_rate = if mmr_needed > 0 && games_needed > 0 && games_needed < 999 {
            (f64::from(mmr_needed) / (f64::from(games_needed) * 30.0) + 0.5).clamp(0.5, 1.0)
        } else {
            assumed_win_rate.max(0.5)
        };

        let games_per_day = if recent.is_empty() {
            3.0
        } else {
            recent.len() as f64 / 7.0
        };
        let timeline_days = if games_needed < 999 && games_per_day > 0.0 {
            (f64::from(games_needed) / games_per_day).ceil().min(365.0) as u32
        } else {
            365
        };

        Ok(RankPrediction {
            current_rank,
            target_rank,
            current_mmr: trajectory.current_mmr,
            target_mmr,
            lp_needed: (f64::from(mmr_needed) * 0.8).round() as i32,
            games_needed,
            assumed_win_rate,
            required_win_rate,
            timeline_days,
            confidence: trajectory.confidence_grade,
        })
    }
}

/// Per-match MMR movement: a fixed win/loss term plus a performance term
/// relative to the role-expected baseline score of 50, clamped to
/// ±[`MAX_DELTA`].
#[must_use]
pub fn match_delta(m: &MatchRecord) -> i32 {
    let win_term = if m.win { WIN_DELTA } else { -WIN_DELTA };
    let performance_term = ((match_score(m) - 50.0) / 5.0).round() as i32;
    (win_term + performance_term).clamp(-MAX_DELTA, MAX_DELTA)
}

fn point_confidence(m: &MatchRecord) -> f64 {
    let mut confidence: f64 = 0.5;
    if m.duration_secs >= 1200 {
        confidence += 0.2;
    }
    // Full participant statistics are present for every exported row.
    confidence += 0.2;
    confidence.min(1.0)
}

/// Confidence grade: sample factor `n/(n+10)` damped by delta variance.
/// At fixed variance the grade is strictly increasing in sample count.
#[must_use]
pub fn confidence_grade(samples: usize, delta_variance: f64) -> f64 {
    let sample_factor = samples as f64 / (samples as f64 + 10.0);
    let stability_factor = 1.0 / (1.0 + delta_variance / 1000.0);
    (sample_factor * stability_factor).clamp(0.0, 1.0)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Sign of the least-squares slope over an ordered series.
fn slope_trend(values: &[f64]) -> TrendDirection {
    if values.len() < 2 {
        return TrendDirection::Stable;
    }
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = mean(values);
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    if den == 0.0 {
        return TrendDirection::Stable;
    }
    let slope = num / den;
    if slope > TREND_SLOPE_THRESHOLD {
        TrendDirection::Improving
    } else if slope < -TREND_SLOPE_THRESHOLD {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::matches::{InMemoryMatchStore, Role};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).single().unwrap()
    }

    fn game(days_ago: i64, win: bool) -> MatchRecord {
        MatchRecord {
            match_id: format!("m-{days_ago}"),
            played_at: fixed_now() - Duration::days(days_ago),
            win,
            role: Role::Middle,
            champion: "Orianna".into(),
            kills: if win { 9 } else { 2 },
            deaths: if win { 2 } else { 7 },
            assists: 6,
            cs: if win { 230 } else { 140 },
            gold: 11_000,
            damage_to_champions: if win { 26_000 } else { 12_000 },
            damage_share: 0.26,
            vision_score: 20,
            objectives: 2,
            duration_secs: 1900,
            first_blood: false,
            largest_multi_kill: 1,
            shutdown_gold: 0,
        }
    }

    #[test]
    fn tier_table_uses_hundred_point_steps() {
        let iron_iv = Rank {
            tier: Tier::Iron,
            division: Division::IV,
        };
        let iron_iii = Rank {
            tier: Tier::Iron,
            division: Division::III,
        };
        let challenger = Rank {
            tier: Tier::Challenger,
            division: Division::I,
        };
        assert_eq!(iron_iv.base_mmr(), 0);
        assert_eq!(iron_iii.base_mmr(), 100);
        assert_eq!(challenger.base_mmr(), 3200);
        assert_eq!(
            Rank {
                tier: Tier::Gold,
                division: Division::IV
            }
            .base_mmr(),
            1200
        );
    }

    #[test]
    fn rank_from_mmr_picks_containing_band() {
        let rank = Rank::from_mmr(1250);
        assert_eq!(rank.tier, Tier::Gold);
        assert_eq!(rank.division, Division::IV);
        assert_eq!(rank.lp_within(1250), 50);

        assert_eq!(Rank::from_mmr(-100).tier, Tier::Iron);
        assert_eq!(Rank::from_mmr(9000).tier, Tier::Challenger);
    }

    #[test]
    fn next_up_crosses_tier_boundaries() {
        let gold_i = Rank {
            tier: Tier::Gold,
            division: Division::I,
        };
        let up = gold_i.next_up().unwrap();
        assert_eq!(up.tier, Tier::Platinum);
        assert_eq!(up.division, Division::IV);

        let challenger = Rank {
            tier: Tier::Challenger,
            division: Division::I,
        };
        assert!(challenger.next_up().is_none());
    }

    #[test]
    fn rank_parses_from_display_form() {
        let rank: Rank = "GOLD II".parse().unwrap();
        assert_eq!(rank.tier, Tier::Gold);
        assert_eq!(rank.division, Division::II);
        let apex: Rank = "MASTER".parse().unwrap();
        assert_eq!(apex.division, Division::I);
    }

    #[test]
    fn deltas_stay_bounded() {
        let mut m = game(0, true);
        m.kills = 40;
        m.deaths = 0;
        m.cs = 600;
        m.damage_to_champions = 90_000;
        assert!(match_delta(&m) <= MAX_DELTA);

        let mut worst = game(0, false);
        worst.kills = 0;
        worst.deaths = 15;
        worst.cs = 20;
        worst.damage_to_champions = 2_000;
        assert!(match_delta(&worst) >= -MAX_DELTA);
    }

    #[test]
    fn confidence_monotone_in_sample_count() {
        let variance = 200.0;
        assert!(confidence_grade(50, variance) > confidence_grade(5, variance));
        assert!(confidence_grade(5, variance) >= 0.0);
        assert!(confidence_grade(50, variance) <= 1.0);
    }

    #[test]
    fn confidence_shrinks_with_variance() {
        assert!(confidence_grade(20, 100.0) > confidence_grade(20, 2000.0));
    }

    #[tokio::test]
    async fn winning_history_trends_upward() {
        let store = Arc::new(InMemoryMatchStore::new());
        store.insert(1, (1..=12).map(|d| game(d, true)).collect());
        let estimator = MmrEstimator::new(store);

        let trajectory = estimator.trajectory(1, 30, fixed_now()).await.unwrap();
        assert_eq!(trajectory.history.len(), 12);
        assert!(trajectory.current_mmr > STARTING_MMR);
        assert_eq!(trajectory.trend, TrendDirection::Improving);
        assert_eq!(
            trajectory.mmr_range.max,
            trajectory.current_mmr,
            "monotone winning history peaks at the end"
        );
    }

    #[tokio::test]
    async fn empty_window_is_no_data() {
        let store = Arc::new(InMemoryMatchStore::new());
        let estimator = MmrEstimator::new(store);
        let err = estimator.trajectory(42, 30, fixed_now()).await.unwrap_err();
        assert_eq!(err, ComputeError::NoData { user_id: 42 });
    }

    #[tokio::test]
    async fn prediction_states_its_win_rate_assumption() {
        let store = Arc::new(InMemoryMatchStore::new());
        store.insert(1, (1..=10).map(|d| game(d, d % 3 != 0)).collect());
        let estimator = MmrEstimator::new(store);

        let prediction = estimator.predict_rank(1, None, fixed_now()).await.unwrap();
        assert!(prediction.assumed_win_rate >= 0.0 && prediction.assumed_win_rate <= 1.0);
        assert!(prediction.required_win_rate >= 0.5);
        assert!(prediction.target_rank.base_mmr() >= prediction.current_rank.base_mmr());
        assert!(prediction.timeline_days <= 365);
    }

    #[test]
    fn trajectory_serde_round_trips() {
        let point = MmrDataPoint {
            date: fixed_now(),
            match_id: "m-1".into(),
            estimated_mmr: 1214,
            delta: 14,
            confidence: 0.9,
            rank_estimate: Rank::from_mmr(1214),
        };
        let trajectory = MmrTrajectory {
            history: vec![point],
            current_mmr: 1214,
            current_rank: Rank::from_mmr(1214),
            mmr_range: MmrRange { min: 1214, max: 1214 },
            volatility: 0.0,
            trend: TrendDirection::Stable,
            confidence_grade: 0.09,
        };
        let json = serde_json::to_string(&trajectory).unwrap();
        let back: MmrTrajectory = serde_json::from_str(&json).unwrap();
        assert_eq!(trajectory, back);
    }
}
