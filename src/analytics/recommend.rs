//! Personalized improvement recommendations.
//!
//! For each tracked metric the engine measures the gap between the user's
//! observed value and the role-expected value, weighs it by the metric's
//! importance for that role, and ranks the resulting candidates. Ties break
//! toward the lower-variance (more trustworthy) observation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::period::Period;
use super::weights::{
    role_thresholds, role_weights, STANDARD_CS_PER_MIN, STANDARD_DAMAGE_PER_MIN, STANDARD_KDA,
    STANDARD_VISION_SCORE,
};
use crate::error::ComputeError;
use crate::matches::{MatchRecord, MatchStore, Role};

/// Minimum confidence for a recommendation to be surfaced.
pub const MIN_CONFIDENCE: f64 = 0.4;

/// Maximum recommendations returned per user.
pub const MAX_RECOMMENDATIONS: usize = 15;

/// Minimum games in the window before recommendations are generated.
pub const MIN_GAMES: usize = 3;

/// Gap score below which a candidate is dropped as noise.
const MIN_GAP_SCORE: f64 = 0.02;

/// Category of an improvement recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    /// Creep-score efficiency.
    Farming,
    /// Vision control.
    Vision,
    /// Damage output.
    Damage,
    /// Share of team damage in fights.
    TeamContribution,
    /// Kill/death discipline.
    Combat,
}

/// One ranked improvement recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Recommendation category.
    pub kind: RecommendationKind,
    /// Short headline.
    pub title: String,
    /// What was observed and what is expected.
    pub description: String,
    /// Rank among the user's recommendations; lower is more urgent.
    pub priority: u32,
    /// Confidence in the underlying observation, [0,1].
    pub confidence: f64,
    /// Human-readable estimate of the payoff.
    pub expected_improvement: String,
    /// Concrete steps, in suggested order.
    pub action_items: Vec<String>,
    /// Role the recommendation applies to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Champion scope, when narrower than the role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub champion: Option<String>,
    /// Window the observation covers.
    pub time_period: Period,
}

struct Candidate {
    kind: RecommendationKind,
    title: String,
    description: String,
    score: f64,
    variance: f64,
    action_items: Vec<String>,
}

/// Recommendation engine.
pub struct RecommendationEngine {
    store: Arc<dyn MatchStore>,
}

impl RecommendationEngine {
    /// Create an engine over the given match store.
    #[must_use]
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        Self { store }
    }

    /// Generate ranked recommendations from the last month of matches.
    ///
    /// Fewer than [`MIN_GAMES`] games yields an empty list rather than
    /// noise.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Upstream`] if the match store fails.
    pub async fn recommend(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Recommendation>, ComputeError> {
        let (from, to) = Period::Month.window(now);
        let matches = self.store.matches_between(user_id, from, to).await?;
        if matches.len() < MIN_GAMES {
            return Ok(Vec::new());
        }

        let role = primary_role(&matches);
        let role_matches: Vec<&MatchRecord> =
            matches.iter().filter(|m| m.role == role).collect();
        let games = role_matches.len();
        let confidence = round2(games as f64 / (games as f64 + 5.0));

        let mut candidates = metric_candidates(role, &role_matches);
        candidates.retain(|c| c.score > MIN_GAP_SCORE);
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    a.variance
                        .partial_cmp(&b.variance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });

        let mut recommendations: Vec<Recommendation> = candidates
            .into_iter()
            .enumerate()
            .map(|(idx, c)| Recommendation {
                kind: c.kind,
                title: c.title,
                description: c.description,
                priority: idx as u32 + 1,
                confidence,
                expected_improvement: improvement_estimate(c.score),
                action_items: c.action_items,
                role: Some(role),
                champion: None,
                time_period: Period::Month,
            })
            .collect();

        recommendations.retain(|r| r.confidence >= MIN_CONFIDENCE);
        recommendations.truncate(MAX_RECOMMENDATIONS);
        Ok(recommendations)
    }
}

fn primary_role(matches: &[MatchRecord]) -> Role {
    let mut best = Role::Middle;
    let mut best_count = 0;
    for role in Role::ALL {
        let count = matches.iter().filter(|m| m.role == role).count();
        if count > best_count {
            best = role;
            best_count = count;
        }
    }
    best
}

fn metric_candidates(role: Role, matches: &[&MatchRecord]) -> Vec<Candidate> {
    let thresholds = role_thresholds(role);
    let weights = role_weights(role);

    let cs = observations(matches, |m| m.cs_per_min());
    let vision = observations(matches, |m| f64::from(m.vision_score));
    let damage = observations(matches, |m| m.damage_per_min());
    let share = observations(matches, |m| m.damage_share);
    let kda = observations(matches, |m| m.kda());

    let mut candidates = Vec::new();

    let expected_cs = STANDARD_CS_PER_MIN * thresholds.cs_multiplier;
    candidates.push(Candidate {
        kind: RecommendationKind::Farming,
        title: "Raise your CS per minute".to_string(),
        description: format!(
            "Averaging {:.1} CS/min against an expected {expected_cs:.1} for {role}",
            cs.mean
        ),
        score: gap_ratio(expected_cs, cs.mean) * weights.farming,
        variance: cs.variance,
        action_items: vec![
            "Practice last-hitting under tower in the practice tool".to_string(),
            "Catch side waves between objective setups".to_string(),
        ],
    });

    let expected_vision = STANDARD_VISION_SCORE * thresholds.vision_multiplier;
    candidates.push(Candidate {
        kind: RecommendationKind::Vision,
        title: "Invest more in vision".to_string(),
        description: format!(
            "Averaging {:.1} vision score against an expected {expected_vision:.1} for {role}",
            vision.mean
        ),
        score: gap_ratio(expected_vision, vision.mean) * weights.vision,
        variance: vision.variance,
        action_items: vec![
            "Buy a control ward on every base".to_string(),
            "Sweep the objective pit thirty seconds before it spawns".to_string(),
        ],
    });

    let expected_damage = STANDARD_DAMAGE_PER_MIN * thresholds.damage_multiplier;
    candidates.push(Candidate {
        kind: RecommendationKind::Damage,
        title: "Increase your damage output".to_string(),
        description: format!(
            "Averaging {:.0} damage/min against an expected {expected_damage:.0} for {role}",
            damage.mean
        ),
        score: gap_ratio(expected_damage, damage.mean) * weights.damage,
        variance: damage.variance,
        action_items: vec![
            "Look for free poke windows when abilities are on cooldown".to_string(),
            "Position to stay in fights longer before retreating".to_string(),
        ],
    });

    candidates.push(Candidate {
        kind: RecommendationKind::TeamContribution,
        title: "Carry more of the team's damage".to_string(),
        description: format!(
            "Dealing {:.0}% of team damage against an expected {:.0}% for {role}",
            share.mean * 100.0,
            thresholds.expected_damage_share * 100.0
        ),
        score: gap_ratio(thresholds.expected_damage_share, share.mean) * weights.damage,
        variance: share.variance,
        action_items: vec![
            "Arrive to fights with full resources".to_string(),
            "Prioritize hitting the nearest safe target over diving backlines".to_string(),
        ],
    });

    candidates.push(Candidate {
        kind: RecommendationKind::Combat,
        title: "Tighten up your KDA".to_string(),
        description: format!(
            "Averaging {:.1} KDA against an expected {STANDARD_KDA:.1}",
            kda.mean
        ),
        score: gap_ratio(STANDARD_KDA, kda.mean) * weights.kda,
        variance: kda.variance,
        action_items: vec![
            "Track enemy junglers before committing to trades".to_string(),
            "Respect power spikes instead of forcing even fights".to_string(),
        ],
    });

    candidates
}

struct Observation {
    mean: f64,
    variance: f64,
}

fn observations<F>(matches: &[&MatchRecord], metric: F) -> Observation
where
    F: Fn(&MatchRecord) -> f64,
{
    let values: Vec<f64> = matches.iter().map(|&m| metric(m)).collect();
    if values.is_empty() {
        return Observation {
            mean: 0.0,
            variance: 0.0,
        };
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = if values.len() < 2 {
        0.0
    } else {
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64
    };
    Observation { mean, variance }
}

/// Relative shortfall of `observed` against `expected`, floored at zero.
fn gap_ratio(expected: f64, observed: f64) -> f64 {
    if expected <= 0.0 {
        return 0.0;
    }
    ((expected - observed) / expected).max(0.0)
}

fn improvement_estimate(score: f64) -> String {
    let pct = (score * 30.0).round().clamp(2.0, 10.0) as u32;
    format!("+{pct}% winrate")
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::matches::InMemoryMatchStore;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).single().unwrap()
    }

    fn support_game(days_ago: i64, vision: u32) -> MatchRecord {
        MatchRecord {
            match_id: format!("m-{days_ago}"),
            played_at: fixed_now() - Duration::days(days_ago),
            win: days_ago % 2 == 0,
            role: Role::Utility,
            champion: "Thresh".into(),
            kills: 1,
            deaths: 4,
            assists: 12,
            cs: 30,
            gold: 7_000,
            damage_to_champions: 6_000,
            damage_share: 0.07,
            vision_score: vision,
            objectives: 2,
            duration_secs: 1800,
            first_blood: false,
            largest_multi_kill: 0,
            shutdown_gold: 0,
        }
    }

    #[tokio::test]
    async fn low_vision_support_gets_vision_recommendation_first() {
        let store = Arc::new(InMemoryMatchStore::new());
        // Vision far below the doubled support expectation (40).
        store.insert(1, (1..=8).map(|d| support_game(d, 8)).collect());
        let engine = RecommendationEngine::new(store);

        let recs = engine.recommend(1, fixed_now()).await.unwrap();
        assert!(!recs.is_empty());
        assert_eq!(recs[0].kind, RecommendationKind::Vision);
        assert_eq!(recs[0].priority, 1);
        assert_eq!(recs[0].role, Some(Role::Utility));
    }

    #[tokio::test]
    async fn priorities_are_dense_from_one() {
        let store = Arc::new(InMemoryMatchStore::new());
        store.insert(1, (1..=8).map(|d| support_game(d, 8)).collect());
        let engine = RecommendationEngine::new(store);

        let recs = engine.recommend(1, fixed_now()).await.unwrap();
        for (idx, rec) in recs.iter().enumerate() {
            assert_eq!(rec.priority, idx as u32 + 1);
            assert!(rec.confidence >= MIN_CONFIDENCE);
            assert!(!rec.action_items.is_empty());
        }
    }

    #[tokio::test]
    async fn too_few_games_yields_no_recommendations() {
        let store = Arc::new(InMemoryMatchStore::new());
        store.insert(1, vec![support_game(1, 8), support_game(2, 8)]);
        let engine = RecommendationEngine::new(store);

        let recs = engine.recommend(1, fixed_now()).await.unwrap();
        assert!(recs.is_empty());
    }

    #[test]
    fn gap_ratio_floors_at_zero() {
        assert!((gap_ratio(7.0, 9.0) - 0.0).abs() < f64::EPSILON);
        assert!((gap_ratio(7.0, 3.5) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn improvement_estimate_is_bounded() {
        assert_eq!(improvement_estimate(0.0), "+2% winrate");
        assert_eq!(improvement_estimate(10.0), "+10% winrate");
    }
}
