//! Insight generation rules.
//!
//! Each qualifying event or analytics delta is looked up in an importance
//! table (−1.0 to +1.0) and a detection-threshold table. The weight's sign
//! picks the level (positive is success, negative is warning) and a
//! magnitude at or above [`CRITICAL_CUTOFF`] upgrades it to critical. Every
//! insight gets a deterministic type tag and an action URL pointing at the
//! page that explains it; streak and promotion insights expire after
//! [`STREAK_TTL_DAYS`] days so stale motivational content does not pile up.

use std::sync::Arc;

use chrono::{Duration, Utc};

use super::{InsightLevel, InsightPayload, InsightStore, InsightType, NewInsight, StreakKind};
use crate::analytics::period::PeriodStats;
use crate::analytics::mmr::MmrTrajectory;
use crate::analytics::recommend::Recommendation;
use crate::broker::NotificationBroker;
use crate::matches::MatchRecord;

/// Fractional score gain that qualifies as a performance jump.
pub const PERF_JUMP_MIN: f64 = 0.15;

/// Fractional score loss that qualifies as a performance dip.
pub const PERF_DROP_MIN: f64 = 0.20;

/// Wins in a row before a streak insight fires.
pub const WIN_STREAK_MIN: u32 = 5;

/// Losses in a row before a slump insight fires.
pub const LOSS_STREAK_MIN: u32 = 3;

/// Champion win rate that counts as mastery.
pub const CHAMPION_WIN_RATE_MIN: f64 = 0.8;

/// Games on a champion before mastery is considered.
pub const CHAMPION_GAMES_MIN: u32 = 5;

/// Net MMR movement over recent games that warrants an insight.
pub const MMR_SHIFT_MIN: i32 = 50;

/// Recent games considered for the MMR shift window.
pub const MMR_SHIFT_WINDOW: usize = 5;

/// Smallest multi-kill that counts as a key moment.
pub const MULTI_KILL_MIN: u32 = 2;

/// Bounty gold that counts as a shutdown.
pub const SHUTDOWN_GOLD_MIN: u32 = 450;

/// Deaths in one game that trigger a warning.
pub const HIGH_DEATHS_MIN: u32 = 5;

/// Recommendation priority at or below which an entry is high priority.
pub const HIGH_PRIORITY_MAX: u32 = 3;

/// Days before streak and promotion insights expire.
pub const STREAK_TTL_DAYS: i64 = 7;

/// Importance magnitude at or above which an insight is critical.
pub const CRITICAL_CUTOFF: f64 = 0.95;

/// Key in-match events with their importance weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// First blood secured.
    FirstBlood,
    /// Double kill or better (but not a full ace/penta).
    MultiKill,
    /// A pentakill.
    Pentakill,
    /// A bounty shutdown collected.
    Shutdown,
    /// An unusually high death count.
    HighDeaths,
}

impl KeyEvent {
    /// Importance weight, in [−1.0, +1.0].
    #[must_use]
    pub const fn importance(self) -> f64 {
        match self {
            Self::FirstBlood => 0.9,
            Self::MultiKill => 0.8,
            Self::Pentakill => 1.0,
            Self::Shutdown => 0.9,
            Self::HighDeaths => -0.7,
        }
    }

    /// Stable event tag for payloads.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::FirstBlood => "first_blood",
            Self::MultiKill => "multi_kill",
            Self::Pentakill => "pentakill",
            Self::Shutdown => "shutdown",
            Self::HighDeaths => "high_deaths",
        }
    }
}

/// Level derived from an importance weight: sign picks success vs warning,
/// magnitude at or above [`CRITICAL_CUTOFF`] upgrades to critical.
#[must_use]
pub fn level_for(weight: f64) -> InsightLevel {
    if weight.abs() >= CRITICAL_CUTOFF {
        InsightLevel::Critical
    } else if weight > 0.0 {
        InsightLevel::Success
    } else {
        InsightLevel::Warning
    }
}

/// The streak a match history currently ends in, if longer than one game.
#[must_use]
pub fn current_streak(matches: &[MatchRecord]) -> Option<(StreakKind, u32)> {
    let last = matches.last()?;
    let length = matches
        .iter()
        .rev()
        .take_while(|m| m.win == last.win)
        .count() as u32;
    if length < 2 {
        return None;
    }
    let kind = if last.win {
        StreakKind::Win
    } else {
        StreakKind::Loss
    };
    Some((kind, length))
}

/// Rules engine turning analytics facts into stored, published insights.
pub struct InsightGenerator {
    store: Arc<InsightStore>,
    broker: Arc<NotificationBroker>,
}

impl InsightGenerator {
    /// Create a generator writing to `store` and publishing via `broker`.
    #[must_use]
    pub fn new(store: Arc<InsightStore>, broker: Arc<NotificationBroker>) -> Self {
        Self { store, broker }
    }

    /// Generate key-moment insights for one freshly ingested match.
    pub async fn process_match(&self, user_id: i64, m: &MatchRecord) {
        if m.first_blood {
            self.emit_key_moment(
                user_id,
                m,
                KeyEvent::FirstBlood,
                "First blood",
                format!("You drew first blood on {}", m.champion),
                0,
            )
            .await;
        }

        if m.largest_multi_kill >= MULTI_KILL_MIN {
            let event = if m.largest_multi_kill >= 5 {
                KeyEvent::Pentakill
            } else {
                KeyEvent::MultiKill
            };
            let title = match m.largest_multi_kill {
                2 => "Double kill",
                3 => "Triple kill",
                4 => "Quadra kill",
                _ => "Pentakill",
            };
            self.emit_key_moment(
                user_id,
                m,
                event,
                title,
                format!("{title} on {} - keep the pressure up", m.champion),
                i64::from(m.largest_multi_kill),
            )
            .await;
        }

        if m.shutdown_gold >= SHUTDOWN_GOLD_MIN {
            self.emit_key_moment(
                user_id,
                m,
                KeyEvent::Shutdown,
                "Shutdown secured",
                format!("You collected a {} gold bounty", m.shutdown_gold),
                i64::from(m.shutdown_gold),
            )
            .await;
        }

        if m.deaths >= HIGH_DEATHS_MIN {
            self.emit_key_moment(
                user_id,
                m,
                KeyEvent::HighDeaths,
                "High death count",
                format!(
                    "{} deaths on {} - check the recommendations for positioning tips",
                    m.deaths, m.champion
                ),
                i64::from(m.deaths),
            )
            .await;
        }
    }

    /// Generate insights from a freshly computed period summary: score
    /// shifts, streaks, and champion mastery.
    pub async fn process_period_stats(
        &self,
        user_id: i64,
        stats: &PeriodStats,
        matches: &[MatchRecord],
    ) {
        if let Some(change) = stats.score_change {
            if change >= PERF_JUMP_MIN {
                self.emit(NewInsight {
                    user_id,
                    insight_type: InsightType::Performance,
                    level: InsightLevel::Success,
                    title: "Performance boost".into(),
                    message: format!(
                        "Your performance score improved by {:.0}% over the previous {}",
                        change * 100.0,
                        stats.period
                    ),
                    payload: InsightPayload::PerformanceShift { change },
                    action_url: Some("/analytics/performance".into()),
                    expires_at: None,
                })
                .await;
            } else if change <= -PERF_DROP_MIN {
                self.emit(NewInsight {
                    user_id,
                    insight_type: InsightType::Performance,
                    level: InsightLevel::Warning,
                    title: "Performance dip detected".into(),
                    message: format!(
                        "Your performance dropped by {:.0}% against the previous {}",
                        change.abs() * 100.0,
                        stats.period
                    ),
                    payload: InsightPayload::PerformanceShift { change },
                    action_url: Some("/analytics/recommendations".into()),
                    expires_at: None,
                })
                .await;
            }
        }

        match current_streak(matches) {
            Some((StreakKind::Win, length)) if length >= WIN_STREAK_MIN => {
                self.emit(NewInsight {
                    user_id,
                    insight_type: InsightType::Streak,
                    level: InsightLevel::Success,
                    title: "Win streak".into(),
                    message: format!("You are on a {length} game win streak - keep the momentum"),
                    payload: InsightPayload::Streak {
                        streak: StreakKind::Win,
                        length,
                    },
                    action_url: Some("/analytics/performance".into()),
                    expires_at: Some(Utc::now() + Duration::days(STREAK_TTL_DAYS)),
                })
                .await;
            }
            Some((StreakKind::Loss, length)) if length >= LOSS_STREAK_MIN => {
                self.emit(NewInsight {
                    user_id,
                    insight_type: InsightType::Streak,
                    level: InsightLevel::Warning,
                    title: "Turn it around".into(),
                    message: format!(
                        "{length} losses in a row - the recommendations page has concrete next steps"
                    ),
                    payload: InsightPayload::Streak {
                        streak: StreakKind::Loss,
                        length,
                    },
                    action_url: Some("/analytics/recommendations".into()),
                    expires_at: Some(Utc::now() + Duration::days(STREAK_TTL_DAYS)),
                })
                .await;
            }
            _ => {}
        }

        for champion in &stats.top_champions {
            if champion.win_rate >= CHAMPION_WIN_RATE_MIN && champion.games >= CHAMPION_GAMES_MIN {
                self.emit(NewInsight {
                    user_id,
                    insight_type: InsightType::Champion,
                    level: InsightLevel::Success,
                    title: "Champion mastery".into(),
                    message: format!(
                        "{:.0}% win rate over {} games on {}",
                        champion.win_rate * 100.0,
                        champion.games,
                        champion.champion
                    ),
                    payload: InsightPayload::ChampionMastery {
                        champion: champion.champion.clone(),
                        win_rate: champion.win_rate,
                        games: champion.games,
                    },
                    action_url: Some("/analytics/champions".into()),
                    expires_at: None,
                })
                .await;
            }
        }
    }

    /// Generate insights from a freshly computed MMR trajectory: large
    /// recent shifts and rank promotions.
    pub async fn process_mmr(&self, user_id: i64, trajectory: &MmrTrajectory) {
        let recent: Vec<_> = trajectory
            .history
            .iter()
            .rev()
            .take(MMR_SHIFT_WINDOW)
            .collect();
        let change: i32 = recent.iter().map(|p| p.delta).sum();

        if change > MMR_SHIFT_MIN {
            self.emit(NewInsight {
                user_id,
                insight_type: InsightType::Mmr,
                level: InsightLevel::Success,
                title: "MMR climbing".into(),
                message: format!("Your MMR gained {change} points over recent games"),
                payload: InsightPayload::MmrShift { change },
                action_url: Some("/analytics/mmr".into()),
                expires_at: None,
            })
            .await;
        } else if change < -MMR_SHIFT_MIN {
            self.emit(NewInsight {
                user_id,
                insight_type: InsightType::Mmr,
                level: InsightLevel::Warning,
                title: "MMR slipping".into(),
                message: format!(
                    "Your MMR dropped {} points over recent games - see what to focus on",
                    change.abs()
                ),
                payload: InsightPayload::MmrShift { change },
                action_url: Some("/analytics/recommendations".into()),
                expires_at: None,
            })
            .await;
        }

        if let Some(oldest_recent) = recent.last() {
            let newest = trajectory.current_rank;
            if newest.base_mmr() > oldest_recent.rank_estimate.base_mmr() {
                self.emit(NewInsight {
                    user_id,
                    insight_type: InsightType::Mmr,
                    level: InsightLevel::Success,
                    title: "Rank promotion".into(),
                    message: format!("Your estimated rank climbed to {newest}"),
                    payload: InsightPayload::RankPromotion {
                        new_rank: newest.to_string(),
                    },
                    action_url: Some("/analytics/mmr".into()),
                    expires_at: Some(Utc::now() + Duration::days(STREAK_TTL_DAYS)),
                })
                .await;
            }
        }
    }

    /// Generate a digest insight when fresh recommendations contain
    /// high-priority entries.
    pub async fn process_recommendations(&self, user_id: i64, recommendations: &[Recommendation]) {
        if recommendations.is_empty() {
            return;
        }
        let high_priority = recommendations
            .iter()
            .filter(|r| r.priority <= HIGH_PRIORITY_MAX)
            .count() as u32;
        if high_priority == 0 {
            return;
        }

        self.emit(NewInsight {
            user_id,
            insight_type: InsightType::Recommendation,
            level: InsightLevel::Info,
            title: "New high-priority recommendations".into(),
            message: format!(
                "{high_priority} high-priority improvement areas identified"
            ),
            payload: InsightPayload::RecommendationDigest {
                high_priority,
                total: recommendations.len() as u32,
            },
            action_url: Some("/analytics/recommendations".into()),
            expires_at: None,
        })
        .await;
    }

    async fn emit_key_moment(
        &self,
        user_id: i64,
        m: &MatchRecord,
        event: KeyEvent,
        title: &str,
        message: String,
        magnitude: i64,
    ) {
        self.emit(NewInsight {
            user_id,
            insight_type: InsightType::Performance,
            level: level_for(event.importance()),
            title: title.to_string(),
            message,
            payload: InsightPayload::KeyMoment {
                match_id: m.match_id.clone(),
                event: event.tag().to_string(),
                magnitude,
            },
            action_url: Some("/analytics/performance".into()),
            expires_at: None,
        })
        .await;
    }

    /// Store and publish one insight. Failures are logged, never propagated:
    /// insight generation is a side effect that must not fail analytics.
    async fn emit(&self, draft: NewInsight) {
        match self.store.insert(&draft).await {
            Ok(insight) => {
                tracing::info!(
                    user_id = insight.user_id,
                    insight_id = insight.id,
                    insight_type = insight.insight_type.as_str(),
                    level = insight.level.as_str(),
                    "insight created"
                );
                self.broker.publish(&insight);
            }
            Err(e) => {
                tracing::warn!(user_id = draft.user_id, error = %e, "failed to store insight");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::analytics::TrendDirection;
    use crate::matches::Role;
    use chrono::{DateTime, TimeZone};
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
            champion: "Ahri".into(),
            kills: 5,
            deaths: 2,
            assists: 5,
            cs: 180,
            gold: 10_000,
            damage_to_champions: 18_000,
            damage_share: 0.24,
            vision_score: 18,
            objectives: 2,
            duration_secs: 1800,
            first_blood: false,
            largest_multi_kill: 1,
            shutdown_gold: 0,
        }
    }

    async fn generator() -> (InsightGenerator, Arc<InsightStore>, Arc<NotificationBroker>) {
        let store = Arc::new(InsightStore::new_in_memory().await.unwrap());
        let broker = Arc::new(NotificationBroker::new(20));
        (
            InsightGenerator::new(Arc::clone(&store), Arc::clone(&broker)),
            store,
            broker,
        )
    }

    #[test]
    fn critical_cutoff_applies_to_magnitude() {
        assert_eq!(level_for(1.0), InsightLevel::Critical);
        assert_eq!(level_for(0.9), InsightLevel::Success);
        assert_eq!(level_for(-0.7), InsightLevel::Warning);
        assert_eq!(level_for(-0.95), InsightLevel::Critical);
    }

    #[test]
    fn streak_detection_reads_the_tail() {
        // Loss, then four wins: a 4-game win streak.
        let matches = vec![
            game(5, false),
            game(4, true),
            game(3, true),
            game(2, true),
            game(1, true),
        ];
        assert_eq!(current_streak(&matches), Some((StreakKind::Win, 4)));

        let no_streak = vec![game(2, false), game(1, true)];
        assert_eq!(current_streak(&no_streak), None);
        assert_eq!(current_streak(&[]), None);
    }

    #[tokio::test]
    async fn pentakill_is_critical() {
        let (generator, store, _broker) = generator().await;
        let mut m = game(1, true);
        m.largest_multi_kill = 5;
        generator.process_match(1, &m).await;

        let insights = store.list(1, None, false).await.unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].level, InsightLevel::Critical);
        assert_eq!(insights[0].title, "Pentakill");
    }

    #[tokio::test]
    async fn shutdown_below_threshold_is_silent() {
        let (generator, store, _broker) = generator().await;
        let mut m = game(1, true);
        m.shutdown_gold = SHUTDOWN_GOLD_MIN - 1;
        generator.process_match(1, &m).await;
        assert!(store.list(1, None, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn high_deaths_warns() {
        let (generator, store, _broker) = generator().await;
        let mut m = game(1, false);
        m.deaths = 9;
        generator.process_match(1, &m).await;

        let insights = store.list(1, None, false).await.unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].level, InsightLevel::Warning);
    }

    #[tokio::test]
    async fn win_streak_insight_expires() {
        let (generator, store, _broker) = generator().await;
        let matches: Vec<_> = (1..=6).rev().map(|d| game(d, true)).collect();
        let stats = empty_period_stats();
        generator.process_period_stats(1, &stats, &matches).await;

        let insights = store.list(1, None, false).await.unwrap();
        let streak = insights
            .iter()
            .find(|i| i.insight_type == InsightType::Streak)
            .unwrap();
        assert!(streak.expires_at.is_some());
        assert_eq!(
            streak.payload,
            InsightPayload::Streak {
                streak: StreakKind::Win,
                length: 6
            }
        );
    }

    #[tokio::test]
    async fn published_insights_reach_subscribers() {
        let (generator, _store, broker) = generator().await;
        let mut sub = broker.subscribe(1);
        let mut m = game(1, true);
        m.first_blood = true;
        generator.process_match(1, &m).await;

        let delivered = sub.receiver.try_recv().unwrap();
        assert_eq!(delivered.title, "First blood");
    }

    fn empty_period_stats() -> PeriodStats {
        PeriodStats {
            period: crate::analytics::period::Period::Week,
            total_games: 6,
            wins: 6,
            losses: 0,
            win_rate: 1.0,
            avg_kda: 5.0,
            avg_cs_per_min: 6.0,
            avg_gold_per_min: 400.0,
            avg_damage_per_min: 600.0,
            avg_vision_score: 20.0,
            performance_score: 70.0,
            score_change: None,
            trend: TrendDirection::Stable,
            best_role: None,
            worst_role: None,
            role_performance: Vec::new(),
            top_champions: Vec::new(),
            suggestions: Vec::new(),
            insufficient_data: false,
        }
    }
}
