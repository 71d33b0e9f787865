//! Scoring weight tables.
//!
//! Composite performance scores are weighted sums over six metric
//! components, with per-role overrides and game-phase weights. Roles weigh
//! the components very differently (a support's vision matters three times
//! as much as a top laner's), so the override table, not the base table, is
//! the common path.

use crate::matches::Role;

/// Weights over the six scored metric components. Each table sums to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceWeights {
    /// Kills/deaths/assists efficiency.
    pub kda: f64,
    /// Creep score per minute.
    pub farming: f64,
    /// Vision score.
    pub vision: f64,
    /// Damage to champions per minute.
    pub damage: f64,
    /// Turret and epic-monster takedowns.
    pub objectives: f64,
    /// Death avoidance.
    pub survival: f64,
}

/// Baseline weights when the role is unknown.
pub const BASE_WEIGHTS: PerformanceWeights = PerformanceWeights {
    kda: 0.25,
    farming: 0.20,
    vision: 0.15,
    damage: 0.20,
    objectives: 0.10,
    survival: 0.10,
};

/// Weights applied to game-phase buckets when blending a window score:
/// early game 0.30, mid game 0.40, late game 0.30.
pub const PHASE_WEIGHTS: [f64; 3] = [0.30, 0.40, 0.30];

/// Game length (seconds) below which a match is bucketed as early-game
/// decided.
pub const EARLY_GAME_MAX_SECS: u32 = 1500;

/// Game length (seconds) below which a match is bucketed as mid-game
/// decided; longer games land in the late bucket.
pub const MID_GAME_MAX_SECS: u32 = 2100;

/// Role-specific weight overrides.
#[must_use]
pub const fn role_weights(role: Role) -> PerformanceWeights {
    match role {
        Role::Top => PerformanceWeights {
            kda: 0.25,
            farming: 0.25,
            vision: 0.10,
            damage: 0.25,
            objectives: 0.10,
            survival: 0.05,
        },
        Role::Jungle => PerformanceWeights {
            kda: 0.20,
            farming: 0.15,
            vision: 0.20,
            damage: 0.20,
            objectives: 0.20,
            survival: 0.05,
        },
        Role::Middle => PerformanceWeights {
            kda: 0.25,
            farming: 0.22,
            vision: 0.08,
            damage: 0.30,
            objectives: 0.10,
            survival: 0.05,
        },
        Role::Bottom => PerformanceWeights {
            kda: 0.30,
            farming: 0.25,
            vision: 0.05,
            damage: 0.30,
            objectives: 0.05,
            survival: 0.05,
        },
        Role::Utility => PerformanceWeights {
            kda: 0.15,
            farming: 0.05,
            vision: 0.30,
            damage: 0.10,
            objectives: 0.25,
            survival: 0.15,
        },
    }
}

/// Role-expected performance baselines, used by the recommendation engine
/// to measure gaps between observed and expected play.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoleThresholds {
    /// Multiplier on the standard CS/min expectation.
    pub cs_multiplier: f64,
    /// Multiplier on the standard vision expectation.
    pub vision_multiplier: f64,
    /// Multiplier on the standard damage expectation.
    pub damage_multiplier: f64,
    /// Expected share of team damage, [0,1].
    pub expected_damage_share: f64,
    /// Expected share of team kills, [0,1].
    pub expected_kill_share: f64,
}

/// Standard CS/min a laner is expected to hold.
pub const STANDARD_CS_PER_MIN: f64 = 7.0;

/// Standard per-game vision score expectation.
pub const STANDARD_VISION_SCORE: f64 = 20.0;

/// Standard damage-per-minute expectation.
pub const STANDARD_DAMAGE_PER_MIN: f64 = 600.0;

/// Standard KDA expectation, role-independent.
pub const STANDARD_KDA: f64 = 2.5;

/// Role-specific expectations.
#[must_use]
pub const fn role_thresholds(role: Role) -> RoleThresholds {
    match role {
        Role::Top => RoleThresholds {
            cs_multiplier: 1.0,
            vision_multiplier: 0.7,
            damage_multiplier: 1.1,
            expected_damage_share: 0.22,
            expected_kill_share: 0.20,
        },
        Role::Jungle => RoleThresholds {
            cs_multiplier: 0.7,
            vision_multiplier: 1.2,
            damage_multiplier: 0.9,
            expected_damage_share: 0.18,
            expected_kill_share: 0.22,
        },
        Role::Middle => RoleThresholds {
            cs_multiplier: 1.0,
            vision_multiplier: 0.8,
            damage_multiplier: 1.2,
            expected_damage_share: 0.28,
            expected_kill_share: 0.25,
        },
        Role::Bottom => RoleThresholds {
            cs_multiplier: 1.1,
            vision_multiplier: 0.6,
            damage_multiplier: 1.3,
            expected_damage_share: 0.32,
            expected_kill_share: 0.28,
        },
        Role::Utility => RoleThresholds {
            cs_multiplier: 0.2,
            vision_multiplier: 2.0,
            damage_multiplier: 0.4,
            expected_damage_share: 0.08,
            expected_kill_share: 0.05,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn every_weight_table_sums_to_one() {
        let tables = Role::ALL
            .iter()
            .map(|&role| role_weights(role))
            .chain(std::iter::once(BASE_WEIGHTS));
        for w in tables {
            let sum = w.kda + w.farming + w.vision + w.damage + w.objectives + w.survival;
            assert!((sum - 1.0).abs() < 1e-9, "weights must sum to 1, got {sum}");
        }
    }

    #[test]
    fn phase_weights_sum_to_one() {
        let sum: f64 = PHASE_WEIGHTS.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn support_weighs_vision_most() {
        assert!(role_weights(Role::Utility).vision > role_weights(Role::Top).vision);
        assert!(
            (role_weights(Role::Utility).vision - 0.30).abs() < f64::EPSILON,
            "support vision weight is 0.30"
        );
    }

    #[test]
    fn support_expected_damage_share_is_lowest() {
        let support = role_thresholds(Role::Utility).expected_damage_share;
        for role in [Role::Top, Role::Jungle, Role::Middle, Role::Bottom] {
            assert!(role_thresholds(role).expected_damage_share > support);
        }
    }
}
