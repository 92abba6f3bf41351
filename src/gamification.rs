//! XP and levels.
//!
//! Level is always recomputed from cumulative XP; it is never bumped on its own.

use uuid::Uuid;

use crate::models::LearnerStats;
use crate::store::{ProgressStore, StoreResult};

/// XP granted for a completed training. Without a passed, scored quiz the
/// learner gets half the training's XP.
pub fn xp_reward(total_xp: i32, score: Option<f64>, passed: bool) -> i64 {
    let ratio = match score {
        Some(s) if passed && s.is_finite() => s.clamp(0.0, 100.0) / 100.0,
        _ => 0.5,
    };
    (f64::from(total_xp.max(0)) * ratio).round() as i64
}

/// Cumulative XP needed to reach `level` (level 1 needs nothing).
pub fn xp_for_level(level: i32) -> i64 {
    let l = i64::from(level.max(1));
    50 * l * (l - 1)
}

pub fn level_for_xp(xp: i64) -> i32 {
    let mut level = 1;
    while xp >= xp_for_level(level + 1) {
        level += 1;
    }
    level
}

#[derive(Debug, Clone, PartialEq)]
pub struct XpAward {
    pub xp: i64,
    pub stats: LearnerStats,
}

/// Grant completion XP for `training_id`. Returns `None` when this learner
/// was already rewarded for the training.
pub async fn award_completion(
    store: &dyn ProgressStore,
    learner_id: Uuid,
    training_id: Uuid,
    total_xp: i32,
    score: Option<f64>,
    passed: bool,
) -> StoreResult<Option<XpAward>> {
    let xp = xp_reward(total_xp, score, passed);
    let awarded = store.award_xp(learner_id, training_id, xp, level_for_xp).await?;
    match awarded {
        Some(stats) => {
            tracing::info!(
                learner_id = %learner_id,
                training_id = %training_id,
                xp,
                total_xp = stats.total_xp,
                level = stats.level,
                "xp awarded"
            );
            Ok(Some(XpAward { xp, stats }))
        }
        None => {
            tracing::debug!(learner_id = %learner_id, training_id = %training_id, "xp already awarded");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reward_scales_with_passing_score() {
        assert_eq!(xp_reward(200, Some(80.0), true), 160);
        assert_eq!(xp_reward(200, Some(100.0), true), 200);
    }

    #[test]
    fn reward_is_half_without_a_passed_score() {
        assert_eq!(xp_reward(200, None, false), 100);
        assert_eq!(xp_reward(200, None, true), 100);
        assert_eq!(xp_reward(200, Some(40.0), false), 100);
        assert_eq!(xp_reward(75, None, false), 38);
    }

    #[test]
    fn level_curve_thresholds() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(99), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(299), 2);
        assert_eq!(level_for_xp(300), 3);
        assert_eq!(level_for_xp(600), 4);
        assert_eq!(level_for_xp(-5), 1);
    }

    #[test]
    fn level_is_monotonic_in_xp() {
        let mut last = 1;
        for xp in (0..5000).step_by(37) {
            let l = level_for_xp(xp);
            assert!(l >= last);
            last = l;
        }
    }
}
