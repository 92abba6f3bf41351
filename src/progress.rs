//! Training progress computation.
//!
//! Everything here is pure: the engine fetches a fresh [`TrainingContentShape`]
//! and fresh learner signals for every computation and persists the result
//! itself. Nothing is cached between calls because content can change after
//! learners have started.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{SubUnit, SubUnitProgress, Training, TrainingProgress};
use crate::weights::{weights_for, ComponentPresence};

const SUB_UNIT_VIDEO_WEIGHT: f64 = 0.7;
const SUB_UNIT_QUIZ_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubUnitShape {
    pub sub_unit_id: Uuid,
    pub has_video: bool,
    pub has_quiz: bool,
}

/// Derived view of a training's current content graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainingContentShape {
    pub has_video: bool,
    pub has_quiz: bool,
    pub sub_units: Vec<SubUnitShape>,
}

impl TrainingContentShape {
    /// `sub_units_with_quiz` lists the sub-units that currently own a quiz.
    pub fn build(
        training: &Training,
        training_has_quiz: bool,
        sub_units: &[SubUnit],
        sub_units_with_quiz: &[Uuid],
    ) -> Self {
        let sub_units = sub_units
            .iter()
            .map(|su| SubUnitShape {
                sub_unit_id: su.id,
                has_video: su.has_video(),
                has_quiz: sub_units_with_quiz.contains(&su.id),
            })
            .collect();
        Self {
            has_video: training.has_video(),
            has_quiz: training_has_quiz,
            sub_units,
        }
    }

    pub fn has_sub_units(&self) -> bool {
        !self.sub_units.is_empty()
    }

    pub fn presence(&self) -> ComponentPresence {
        ComponentPresence {
            video: self.has_video,
            quiz: self.has_quiz,
            sub_units: self.has_sub_units(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SubUnitSignals {
    pub video_progress_pct: f64,
    pub quiz_completed: bool,
}

impl From<&SubUnitProgress> for SubUnitSignals {
    fn from(p: &SubUnitProgress) -> Self {
        Self {
            video_progress_pct: p.video_progress_pct,
            quiz_completed: p.quiz_completed,
        }
    }
}

/// Raw learner signals for one training, with sub-unit signals aligned to
/// the shape's sub-unit order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainingSignals {
    pub video_progress_pct: f64,
    pub quiz_completed: bool,
    pub sub_units: Vec<SubUnitSignals>,
}

impl TrainingSignals {
    /// Sub-units the learner never touched get zero signals.
    pub fn collect(
        record: &TrainingProgress,
        shape: &TrainingContentShape,
        sub_progress: &[SubUnitProgress],
    ) -> Self {
        let by_id: HashMap<Uuid, &SubUnitProgress> =
            sub_progress.iter().map(|p| (p.sub_unit_id, p)).collect();
        let sub_units = shape
            .sub_units
            .iter()
            .map(|s| {
                by_id
                    .get(&s.sub_unit_id)
                    .map(|p| SubUnitSignals::from(*p))
                    .unwrap_or_default()
            })
            .collect();
        Self {
            video_progress_pct: record.video_progress_pct,
            quiz_completed: record.quiz_completed,
            sub_units,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressOutcome {
    pub progress_pct: f64,
    pub is_completed: bool,
    /// Display-only count of sub-units scoring 100%.
    pub sub_units_completed: i32,
    pub sub_units_total: i32,
}

/// Completion of a single sub-unit, 0..=100. Video 70 / quiz 30, collapsing
/// onto whichever component exists. The quiz is pass/fail, not proportional.
pub fn score_sub_unit(shape: &SubUnitShape, signals: &SubUnitSignals) -> f64 {
    let (video_w, quiz_w) = match (shape.has_video, shape.has_quiz) {
        (true, true) => (SUB_UNIT_VIDEO_WEIGHT, SUB_UNIT_QUIZ_WEIGHT),
        (true, false) => (1.0, 0.0),
        (false, true) => (0.0, 1.0),
        (false, false) => return 0.0,
    };
    let video = clamp_pct(signals.video_progress_pct) * video_w;
    let quiz = if signals.quiz_completed { 100.0 * quiz_w } else { 0.0 };
    clamp_pct(round2(video + quiz))
}

/// Weighted completion for a training.
///
/// The sub-unit term averages over every sub-unit in the shape, so an
/// unstarted sub-unit pulls the training down. A shape with no components
/// is pinned at 0% and never completes.
pub fn calculate(signals: &TrainingSignals, shape: &TrainingContentShape) -> ProgressOutcome {
    let total = shape.sub_units.len() as i32;
    let sub_scores: Vec<f64> = shape
        .sub_units
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let sig = signals.sub_units.get(i).copied().unwrap_or_default();
            score_sub_unit(s, &sig)
        })
        .collect();
    let sub_units_completed = sub_scores.iter().filter(|s| **s >= 100.0).count() as i32;

    let Some(weights) = weights_for(shape.presence()) else {
        return ProgressOutcome {
            progress_pct: 0.0,
            is_completed: false,
            sub_units_completed,
            sub_units_total: total,
        };
    };

    let video = clamp_pct(signals.video_progress_pct) * weights.video;
    let quiz = if signals.quiz_completed { 100.0 * weights.quiz } else { 0.0 };
    let sub_units = if sub_scores.is_empty() {
        0.0
    } else {
        sub_scores.iter().sum::<f64>() / sub_scores.len() as f64 * weights.sub_units
    };

    let progress_pct = clamp_pct(round2(video + quiz + sub_units));
    ProgressOutcome {
        progress_pct,
        is_completed: progress_pct >= 100.0,
        sub_units_completed,
        sub_units_total: total,
    }
}

/// Fold an outcome into a stored record. `completed_at` is stamped on the
/// false -> true transition and cleared when the learner no longer qualifies.
pub fn apply_outcome(
    before: &TrainingProgress,
    outcome: &ProgressOutcome,
    now: DateTime<Utc>,
) -> TrainingProgress {
    let mut after = before.clone();
    after.progress_pct = outcome.progress_pct;
    after.is_completed = outcome.is_completed;
    after.sub_units_completed = outcome.sub_units_completed;
    after.sub_units_total = outcome.sub_units_total;
    after.completed_at = match (before.is_completed, outcome.is_completed) {
        (false, true) => Some(now),
        (true, true) => before.completed_at.or(Some(now)),
        (_, false) => None,
    };
    after
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn clamp_pct(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Video percentage for `seconds` watched out of `duration`.
pub fn video_pct(seconds: i64, duration: i32) -> f64 {
    if duration <= 0 {
        return 0.0;
    }
    clamp_pct(round2(seconds as f64 * 100.0 / duration as f64))
}
