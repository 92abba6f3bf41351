//! Course-level completion, derived from the learner's training records.

use std::collections::HashSet;

use chrono::Utc;
use uuid::Uuid;

use crate::models::{CourseProgress, Training, TrainingProgress};
use crate::progress::round2;
use crate::store::{ProgressStore, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CourseSummary {
    pub completed: i32,
    pub total: i32,
    pub progress_pct: f64,
}

/// Only completions of currently published trainings count.
pub fn summarize(published: &[Training], progress: &[TrainingProgress]) -> CourseSummary {
    let ids: HashSet<Uuid> = published.iter().map(|t| t.id).collect();
    let completed = progress
        .iter()
        .filter(|p| p.is_completed && ids.contains(&p.training_id))
        .count() as i32;
    let total = ids.len() as i32;
    let progress_pct = if total == 0 {
        0.0
    } else {
        round2(100.0 * f64::from(completed) / f64::from(total))
    };
    CourseSummary {
        completed,
        total,
        progress_pct,
    }
}

/// Recompute and upsert the learner's course record. The first call for a
/// learner creates it.
pub async fn aggregate(
    store: &dyn ProgressStore,
    learner_id: Uuid,
    course_id: Uuid,
) -> StoreResult<CourseProgress> {
    let previous = store
        .get_course_progress(learner_id, course_id)
        .await?
        .unwrap_or_else(|| CourseProgress::new(learner_id, course_id));
    let published = store.list_published_trainings(course_id).await?;
    let progress = store
        .list_learner_progress_in_course(learner_id, course_id)
        .await?;

    let summary = summarize(&published, &progress);
    let is_completed = summary.progress_pct >= 100.0;

    let mut record = previous.clone();
    record.progress_pct = summary.progress_pct;
    record.completed_trainings = summary.completed;
    record.total_trainings = summary.total;
    record.is_completed = is_completed;
    record.completed_at = match (previous.is_completed, is_completed) {
        (false, true) => Some(Utc::now()),
        (true, true) => previous.completed_at.or_else(|| Some(Utc::now())),
        (_, false) => None,
    };
    store.save_course_progress(&record).await?;

    if previous.is_completed != is_completed {
        tracing::info!(
            learner_id = %learner_id,
            course_id = %course_id,
            completed = is_completed,
            progress_pct = record.progress_pct,
            "course completion changed"
        );
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn training(course_id: Uuid, published: bool) -> Training {
        Training {
            id: Uuid::new_v4(),
            course_id,
            title: "t".into(),
            video_url: None,
            video_duration_seconds: Some(60),
            total_xp: 100,
            is_published: published,
            created_at: Utc::now(),
        }
    }

    fn done(learner: Uuid, t: &Training, completed: bool) -> TrainingProgress {
        let mut p = TrainingProgress::new(learner, t.id);
        p.is_completed = completed;
        p.progress_pct = if completed { 100.0 } else { 40.0 };
        p
    }

    #[test]
    fn counts_completed_published_trainings() {
        let course = Uuid::new_v4();
        let learner = Uuid::new_v4();
        let ts: Vec<Training> = (0..3).map(|_| training(course, true)).collect();
        let progress = vec![done(learner, &ts[0], true), done(learner, &ts[1], false)];
        let s = summarize(&ts, &progress);
        assert_eq!(s.completed, 1);
        assert_eq!(s.total, 3);
        assert_eq!(s.progress_pct, 33.33);
    }

    #[test]
    fn unpublished_completions_are_ignored() {
        let course = Uuid::new_v4();
        let learner = Uuid::new_v4();
        let published = training(course, true);
        let draft = training(course, false);
        let progress = vec![done(learner, &published, true), done(learner, &draft, true)];
        let s = summarize(std::slice::from_ref(&published), &progress);
        assert_eq!(s.completed, 1);
        assert_eq!(s.progress_pct, 100.0);
    }

    #[test]
    fn empty_course_is_zero() {
        let s = summarize(&[], &[]);
        assert_eq!(s.total, 0);
        assert_eq!(s.progress_pct, 0.0);
    }
}
