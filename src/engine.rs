//! Learner-facing operations and content mutations.
//!
//! Every operation that writes a learner signal follows the same sequence
//! under the (learner, training) lock: atomic upsert of the raw signal, then
//! [`LearningEngine::settle`], which re-reads fresh state, recomputes and
//! persists derived fields.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::course;
use crate::error::{EngineError, EngineResult};
use crate::gamification::{self, XpAward};
use crate::models::{
    AttemptMeta, ContentChangeResult, CourseProgressView, NewQuiz, NewQuizAttempt, NewSubUnit,
    StatsView, SubUnit, SubUnitQuizResult, SubUnitWatchResult, SubmittedAnswer,
    QuizSubmissionResult, Training, TrainingProgress, WatchProgressResult,
};
use crate::notify::NotificationSink;
use crate::progress::{
    self, apply_outcome, score_sub_unit, SubUnitShape, SubUnitSignals, TrainingContentShape,
    TrainingSignals,
};
use crate::quiz::{self, AttemptSeed, Grade, PresentedQuestion, Quiz, QuizOwner, QuizView};
use crate::recalc::RecalculationReport;
use crate::store::ProgressStore;
use crate::validate;

const LOCK_PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Video percentage that unlocks a quiz.
    pub quiz_unlock_video_pct: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            quiz_unlock_video_pct: 90.0,
        }
    }
}

/// One async mutex per (learner, training).
#[derive(Default)]
struct KeyedLocks {
    inner: Mutex<HashMap<(Uuid, Uuid), Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    async fn acquire(&self, learner_id: Uuid, training_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if map.len() > LOCK_PRUNE_THRESHOLD {
                // only the map holds an idle entry
                map.retain(|_, l| Arc::strong_count(l) > 1);
            }
            map.entry((learner_id, training_id)).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Which course rollups follow a settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rollup {
    /// Only when the training's completion flipped.
    OnFlip,
    /// Every time, so a rollup that failed in an earlier pass is redone.
    Always,
}

/// Result of recomputing one learner's training.
#[derive(Debug)]
pub struct Settled {
    pub before: TrainingProgress,
    pub after: TrainingProgress,
    pub xp: Option<XpAward>,
    /// Set when `after` was saved but the XP award or the course rollup
    /// that follows it failed. The flip in `before`/`after` is still real.
    pub follow_up: Option<EngineError>,
}

impl Settled {
    pub fn demoted(&self) -> bool {
        self.before.is_completed && !self.after.is_completed
    }

    pub fn promoted(&self) -> bool {
        !self.before.is_completed && self.after.is_completed
    }

    /// Turn a failed follow-up into an error for request handlers.
    pub fn checked(self) -> EngineResult<Self> {
        match self.follow_up {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

pub struct LearningEngine {
    store: Arc<dyn ProgressStore>,
    notifier: Arc<dyn NotificationSink>,
    settings: EngineSettings,
    locks: KeyedLocks,
}

impl LearningEngine {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        notifier: Arc<dyn NotificationSink>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            settings,
            locks: KeyedLocks::default(),
        }
    }

    pub fn store(&self) -> &dyn ProgressStore {
        self.store.as_ref()
    }

    pub(crate) fn notifier(&self) -> &dyn NotificationSink {
        self.notifier.as_ref()
    }

    // --- lookups ---

    pub(crate) async fn training(&self, id: Uuid) -> EngineResult<Training> {
        self.store
            .get_training(id)
            .await?
            .ok_or(EngineError::not_found("training", id))
    }

    async fn sub_unit(&self, id: Uuid) -> EngineResult<SubUnit> {
        self.store
            .get_sub_unit(id)
            .await?
            .ok_or(EngineError::not_found("sub-unit", id))
    }

    async fn quiz_for(&self, owner: QuizOwner) -> EngineResult<Quiz> {
        let id = match owner {
            QuizOwner::Training(id) | QuizOwner::SubUnit(id) => id,
        };
        self.store
            .get_quiz_for(owner)
            .await?
            .ok_or(EngineError::not_found("quiz", id))
    }

    /// Fresh shape of the training's content graph.
    pub(crate) async fn load_shape(&self, training: &Training) -> EngineResult<TrainingContentShape> {
        let has_quiz = self
            .store
            .get_quiz_for(QuizOwner::Training(training.id))
            .await?
            .is_some();
        let sub_units = self.store.list_sub_units(training.id).await?;
        let with_quiz = self.store.sub_units_with_quiz(training.id).await?;
        Ok(TrainingContentShape::build(
            training,
            has_quiz,
            &sub_units,
            &with_quiz,
        ))
    }

    fn quiz_unlocked(&self, has_video: bool, video_progress_pct: f64) -> bool {
        !has_video || video_progress_pct >= self.settings.quiz_unlock_video_pct
    }

    // --- shared recompute ---

    pub(crate) async fn lock(&self, learner_id: Uuid, training_id: Uuid) -> OwnedMutexGuard<()> {
        self.locks.acquire(learner_id, training_id).await
    }

    /// Recompute one learner's training progress from freshly read signals
    /// and persist the derived fields. The caller must hold the learner's
    /// lock for this training.
    ///
    /// An error means nothing was written. Once the training record is
    /// saved, failures of the XP award or the course rollup are returned in
    /// [`Settled::follow_up`]; both are retried by a later settle.
    pub(crate) async fn settle(
        &self,
        learner_id: Uuid,
        training: &Training,
        shape: &TrainingContentShape,
        rollup: Rollup,
    ) -> EngineResult<Settled> {
        let before = self
            .store
            .get_or_create_training_progress(learner_id, training.id)
            .await?;
        let sub_progress = self
            .store
            .list_sub_unit_progress(learner_id, training.id)
            .await?;
        let signals = TrainingSignals::collect(&before, shape, &sub_progress);
        let outcome = progress::calculate(&signals, shape);
        let after = apply_outcome(&before, &outcome, Utc::now());
        self.store.save_training_outcome(&after).await?;

        let mut settled = Settled {
            before,
            after,
            xp: None,
            follow_up: None,
        };
        if settled.promoted() {
            tracing::info!(
                learner_id = %learner_id,
                training_id = %training.id,
                progress_pct = settled.after.progress_pct,
                "training completed"
            );
        } else if settled.demoted() {
            tracing::info!(
                learner_id = %learner_id,
                training_id = %training.id,
                progress_pct = settled.after.progress_pct,
                "training no longer completed"
            );
        }

        match self.follow_up(learner_id, training, shape, &settled, rollup).await {
            Ok(xp) => settled.xp = xp,
            Err(e) => {
                tracing::error!(
                    learner_id = %learner_id,
                    training_id = %training.id,
                    error = %e,
                    "progress saved but xp award or course rollup failed"
                );
                settled.follow_up = Some(e);
            }
        }
        Ok(settled)
    }

    async fn follow_up(
        &self,
        learner_id: Uuid,
        training: &Training,
        shape: &TrainingContentShape,
        settled: &Settled,
        rollup: Rollup,
    ) -> EngineResult<Option<XpAward>> {
        // The award ledger admits one award per (learner, training), so
        // re-confirmed completions are no-ops here.
        let xp = if settled.after.is_completed {
            let (score, passed) = if shape.has_quiz && settled.after.quiz_completed {
                (settled.after.quiz_score, true)
            } else {
                (None, false)
            };
            gamification::award_completion(
                self.store(),
                learner_id,
                training.id,
                training.total_xp,
                score,
                passed,
            )
            .await?
        } else {
            None
        };

        if rollup == Rollup::Always || settled.promoted() || settled.demoted() {
            course::aggregate(self.store(), learner_id, training.course_id).await?;
        }
        Ok(xp)
    }

    async fn present(
        &self,
        learner_id: Uuid,
        quiz: &Quiz,
    ) -> EngineResult<(i32, Vec<PresentedQuestion>)> {
        let prior = self.store.count_quiz_attempts(learner_id, quiz.id).await?;
        let attempt_number = i32::try_from(prior + 1).unwrap_or(i32::MAX);
        let seed = AttemptSeed::new(learner_id, quiz.id, attempt_number);
        let shown = quiz::select_questions(
            &quiz.questions,
            seed,
            quiz.questions_per_attempt,
            quiz.shuffle_options,
        );
        Ok((attempt_number, shown))
    }

    /// Grade a submission against the questions shown for this attempt and
    /// append the attempt record.
    async fn grade_attempt(
        &self,
        learner_id: Uuid,
        quiz: &Quiz,
        answers: &[SubmittedAnswer],
        meta: &AttemptMeta,
    ) -> EngineResult<(i32, Grade, bool)> {
        let time_spent = validate::time_spent(meta.time_spent_seconds)?;
        let (attempt_number, shown) = self.present(learner_id, quiz).await?;
        let grade = quiz::grade(&shown, answers);
        let passed = grade.score >= f64::from(quiz.passing_score);

        self.store
            .insert_quiz_attempt(&NewQuizAttempt {
                learner_id,
                quiz_id: quiz.id,
                attempt_number,
                score: grade.score,
                answers: serde_json::to_value(answers)?,
                started_at: meta.started_at.unwrap_or_else(Utc::now),
                time_spent_seconds: time_spent,
                passed,
            })
            .await?;

        tracing::info!(
            learner_id = %learner_id,
            quiz_id = %quiz.id,
            attempt_number,
            score = grade.score,
            passed,
            "quiz attempt recorded"
        );
        Ok((attempt_number, grade, passed))
    }

    // --- training operations ---

    pub async fn record_watch_progress(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
        watched_seconds: f64,
    ) -> EngineResult<WatchProgressResult> {
        let seconds = validate::watched_seconds(watched_seconds)?;
        let training = self.training(training_id).await?;
        let Some(duration) = training.video_duration_seconds.filter(|d| *d > 0) else {
            return Err(EngineError::validation("training has no video"));
        };
        let seconds = seconds.min(i64::from(duration));
        let pct = progress::video_pct(seconds, duration);

        let _guard = self.lock(learner_id, training_id).await;
        self.store
            .record_training_watch(learner_id, training_id, seconds, pct)
            .await?;
        let shape = self.load_shape(&training).await?;
        let settled = self
            .settle(learner_id, &training, &shape, Rollup::OnFlip)
            .await?
            .checked()?;

        Ok(WatchProgressResult {
            video_progress_pct: settled.after.video_progress_pct,
            can_take_quiz: shape.has_quiz
                && self.quiz_unlocked(true, settled.after.video_progress_pct),
            progress_pct: settled.after.progress_pct,
        })
    }

    pub async fn get_training_quiz(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
    ) -> EngineResult<QuizView> {
        self.training(training_id).await?;
        let quiz = self.quiz_for(QuizOwner::Training(training_id)).await?;
        let (attempt_number, shown) = self.present(learner_id, &quiz).await?;
        Ok(QuizView::new(&quiz, attempt_number, &shown))
    }

    pub async fn submit_training_quiz(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
        answers: &[SubmittedAnswer],
        meta: &AttemptMeta,
    ) -> EngineResult<QuizSubmissionResult> {
        validate::answers(answers)?;
        let training = self.training(training_id).await?;
        let quiz = self.quiz_for(QuizOwner::Training(training_id)).await?;
        if quiz.questions.is_empty() {
            return Err(EngineError::validation("quiz has no questions"));
        }

        let _guard = self.lock(learner_id, training_id).await;
        let current = self
            .store
            .get_training_progress(learner_id, training_id)
            .await?
            .unwrap_or_else(|| TrainingProgress::new(learner_id, training_id));
        if !self.quiz_unlocked(training.has_video(), current.video_progress_pct) {
            return Err(EngineError::validation(
                "the training video must be watched before taking the quiz",
            ));
        }

        let (attempt_number, grade, passed) =
            self.grade_attempt(learner_id, &quiz, answers, meta).await?;
        self.store
            .record_training_quiz_result(learner_id, training_id, grade.score, passed)
            .await?;
        let shape = self.load_shape(&training).await?;
        let settled = self
            .settle(learner_id, &training, &shape, Rollup::OnFlip)
            .await?
            .checked()?;

        Ok(QuizSubmissionResult {
            quiz_id: quiz.id,
            attempt_number,
            score: grade.score,
            passed,
            xp_earned: settled.xp.as_ref().map_or(0, |a| a.xp),
            progress_pct: settled.after.progress_pct,
            is_completed: settled.after.is_completed,
            results: grade.results,
        })
    }

    pub async fn postpone_training_quiz(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
    ) -> EngineResult<TrainingProgress> {
        self.training(training_id).await?;
        self.quiz_for(QuizOwner::Training(training_id)).await?;
        let _guard = self.lock(learner_id, training_id).await;
        Ok(self
            .store
            .set_quiz_postponed(learner_id, training_id, true)
            .await?)
    }

    /// Stored record, or zero state when the learner has not started.
    pub async fn get_training_progress(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
    ) -> EngineResult<TrainingProgress> {
        self.training(training_id).await?;
        Ok(self
            .store
            .get_training_progress(learner_id, training_id)
            .await?
            .unwrap_or_else(|| TrainingProgress::new(learner_id, training_id)))
    }

    // --- sub-unit operations ---

    pub async fn record_sub_unit_watch(
        &self,
        learner_id: Uuid,
        sub_unit_id: Uuid,
        watched_seconds: f64,
    ) -> EngineResult<SubUnitWatchResult> {
        let seconds = validate::watched_seconds(watched_seconds)?;
        let sub_unit = self.sub_unit(sub_unit_id).await?;
        let Some(duration) = sub_unit.video_duration_seconds.filter(|d| *d > 0) else {
            return Err(EngineError::validation("sub-unit has no video"));
        };
        let training = self.training(sub_unit.training_id).await?;
        let has_quiz = self
            .store
            .get_quiz_for(QuizOwner::SubUnit(sub_unit_id))
            .await?
            .is_some();
        let seconds = seconds.min(i64::from(duration));
        let pct = progress::video_pct(seconds, duration);
        // video alone completes a sub-unit only when it has no quiz
        let completes = !has_quiz && pct >= 100.0;

        let _guard = self.lock(learner_id, training.id).await;
        let sub_progress = self
            .store
            .record_sub_unit_watch(learner_id, &sub_unit, seconds, pct, completes)
            .await?;
        let shape = self.load_shape(&training).await?;
        let settled = self
            .settle(learner_id, &training, &shape, Rollup::OnFlip)
            .await?
            .checked()?;

        let sub_shape = SubUnitShape {
            sub_unit_id,
            has_video: true,
            has_quiz,
        };
        Ok(SubUnitWatchResult {
            video_progress_pct: sub_progress.video_progress_pct,
            can_take_quiz: has_quiz && self.quiz_unlocked(true, sub_progress.video_progress_pct),
            sub_unit_pct: score_sub_unit(&sub_shape, &SubUnitSignals::from(&sub_progress)),
            training_progress_pct: settled.after.progress_pct,
        })
    }

    pub async fn get_sub_unit_quiz(
        &self,
        learner_id: Uuid,
        sub_unit_id: Uuid,
    ) -> EngineResult<QuizView> {
        self.sub_unit(sub_unit_id).await?;
        let quiz = self.quiz_for(QuizOwner::SubUnit(sub_unit_id)).await?;
        let (attempt_number, shown) = self.present(learner_id, &quiz).await?;
        Ok(QuizView::new(&quiz, attempt_number, &shown))
    }

    pub async fn submit_sub_unit_quiz(
        &self,
        learner_id: Uuid,
        sub_unit_id: Uuid,
        answers: &[SubmittedAnswer],
        meta: &AttemptMeta,
    ) -> EngineResult<SubUnitQuizResult> {
        validate::answers(answers)?;
        let sub_unit = self.sub_unit(sub_unit_id).await?;
        let training = self.training(sub_unit.training_id).await?;
        let quiz = self.quiz_for(QuizOwner::SubUnit(sub_unit_id)).await?;
        if quiz.questions.is_empty() {
            return Err(EngineError::validation("quiz has no questions"));
        }

        let _guard = self.lock(learner_id, training.id).await;
        let video_pct = self
            .store
            .list_sub_unit_progress(learner_id, training.id)
            .await?
            .into_iter()
            .find(|p| p.sub_unit_id == sub_unit_id)
            .map_or(0.0, |p| p.video_progress_pct);
        if !self.quiz_unlocked(sub_unit.has_video(), video_pct) {
            return Err(EngineError::validation(
                "the sub-unit video must be watched before taking the quiz",
            ));
        }

        let (attempt_number, grade, passed) =
            self.grade_attempt(learner_id, &quiz, answers, meta).await?;
        let sub_progress = self
            .store
            .record_sub_unit_quiz_result(learner_id, &sub_unit, passed)
            .await?;
        let shape = self.load_shape(&training).await?;
        let settled = self
            .settle(learner_id, &training, &shape, Rollup::OnFlip)
            .await?
            .checked()?;

        Ok(SubUnitQuizResult {
            quiz_id: quiz.id,
            attempt_number,
            score: grade.score,
            passed,
            sub_unit_completed: sub_progress.is_completed,
            training_progress_pct: settled.after.progress_pct,
            training_completed: settled.after.is_completed,
            results: grade.results,
        })
    }

    // --- course / learner reads ---

    /// Recomputed from current content on every call; creates the course
    /// record on first use.
    pub async fn get_course_progress(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
    ) -> EngineResult<CourseProgressView> {
        if self.store.get_course(course_id).await?.is_none() {
            return Err(EngineError::not_found("course", course_id));
        }
        let record = course::aggregate(self.store(), learner_id, course_id).await?;
        Ok(CourseProgressView::from(&record))
    }

    pub async fn get_learner_stats(&self, learner_id: Uuid) -> EngineResult<StatsView> {
        let stats = self.store.get_learner_stats(learner_id).await?;
        Ok(stats.map_or(
            StatsView {
                total_xp: 0,
                level: gamification::level_for_xp(0),
            },
            |s| StatsView {
                total_xp: s.total_xp,
                level: s.level,
            },
        ))
    }

    // --- content mutations ---

    pub async fn create_training_quiz(
        &self,
        training_id: Uuid,
        req: &NewQuiz,
    ) -> EngineResult<ContentChangeResult> {
        let questions = validate::new_quiz(req)?;
        self.training(training_id).await?;
        let owner = QuizOwner::Training(training_id);
        if self.store.get_quiz_for(owner).await?.is_some() {
            return Err(EngineError::validation("training already has a quiz"));
        }
        let quiz = self.store.insert_quiz(owner, req, questions).await?;
        tracing::info!(training_id = %training_id, quiz_id = %quiz.id, "training quiz created");
        self.content_changed(training_id, Some(quiz.id)).await
    }

    pub async fn create_sub_unit(
        &self,
        training_id: Uuid,
        req: &NewSubUnit,
    ) -> EngineResult<ContentChangeResult> {
        validate::new_sub_unit(req)?;
        self.training(training_id).await?;
        let sub_unit = self.store.insert_sub_unit(training_id, req).await?;
        tracing::info!(training_id = %training_id, sub_unit_id = %sub_unit.id, "sub-unit created");
        self.content_changed(training_id, Some(sub_unit.id)).await
    }

    pub async fn create_sub_unit_quiz(
        &self,
        sub_unit_id: Uuid,
        req: &NewQuiz,
    ) -> EngineResult<ContentChangeResult> {
        let questions = validate::new_quiz(req)?;
        let sub_unit = self.sub_unit(sub_unit_id).await?;
        let owner = QuizOwner::SubUnit(sub_unit_id);
        if self.store.get_quiz_for(owner).await?.is_some() {
            return Err(EngineError::validation("sub-unit already has a quiz"));
        }
        let quiz = self.store.insert_quiz(owner, req, questions).await?;
        tracing::info!(sub_unit_id = %sub_unit_id, quiz_id = %quiz.id, "sub-unit quiz created");
        self.content_changed(sub_unit.training_id, Some(quiz.id)).await
    }

    pub async fn delete_quiz(&self, quiz_id: Uuid) -> EngineResult<ContentChangeResult> {
        let quiz = self
            .store
            .get_quiz(quiz_id)
            .await?
            .ok_or(EngineError::not_found("quiz", quiz_id))?;
        let training_id = match quiz.owner {
            QuizOwner::Training(id) => id,
            QuizOwner::SubUnit(id) => self.sub_unit(id).await?.training_id,
        };
        self.store.delete_quiz(quiz_id).await?;
        tracing::info!(training_id = %training_id, quiz_id = %quiz_id, "quiz deleted");
        self.content_changed(training_id, None).await
    }

    pub async fn delete_sub_unit(&self, sub_unit_id: Uuid) -> EngineResult<ContentChangeResult> {
        let sub_unit = self.sub_unit(sub_unit_id).await?;
        self.store.delete_sub_unit(sub_unit_id).await?;
        tracing::info!(
            training_id = %sub_unit.training_id,
            sub_unit_id = %sub_unit_id,
            "sub-unit deleted"
        );
        self.content_changed(sub_unit.training_id, None).await
    }

    /// Re-run the recalculation for a training, e.g. to pick up learners
    /// that failed in an earlier pass.
    pub async fn recalculate_training(&self, training_id: Uuid) -> EngineResult<ContentChangeResult> {
        self.content_changed(training_id, None).await
    }

    async fn content_changed(
        &self,
        training_id: Uuid,
        created_id: Option<Uuid>,
    ) -> EngineResult<ContentChangeResult> {
        let report: RecalculationReport = self.on_content_graph_changed(training_id).await?;
        Ok(ContentChangeResult {
            created_id,
            affected_learners: report.demoted.clone(),
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::models::Course;
    use crate::notify::LogNotifier;
    use crate::store::MemoryStore;

    async fn setup(with_video: bool) -> (Arc<LearningEngine>, Training) {
        let store = Arc::new(MemoryStore::new());
        let course = Course {
            id: Uuid::new_v4(),
            title: "Warehouse".into(),
            created_at: Utc::now(),
        };
        let training = Training {
            id: Uuid::new_v4(),
            course_id: course.id,
            title: "Forklifts".into(),
            video_url: None,
            video_duration_seconds: with_video.then_some(200),
            total_xp: 120,
            is_published: true,
            created_at: Utc::now(),
        };
        store.add_course(course).await;
        store.add_training(training.clone()).await;
        let engine = LearningEngine::new(store, Arc::new(LogNotifier), EngineSettings::default());
        (Arc::new(engine), training)
    }

    fn two_question_quiz() -> NewQuiz {
        NewQuiz {
            title: "Forklift check".into(),
            passing_score: 50,
            questions_per_attempt: None,
            shuffle_options: false,
            questions: json!([
                {"id": "a", "text": "Max load?", "options": ["1t", "2t"], "correct_answer": 1},
                {"id": "b", "text": "Seatbelt?", "options": ["yes", "no"], "correct_answer": 0}
            ]),
        }
    }

    fn answer(id: &str, selected: usize) -> SubmittedAnswer {
        SubmittedAnswer {
            question_id: id.into(),
            selected: Some(selected),
        }
    }

    #[tokio::test]
    async fn quiz_is_locked_until_video_is_mostly_watched() {
        let (engine, training) = setup(true).await;
        engine.create_training_quiz(training.id, &two_question_quiz()).await.unwrap();
        let learner = Uuid::new_v4();

        let early = engine
            .submit_training_quiz(learner, training.id, &[answer("a", 1)], &AttemptMeta::default())
            .await;
        assert_matches!(early, Err(EngineError::Validation(_)));

        let watch = engine.record_watch_progress(learner, training.id, 170.0).await.unwrap();
        assert_eq!(watch.video_progress_pct, 85.0);
        assert!(!watch.can_take_quiz);

        let watch = engine.record_watch_progress(learner, training.id, 180.0).await.unwrap();
        assert_eq!(watch.video_progress_pct, 90.0);
        assert!(watch.can_take_quiz);
        assert_eq!(watch.progress_pct, 45.0);
    }

    #[tokio::test]
    async fn passing_the_quiz_completes_training_and_course() {
        let (engine, training) = setup(true).await;
        engine.create_training_quiz(training.id, &two_question_quiz()).await.unwrap();
        let learner = Uuid::new_v4();
        engine.record_watch_progress(learner, training.id, 200.0).await.unwrap();

        let failed = engine
            .submit_training_quiz(learner, training.id, &[answer("a", 0)], &AttemptMeta::default())
            .await
            .unwrap();
        assert_eq!(failed.attempt_number, 1);
        assert_eq!(failed.score, 0.0);
        assert!(!failed.passed);
        assert_eq!(failed.progress_pct, 50.0);
        assert_eq!(failed.xp_earned, 0);

        let passed = engine
            .submit_training_quiz(
                learner,
                training.id,
                &[answer("a", 1), answer("b", 0)],
                &AttemptMeta::default(),
            )
            .await
            .unwrap();
        assert_eq!(passed.attempt_number, 2);
        assert_eq!(passed.score, 100.0);
        assert!(passed.is_completed);
        assert_eq!(passed.xp_earned, 120);

        let course = engine.get_course_progress(learner, training.course_id).await.unwrap();
        assert_eq!(course.progress_pct, 100.0);
        assert!(course.is_completed);
        assert_eq!(course.completed_trainings, 1);

        let stats = engine.get_learner_stats(learner).await.unwrap();
        assert_eq!(stats.total_xp, 120);
        assert_eq!(stats.level, 2);
    }

    #[tokio::test]
    async fn a_later_failed_attempt_keeps_the_pass() {
        let (engine, training) = setup(false).await;
        engine.create_training_quiz(training.id, &two_question_quiz()).await.unwrap();
        let learner = Uuid::new_v4();
        let meta = AttemptMeta::default();

        let first = engine
            .submit_training_quiz(learner, training.id, &[answer("a", 1), answer("b", 1)], &meta)
            .await
            .unwrap();
        assert_eq!(first.score, 50.0);
        assert!(first.passed);
        assert_eq!(first.xp_earned, 60);

        let second = engine
            .submit_training_quiz(learner, training.id, &[], &meta)
            .await
            .unwrap();
        assert!(!second.passed);
        assert!(second.is_completed);
        assert_eq!(second.xp_earned, 0);

        let p = engine.get_training_progress(learner, training.id).await.unwrap();
        assert!(p.quiz_completed);
        assert_eq!(p.quiz_score, Some(50.0));
    }

    #[tokio::test]
    async fn postponing_is_cleared_by_the_next_submission() {
        let (engine, training) = setup(false).await;
        engine.create_training_quiz(training.id, &two_question_quiz()).await.unwrap();
        let learner = Uuid::new_v4();

        let p = engine.postpone_training_quiz(learner, training.id).await.unwrap();
        assert!(p.quiz_postponed);

        engine
            .submit_training_quiz(learner, training.id, &[answer("a", 1)], &AttemptMeta::default())
            .await
            .unwrap();
        let p = engine.get_training_progress(learner, training.id).await.unwrap();
        assert!(!p.quiz_postponed);
    }

    #[tokio::test]
    async fn quiz_view_is_stable_within_an_attempt() {
        let (engine, training) = setup(false).await;
        engine.create_training_quiz(training.id, &two_question_quiz()).await.unwrap();
        let learner = Uuid::new_v4();

        let first = engine.get_training_quiz(learner, training.id).await.unwrap();
        let again = engine.get_training_quiz(learner, training.id).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(first.attempt_number, 1);
        assert_eq!(first.questions.len(), 2);
    }

    #[tokio::test]
    async fn unknown_content_and_fresh_learners() {
        let (engine, training) = setup(true).await;
        let learner = Uuid::new_v4();

        assert_matches!(
            engine.record_watch_progress(learner, Uuid::new_v4(), 10.0).await,
            Err(EngineError::NotFound { entity: "training", .. })
        );
        assert_matches!(
            engine.get_course_progress(learner, Uuid::new_v4()).await,
            Err(EngineError::NotFound { entity: "course", .. })
        );
        assert_matches!(
            engine.get_training_quiz(learner, training.id).await,
            Err(EngineError::NotFound { entity: "quiz", .. })
        );

        let p = engine.get_training_progress(learner, training.id).await.unwrap();
        assert_eq!(p.progress_pct, 0.0);
        assert!(!p.is_completed);

        let stats = engine.get_learner_stats(learner).await.unwrap();
        assert_eq!((stats.total_xp, stats.level), (0, 1));
    }

    #[tokio::test]
    async fn duplicate_training_quiz_is_rejected() {
        let (engine, training) = setup(true).await;
        engine.create_training_quiz(training.id, &two_question_quiz()).await.unwrap();
        assert_matches!(
            engine.create_training_quiz(training.id, &two_question_quiz()).await,
            Err(EngineError::Validation(_))
        );
    }

    #[tokio::test]
    async fn concurrent_watch_updates_keep_the_maximum() {
        let (engine, training) = setup(true).await;
        let learner = Uuid::new_v4();

        let handles: Vec<_> = (1..=20)
            .map(|i| {
                let engine = engine.clone();
                let training_id = training.id;
                tokio::spawn(async move {
                    engine
                        .record_watch_progress(learner, training_id, f64::from(i * 10))
                        .await
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let p = engine.get_training_progress(learner, training.id).await.unwrap();
        assert_eq!(p.video_progress_pct, 100.0);
        assert!(p.is_completed);
        assert_eq!(engine.get_learner_stats(learner).await.unwrap().total_xp, 60);
    }
}
