//! In-process store used by tests and by the binary when no database is
//! configured. Every trait method runs under a single write or read guard,
//! which gives the same per-call atomicity as the Postgres upserts.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{LevelFn, ProgressStore, StoreError, StoreResult};
use crate::models::{
    Course, CourseProgress, LearnerStats, NewQuiz, NewQuizAttempt, NewSubUnit, QuizAttempt,
    SubUnit, SubUnitProgress, Training, TrainingProgress,
};
use crate::quiz::{Question, Quiz, QuizOwner};

type Key = (Uuid, Uuid);

#[derive(Default)]
struct State {
    courses: HashMap<Uuid, Course>,
    trainings: HashMap<Uuid, Training>,
    sub_units: HashMap<Uuid, SubUnit>,
    quizzes: HashMap<Uuid, Quiz>,
    training_progress: HashMap<Key, TrainingProgress>,
    sub_unit_progress: HashMap<Key, SubUnitProgress>,
    course_progress: HashMap<Key, CourseProgress>,
    attempts: Vec<QuizAttempt>,
    stats: HashMap<Uuid, LearnerStats>,
    xp_awards: HashSet<Key>,
    failing_learners: HashSet<Uuid>,
    failing_course_learners: HashSet<Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_course(&self, course: Course) {
        self.state.write().await.courses.insert(course.id, course);
    }

    pub async fn add_training(&self, training: Training) {
        self.state.write().await.trainings.insert(training.id, training);
    }

    /// Make derived-field writes for `learner_id` fail, to exercise batch
    /// isolation.
    pub async fn fail_writes_for(&self, learner_id: Uuid) {
        self.state.write().await.failing_learners.insert(learner_id);
    }

    /// Make course record writes for `learner_id` fail.
    pub async fn fail_course_writes_for(&self, learner_id: Uuid) {
        self.state.write().await.failing_course_learners.insert(learner_id);
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.write().await;
        state.failing_learners.clear();
        state.failing_course_learners.clear();
    }

    pub async fn attempts_for(&self, learner_id: Uuid, quiz_id: Uuid) -> Vec<QuizAttempt> {
        self.state
            .read()
            .await
            .attempts
            .iter()
            .filter(|a| a.learner_id == learner_id && a.quiz_id == quiz_id)
            .cloned()
            .collect()
    }
}

impl State {
    fn training_progress_entry(&mut self, learner_id: Uuid, training_id: Uuid) -> &mut TrainingProgress {
        self.training_progress
            .entry((learner_id, training_id))
            .or_insert_with(|| TrainingProgress::new(learner_id, training_id))
    }

    fn sub_unit_progress_entry(&mut self, learner_id: Uuid, sub_unit: &SubUnit) -> &mut SubUnitProgress {
        self.sub_unit_progress
            .entry((learner_id, sub_unit.id))
            .or_insert_with(|| SubUnitProgress::new(learner_id, sub_unit.id, sub_unit.training_id))
    }
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn get_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        Ok(self.state.read().await.courses.get(&id).cloned())
    }

    async fn get_training(&self, id: Uuid) -> StoreResult<Option<Training>> {
        Ok(self.state.read().await.trainings.get(&id).cloned())
    }

    async fn list_published_trainings(&self, course_id: Uuid) -> StoreResult<Vec<Training>> {
        let state = self.state.read().await;
        let mut out: Vec<Training> = state
            .trainings
            .values()
            .filter(|t| t.course_id == course_id && t.is_published)
            .cloned()
            .collect();
        out.sort_by_key(|t| (t.created_at, t.id));
        Ok(out)
    }

    async fn list_sub_units(&self, training_id: Uuid) -> StoreResult<Vec<SubUnit>> {
        let state = self.state.read().await;
        let mut out: Vec<SubUnit> = state
            .sub_units
            .values()
            .filter(|s| s.training_id == training_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| (s.position, s.created_at, s.id));
        Ok(out)
    }

    async fn get_sub_unit(&self, id: Uuid) -> StoreResult<Option<SubUnit>> {
        Ok(self.state.read().await.sub_units.get(&id).cloned())
    }

    async fn get_quiz(&self, id: Uuid) -> StoreResult<Option<Quiz>> {
        Ok(self.state.read().await.quizzes.get(&id).cloned())
    }

    async fn get_quiz_for(&self, owner: QuizOwner) -> StoreResult<Option<Quiz>> {
        Ok(self
            .state
            .read()
            .await
            .quizzes
            .values()
            .find(|q| q.owner == owner)
            .cloned())
    }

    async fn sub_units_with_quiz(&self, training_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let state = self.state.read().await;
        Ok(state
            .quizzes
            .values()
            .filter_map(|q| match q.owner {
                QuizOwner::SubUnit(id) => state
                    .sub_units
                    .get(&id)
                    .filter(|s| s.training_id == training_id)
                    .map(|s| s.id),
                QuizOwner::Training(_) => None,
            })
            .collect())
    }

    async fn insert_quiz(
        &self,
        owner: QuizOwner,
        quiz: &NewQuiz,
        questions: Vec<Question>,
    ) -> StoreResult<Quiz> {
        let mut state = self.state.write().await;
        let record = Quiz {
            id: Uuid::new_v4(),
            owner,
            title: quiz.title.clone(),
            passing_score: quiz.passing_score,
            questions_per_attempt: quiz
                .questions_per_attempt
                .and_then(|k| usize::try_from(k).ok()),
            shuffle_options: quiz.shuffle_options,
            questions,
        };
        if let QuizOwner::SubUnit(sub_unit_id) = owner {
            for p in state.sub_unit_progress.values_mut() {
                if p.sub_unit_id == sub_unit_id {
                    p.is_completed = false;
                    p.quiz_completed = false;
                }
            }
        }
        state.quizzes.insert(record.id, record.clone());
        Ok(record)
    }

    async fn delete_quiz(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let Some(quiz) = state.quizzes.remove(&id) else {
            return Ok(false);
        };
        match quiz.owner {
            QuizOwner::Training(training_id) => {
                for p in state.training_progress.values_mut() {
                    if p.training_id == training_id {
                        p.quiz_completed = false;
                        p.quiz_score = None;
                        p.quiz_postponed = false;
                    }
                }
            }
            QuizOwner::SubUnit(sub_unit_id) => {
                for p in state.sub_unit_progress.values_mut() {
                    if p.sub_unit_id == sub_unit_id {
                        p.quiz_completed = false;
                        p.is_completed = p.video_progress_pct >= 100.0;
                    }
                }
            }
        }
        Ok(true)
    }

    async fn insert_sub_unit(&self, training_id: Uuid, sub_unit: &NewSubUnit) -> StoreResult<SubUnit> {
        let mut state = self.state.write().await;
        let position = sub_unit.position.unwrap_or_else(|| {
            state
                .sub_units
                .values()
                .filter(|s| s.training_id == training_id)
                .map(|s| s.position + 1)
                .max()
                .unwrap_or(0)
        });
        let record = SubUnit {
            id: Uuid::new_v4(),
            training_id,
            title: sub_unit.title.clone(),
            video_url: sub_unit.video_url.clone(),
            video_duration_seconds: sub_unit.video_duration_seconds,
            position,
            created_at: Utc::now(),
        };
        state.sub_units.insert(record.id, record.clone());
        Ok(record)
    }

    async fn delete_sub_unit(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.sub_units.remove(&id).is_none() {
            return Ok(false);
        }
        state.quizzes.retain(|_, q| q.owner != QuizOwner::SubUnit(id));
        state.sub_unit_progress.retain(|(_, su), _| *su != id);
        Ok(true)
    }

    async fn get_training_progress(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
    ) -> StoreResult<Option<TrainingProgress>> {
        Ok(self
            .state
            .read()
            .await
            .training_progress
            .get(&(learner_id, training_id))
            .cloned())
    }

    async fn get_or_create_training_progress(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
    ) -> StoreResult<TrainingProgress> {
        let mut state = self.state.write().await;
        Ok(state.training_progress_entry(learner_id, training_id).clone())
    }

    async fn list_training_progress(&self, training_id: Uuid) -> StoreResult<Vec<TrainingProgress>> {
        let state = self.state.read().await;
        let mut out: Vec<TrainingProgress> = state
            .training_progress
            .values()
            .filter(|p| p.training_id == training_id)
            .cloned()
            .collect();
        out.sort_by_key(|p| p.learner_id);
        Ok(out)
    }

    async fn list_learner_progress_in_course(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Vec<TrainingProgress>> {
        let state = self.state.read().await;
        Ok(state
            .training_progress
            .values()
            .filter(|p| {
                p.learner_id == learner_id
                    && state
                        .trainings
                        .get(&p.training_id)
                        .is_some_and(|t| t.course_id == course_id)
            })
            .cloned()
            .collect())
    }

    async fn record_training_watch(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
        watched_seconds: i64,
        video_progress_pct: f64,
    ) -> StoreResult<TrainingProgress> {
        let mut state = self.state.write().await;
        let p = state.training_progress_entry(learner_id, training_id);
        p.video_watched_seconds = p.video_watched_seconds.max(watched_seconds);
        p.video_progress_pct = p.video_progress_pct.max(video_progress_pct);
        p.updated_at = Utc::now();
        Ok(p.clone())
    }

    async fn record_training_quiz_result(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
        score: f64,
        passed: bool,
    ) -> StoreResult<TrainingProgress> {
        let mut state = self.state.write().await;
        let p = state.training_progress_entry(learner_id, training_id);
        p.quiz_completed = p.quiz_completed || passed;
        p.quiz_score = Some(p.quiz_score.map_or(score, |s| s.max(score)));
        p.quiz_postponed = false;
        p.updated_at = Utc::now();
        Ok(p.clone())
    }

    async fn set_quiz_postponed(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
        postponed: bool,
    ) -> StoreResult<TrainingProgress> {
        let mut state = self.state.write().await;
        let p = state.training_progress_entry(learner_id, training_id);
        p.quiz_postponed = postponed;
        p.updated_at = Utc::now();
        Ok(p.clone())
    }

    async fn save_training_outcome(&self, record: &TrainingProgress) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.failing_learners.contains(&record.learner_id) {
            return Err(StoreError::Unavailable(format!(
                "write rejected for learner {}",
                record.learner_id
            )));
        }
        let p = state.training_progress_entry(record.learner_id, record.training_id);
        p.progress_pct = record.progress_pct;
        p.is_completed = record.is_completed;
        p.completed_at = record.completed_at;
        p.sub_units_completed = record.sub_units_completed;
        p.sub_units_total = record.sub_units_total;
        p.updated_at = Utc::now();
        Ok(())
    }

    async fn list_sub_unit_progress(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
    ) -> StoreResult<Vec<SubUnitProgress>> {
        let state = self.state.read().await;
        Ok(state
            .sub_unit_progress
            .values()
            .filter(|p| p.learner_id == learner_id && p.training_id == training_id)
            .cloned()
            .collect())
    }

    async fn record_sub_unit_watch(
        &self,
        learner_id: Uuid,
        sub_unit: &SubUnit,
        watched_seconds: i64,
        video_progress_pct: f64,
        completes: bool,
    ) -> StoreResult<SubUnitProgress> {
        let mut state = self.state.write().await;
        let p = state.sub_unit_progress_entry(learner_id, sub_unit);
        p.video_watched_seconds = p.video_watched_seconds.max(watched_seconds);
        p.video_progress_pct = p.video_progress_pct.max(video_progress_pct);
        p.is_completed = p.is_completed || completes;
        p.updated_at = Utc::now();
        Ok(p.clone())
    }

    async fn record_sub_unit_quiz_result(
        &self,
        learner_id: Uuid,
        sub_unit: &SubUnit,
        passed: bool,
    ) -> StoreResult<SubUnitProgress> {
        let mut state = self.state.write().await;
        let p = state.sub_unit_progress_entry(learner_id, sub_unit);
        p.quiz_completed = p.quiz_completed || passed;
        p.is_completed = p.is_completed || passed;
        p.updated_at = Utc::now();
        Ok(p.clone())
    }

    async fn get_course_progress(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<CourseProgress>> {
        Ok(self
            .state
            .read()
            .await
            .course_progress
            .get(&(learner_id, course_id))
            .cloned())
    }

    async fn save_course_progress(&self, record: &CourseProgress) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.failing_course_learners.contains(&record.learner_id) {
            return Err(StoreError::Unavailable(format!(
                "course write rejected for learner {}",
                record.learner_id
            )));
        }
        let mut record = record.clone();
        record.updated_at = Utc::now();
        state
            .course_progress
            .insert((record.learner_id, record.course_id), record);
        Ok(())
    }

    async fn count_quiz_attempts(&self, learner_id: Uuid, quiz_id: Uuid) -> StoreResult<i64> {
        let state = self.state.read().await;
        Ok(state
            .attempts
            .iter()
            .filter(|a| a.learner_id == learner_id && a.quiz_id == quiz_id)
            .count() as i64)
    }

    async fn insert_quiz_attempt(&self, attempt: &NewQuizAttempt) -> StoreResult<QuizAttempt> {
        let mut state = self.state.write().await;
        let record = QuizAttempt {
            id: Uuid::new_v4(),
            learner_id: attempt.learner_id,
            quiz_id: attempt.quiz_id,
            attempt_number: attempt.attempt_number,
            score: attempt.score,
            answers: sqlx::types::Json(attempt.answers.clone()),
            started_at: attempt.started_at,
            completed_at: Utc::now(),
            time_spent_seconds: attempt.time_spent_seconds,
            passed: attempt.passed,
        };
        state.attempts.push(record.clone());
        Ok(record)
    }

    async fn get_learner_stats(&self, learner_id: Uuid) -> StoreResult<Option<LearnerStats>> {
        Ok(self.state.read().await.stats.get(&learner_id).cloned())
    }

    async fn award_xp(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
        xp: i64,
        level_of: LevelFn,
    ) -> StoreResult<Option<LearnerStats>> {
        let mut state = self.state.write().await;
        if !state.xp_awards.insert((learner_id, training_id)) {
            return Ok(None);
        }
        let stats = state
            .stats
            .entry(learner_id)
            .or_insert_with(|| LearnerStats::new(learner_id));
        stats.total_xp += xp;
        stats.level = level_of(stats.total_xp);
        stats.updated_at = Utc::now();
        Ok(Some(stats.clone()))
    }
}
