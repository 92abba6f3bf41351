//! Keyed persistence for content and learner state.
//!
//! Raw-signal writes (`record_*`) are single atomic upserts that never move a
//! value backwards. Derived fields are written separately by
//! [`ProgressStore::save_training_outcome`] so a recompute cannot clobber a
//! signal written concurrently.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Course, CourseProgress, LearnerStats, NewQuiz, NewQuizAttempt, NewSubUnit, QuizAttempt,
    SubUnit, SubUnitProgress, Training, TrainingProgress,
};
use crate::quiz::{Question, Quiz, QuizOwner};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("quiz {quiz_id} has invalid content: {reason}")]
    InvalidQuizContent { quiz_id: Uuid, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Level derivation passed into [`ProgressStore::award_xp`].
pub type LevelFn = fn(i64) -> i32;

#[async_trait]
pub trait ProgressStore: Send + Sync {
    // --- content graph ---

    async fn get_course(&self, id: Uuid) -> StoreResult<Option<Course>>;
    async fn get_training(&self, id: Uuid) -> StoreResult<Option<Training>>;
    async fn list_published_trainings(&self, course_id: Uuid) -> StoreResult<Vec<Training>>;
    /// Ordered by position.
    async fn list_sub_units(&self, training_id: Uuid) -> StoreResult<Vec<SubUnit>>;
    async fn get_sub_unit(&self, id: Uuid) -> StoreResult<Option<SubUnit>>;
    async fn get_quiz(&self, id: Uuid) -> StoreResult<Option<Quiz>>;
    async fn get_quiz_for(&self, owner: QuizOwner) -> StoreResult<Option<Quiz>>;
    /// Ids of this training's sub-units that currently own a quiz.
    async fn sub_units_with_quiz(&self, training_id: Uuid) -> StoreResult<Vec<Uuid>>;
    /// `questions` must already be normalized from `quiz.questions`.
    async fn insert_quiz(
        &self,
        owner: QuizOwner,
        quiz: &NewQuiz,
        questions: Vec<Question>,
    ) -> StoreResult<Quiz>;
    /// Learners' pass flags for the removed quiz are cleared so a later quiz
    /// on the same owner starts fresh.
    async fn delete_quiz(&self, id: Uuid) -> StoreResult<bool>;
    async fn insert_sub_unit(&self, training_id: Uuid, sub_unit: &NewSubUnit) -> StoreResult<SubUnit>;
    /// Also removes the sub-unit's quiz and every learner's progress on it.
    async fn delete_sub_unit(&self, id: Uuid) -> StoreResult<bool>;

    // --- training progress ---

    async fn get_training_progress(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
    ) -> StoreResult<Option<TrainingProgress>>;
    /// Inserts [`TrainingProgress::new`] if the learner has no record yet.
    async fn get_or_create_training_progress(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
    ) -> StoreResult<TrainingProgress>;
    async fn list_training_progress(&self, training_id: Uuid) -> StoreResult<Vec<TrainingProgress>>;
    async fn list_learner_progress_in_course(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Vec<TrainingProgress>>;
    /// Keeps the larger of the stored and given values.
    async fn record_training_watch(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
        watched_seconds: i64,
        video_progress_pct: f64,
    ) -> StoreResult<TrainingProgress>;
    /// Latches `quiz_completed` once passed, keeps the best score and clears
    /// the postponed flag.
    async fn record_training_quiz_result(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
        score: f64,
        passed: bool,
    ) -> StoreResult<TrainingProgress>;
    async fn set_quiz_postponed(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
        postponed: bool,
    ) -> StoreResult<TrainingProgress>;
    /// Writes only the derived columns of `record`.
    async fn save_training_outcome(&self, record: &TrainingProgress) -> StoreResult<()>;

    // --- sub-unit progress ---

    async fn list_sub_unit_progress(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
    ) -> StoreResult<Vec<SubUnitProgress>>;
    async fn record_sub_unit_watch(
        &self,
        learner_id: Uuid,
        sub_unit: &SubUnit,
        watched_seconds: i64,
        video_progress_pct: f64,
        completes: bool,
    ) -> StoreResult<SubUnitProgress>;
    async fn record_sub_unit_quiz_result(
        &self,
        learner_id: Uuid,
        sub_unit: &SubUnit,
        passed: bool,
    ) -> StoreResult<SubUnitProgress>;

    // --- course progress ---

    async fn get_course_progress(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<CourseProgress>>;
    async fn save_course_progress(&self, record: &CourseProgress) -> StoreResult<()>;

    // --- quiz attempts ---

    async fn count_quiz_attempts(&self, learner_id: Uuid, quiz_id: Uuid) -> StoreResult<i64>;
    async fn insert_quiz_attempt(&self, attempt: &NewQuizAttempt) -> StoreResult<QuizAttempt>;

    // --- gamification ---

    async fn get_learner_stats(&self, learner_id: Uuid) -> StoreResult<Option<LearnerStats>>;
    /// Adds `xp` and re-derives the level, at most once per
    /// (learner, training). Returns `None` if already awarded.
    async fn award_xp(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
        xp: i64,
        level_of: LevelFn,
    ) -> StoreResult<Option<LearnerStats>>;
}
