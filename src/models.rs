use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use uuid::Uuid;

use crate::quiz::QuestionResult;
use crate::recalc::RecalculationReport;

// --- content graph ---

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Training {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub video_url: Option<String>,
    pub video_duration_seconds: Option<i32>,
    pub total_xp: i32,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
}

impl Training {
    pub fn has_video(&self) -> bool {
        matches!(self.video_duration_seconds, Some(d) if d > 0)
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct SubUnit {
    pub id: Uuid,
    pub training_id: Uuid,
    pub title: String,
    pub video_url: Option<String>,
    pub video_duration_seconds: Option<i32>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl SubUnit {
    pub fn has_video(&self) -> bool {
        matches!(self.video_duration_seconds, Some(d) if d > 0)
    }
}

/// Quiz row as stored; `questions` is raw JSON until normalized in `quiz`.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct QuizRow {
    pub id: Uuid,
    pub training_id: Option<Uuid>,
    pub sub_unit_id: Option<Uuid>,
    pub title: String,
    pub passing_score: i32,
    pub questions_per_attempt: Option<i32>,
    pub shuffle_options: bool,
    pub questions: sqlx::types::Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewSubUnit {
    pub title: String,
    pub video_url: Option<String>,
    pub video_duration_seconds: Option<i32>,
    pub position: Option<i32>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewQuiz {
    pub title: String,
    pub passing_score: i32,
    pub questions_per_attempt: Option<i32>,
    #[serde(default)]
    pub shuffle_options: bool,
    pub questions: serde_json::Value,
}

// --- learner state ---

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrainingProgress {
    pub learner_id: Uuid,
    pub training_id: Uuid,
    pub video_progress_pct: f64,
    pub video_watched_seconds: i64,
    pub quiz_completed: bool,
    pub quiz_score: Option<f64>,
    pub quiz_postponed: bool,
    pub sub_units_completed: i32,
    pub sub_units_total: i32,
    pub progress_pct: f64,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TrainingProgress {
    /// Zero state for a learner who has not started the training.
    pub fn new(learner_id: Uuid, training_id: Uuid) -> Self {
        Self {
            learner_id,
            training_id,
            video_progress_pct: 0.0,
            video_watched_seconds: 0,
            quiz_completed: false,
            quiz_score: None,
            quiz_postponed: false,
            sub_units_completed: 0,
            sub_units_total: 0,
            progress_pct: 0.0,
            is_completed: false,
            completed_at: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubUnitProgress {
    pub learner_id: Uuid,
    pub sub_unit_id: Uuid,
    pub training_id: Uuid,
    pub video_progress_pct: f64,
    pub video_watched_seconds: i64,
    pub quiz_completed: bool,
    pub is_completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl SubUnitProgress {
    pub fn new(learner_id: Uuid, sub_unit_id: Uuid, training_id: Uuid) -> Self {
        Self {
            learner_id,
            sub_unit_id,
            training_id,
            video_progress_pct: 0.0,
            video_watched_seconds: 0,
            quiz_completed: false,
            is_completed: false,
            updated_at: Utc::now(),
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CourseProgress {
    pub learner_id: Uuid,
    pub course_id: Uuid,
    pub progress_pct: f64,
    pub completed_trainings: i32,
    pub total_trainings: i32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl CourseProgress {
    pub fn new(learner_id: Uuid, course_id: Uuid) -> Self {
        Self {
            learner_id,
            course_id,
            progress_pct: 0.0,
            completed_trainings: 0,
            total_trainings: 0,
            is_completed: false,
            completed_at: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct QuizAttempt {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub quiz_id: Uuid,
    pub attempt_number: i32,
    pub score: f64,
    pub answers: sqlx::types::Json<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub time_spent_seconds: i32,
    pub passed: bool,
}

#[derive(Debug, Clone)]
pub struct NewQuizAttempt {
    pub learner_id: Uuid,
    pub quiz_id: Uuid,
    pub attempt_number: i32,
    pub score: f64,
    pub answers: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub time_spent_seconds: i32,
    pub passed: bool,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LearnerStats {
    pub learner_id: Uuid,
    pub total_xp: i64,
    pub level: i32,
    pub updated_at: DateTime<Utc>,
}

impl LearnerStats {
    pub fn new(learner_id: Uuid) -> Self {
        Self {
            learner_id,
            total_xp: 0,
            level: 1,
            updated_at: Utc::now(),
        }
    }
}

// --- requests / responses ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WatchProgressReq {
    pub watched_seconds: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WatchProgressResult {
    pub video_progress_pct: f64,
    pub can_take_quiz: bool,
    pub progress_pct: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubUnitWatchResult {
    pub video_progress_pct: f64,
    pub can_take_quiz: bool,
    pub sub_unit_pct: f64,
    pub training_progress_pct: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub selected: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AttemptMeta {
    pub started_at: Option<DateTime<Utc>>,
    pub time_spent_seconds: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmitQuizReq {
    pub answers: Vec<SubmittedAnswer>,
    #[serde(flatten)]
    pub meta: AttemptMeta,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QuizSubmissionResult {
    pub quiz_id: Uuid,
    pub attempt_number: i32,
    pub score: f64,
    pub passed: bool,
    pub xp_earned: i64,
    pub progress_pct: f64,
    pub is_completed: bool,
    pub results: Vec<QuestionResult>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubUnitQuizResult {
    pub quiz_id: Uuid,
    pub attempt_number: i32,
    pub score: f64,
    pub passed: bool,
    pub sub_unit_completed: bool,
    pub training_progress_pct: f64,
    pub training_completed: bool,
    pub results: Vec<QuestionResult>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CourseProgressView {
    pub course_id: Uuid,
    pub progress_pct: f64,
    pub is_completed: bool,
    pub completed_trainings: i32,
    pub total_trainings: i32,
}

impl From<&CourseProgress> for CourseProgressView {
    fn from(p: &CourseProgress) -> Self {
        Self {
            course_id: p.course_id,
            progress_pct: p.progress_pct,
            is_completed: p.is_completed,
            completed_trainings: p.completed_trainings,
            total_trainings: p.total_trainings,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatsView {
    pub total_xp: i64,
    pub level: i32,
}

#[skip_serializing_none]
#[derive(Serialize, Debug, Clone)]
pub struct ContentChangeResult {
    pub created_id: Option<Uuid>,
    pub affected_learners: Vec<Uuid>,
    pub report: RecalculationReport,
}
