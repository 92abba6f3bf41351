use async_trait::async_trait;
use uuid::Uuid;

use super::{LevelFn, ProgressStore, StoreResult};
use crate::db::Db;
use crate::models::{
    Course, CourseProgress, LearnerStats, NewQuiz, NewQuizAttempt, NewSubUnit, QuizAttempt,
    QuizRow, SubUnit, SubUnitProgress, Training, TrainingProgress,
};
use crate::quiz::{Question, Quiz, QuizOwner};

const TRAINING_COLUMNS: &str = "id, course_id, title, video_url, video_duration_seconds, \
    total_xp, is_published, created_at";

const SUB_UNIT_COLUMNS: &str =
    "id, training_id, title, video_url, video_duration_seconds, position, created_at";

const QUIZ_COLUMNS: &str = "id, training_id, sub_unit_id, title, passing_score, \
    questions_per_attempt, shuffle_options, questions, created_at";

const TRAINING_PROGRESS_COLUMNS: &str = "learner_id, training_id, video_progress_pct, \
    video_watched_seconds, quiz_completed, quiz_score, quiz_postponed, sub_units_completed, \
    sub_units_total, progress_pct, is_completed, completed_at, updated_at";

const SUB_UNIT_PROGRESS_COLUMNS: &str = "learner_id, sub_unit_id, training_id, \
    video_progress_pct, video_watched_seconds, quiz_completed, is_completed, updated_at";

const COURSE_PROGRESS_COLUMNS: &str = "learner_id, course_id, progress_pct, \
    completed_trainings, total_trainings, is_completed, completed_at, updated_at";

const ATTEMPT_COLUMNS: &str = "id, learner_id, quiz_id, attempt_number, score, answers, \
    started_at, completed_at, time_spent_seconds, passed";

const STATS_COLUMNS: &str = "learner_id, total_xp, level, updated_at";

/// Postgres-backed store. Queries are checked at runtime so the crate
/// builds without a live database.
#[derive(Clone)]
pub struct PgStore {
    pool: Db,
}

impl PgStore {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Db {
        &self.pool
    }
}

fn owner_columns(owner: QuizOwner) -> (Option<Uuid>, Option<Uuid>) {
    match owner {
        QuizOwner::Training(id) => (Some(id), None),
        QuizOwner::SubUnit(id) => (None, Some(id)),
    }
}

#[async_trait]
impl ProgressStore for PgStore {
    async fn get_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        Ok(
            sqlx::query_as::<_, Course>("SELECT id, title, created_at FROM courses WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn get_training(&self, id: Uuid) -> StoreResult<Option<Training>> {
        let query = format!("SELECT {TRAINING_COLUMNS} FROM trainings WHERE id = $1");
        Ok(sqlx::query_as::<_, Training>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_published_trainings(&self, course_id: Uuid) -> StoreResult<Vec<Training>> {
        let query = format!(
            "SELECT {TRAINING_COLUMNS} FROM trainings
             WHERE course_id = $1 AND is_published
             ORDER BY created_at, id"
        );
        Ok(sqlx::query_as::<_, Training>(&query)
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_sub_units(&self, training_id: Uuid) -> StoreResult<Vec<SubUnit>> {
        let query = format!(
            "SELECT {SUB_UNIT_COLUMNS} FROM sub_units
             WHERE training_id = $1
             ORDER BY position, created_at, id"
        );
        Ok(sqlx::query_as::<_, SubUnit>(&query)
            .bind(training_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_sub_unit(&self, id: Uuid) -> StoreResult<Option<SubUnit>> {
        let query = format!("SELECT {SUB_UNIT_COLUMNS} FROM sub_units WHERE id = $1");
        Ok(sqlx::query_as::<_, SubUnit>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_quiz(&self, id: Uuid) -> StoreResult<Option<Quiz>> {
        let query = format!("SELECT {QUIZ_COLUMNS} FROM quizzes WHERE id = $1");
        sqlx::query_as::<_, QuizRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Quiz::try_from)
            .transpose()
    }

    async fn get_quiz_for(&self, owner: QuizOwner) -> StoreResult<Option<Quiz>> {
        let (column, id) = match owner {
            QuizOwner::Training(id) => ("training_id", id),
            QuizOwner::SubUnit(id) => ("sub_unit_id", id),
        };
        let query = format!("SELECT {QUIZ_COLUMNS} FROM quizzes WHERE {column} = $1");
        sqlx::query_as::<_, QuizRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Quiz::try_from)
            .transpose()
    }

    async fn sub_units_with_quiz(&self, training_id: Uuid) -> StoreResult<Vec<Uuid>> {
        Ok(sqlx::query_scalar::<_, Uuid>(
            "SELECT q.sub_unit_id FROM quizzes q
             JOIN sub_units s ON s.id = q.sub_unit_id
             WHERE s.training_id = $1",
        )
        .bind(training_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_quiz(
        &self,
        owner: QuizOwner,
        quiz: &NewQuiz,
        questions: Vec<Question>,
    ) -> StoreResult<Quiz> {
        let (training_id, sub_unit_id) = owner_columns(owner);
        let mut tx = self.pool.begin().await?;
        let query = format!(
            "INSERT INTO quizzes
                (id, training_id, sub_unit_id, title, passing_score,
                 questions_per_attempt, shuffle_options, questions)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {QUIZ_COLUMNS}"
        );
        let row = sqlx::query_as::<_, QuizRow>(&query)
            .bind(Uuid::new_v4())
            .bind(training_id)
            .bind(sub_unit_id)
            .bind(&quiz.title)
            .bind(quiz.passing_score)
            .bind(quiz.questions_per_attempt)
            .bind(quiz.shuffle_options)
            .bind(sqlx::types::Json(&quiz.questions))
            .fetch_one(&mut *tx)
            .await?;
        if let Some(sub_unit_id) = sub_unit_id {
            sqlx::query(
                "UPDATE sub_unit_progress
                 SET quiz_completed = FALSE, is_completed = FALSE, updated_at = now()
                 WHERE sub_unit_id = $1",
            )
            .bind(sub_unit_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(Quiz::from_saved(row, owner, questions))
    }

    async fn delete_quiz(&self, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let owner = sqlx::query_as::<_, (Option<Uuid>, Option<Uuid>)>(
            "DELETE FROM quizzes WHERE id = $1 RETURNING training_id, sub_unit_id",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((training_id, sub_unit_id)) = owner else {
            tx.rollback().await?;
            return Ok(false);
        };
        if let Some(training_id) = training_id {
            sqlx::query(
                "UPDATE training_progress
                 SET quiz_completed = FALSE, quiz_score = NULL, quiz_postponed = FALSE,
                     updated_at = now()
                 WHERE training_id = $1",
            )
            .bind(training_id)
            .execute(&mut *tx)
            .await?;
        }
        if let Some(sub_unit_id) = sub_unit_id {
            sqlx::query(
                "UPDATE sub_unit_progress
                 SET quiz_completed = FALSE, is_completed = (video_progress_pct >= 100),
                     updated_at = now()
                 WHERE sub_unit_id = $1",
            )
            .bind(sub_unit_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn insert_sub_unit(&self, training_id: Uuid, sub_unit: &NewSubUnit) -> StoreResult<SubUnit> {
        let query = format!(
            "INSERT INTO sub_units (id, training_id, title, video_url, video_duration_seconds, position)
             VALUES ($1, $2, $3, $4, $5,
                     COALESCE($6, (SELECT COALESCE(MAX(position) + 1, 0)
                                   FROM sub_units WHERE training_id = $2)))
             RETURNING {SUB_UNIT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, SubUnit>(&query)
            .bind(Uuid::new_v4())
            .bind(training_id)
            .bind(&sub_unit.title)
            .bind(&sub_unit.video_url)
            .bind(sub_unit.video_duration_seconds)
            .bind(sub_unit.position)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn delete_sub_unit(&self, id: Uuid) -> StoreResult<bool> {
        // quizzes and sub_unit_progress cascade
        let result = sqlx::query("DELETE FROM sub_units WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_training_progress(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
    ) -> StoreResult<Option<TrainingProgress>> {
        let query = format!(
            "SELECT {TRAINING_PROGRESS_COLUMNS} FROM training_progress
             WHERE learner_id = $1 AND training_id = $2"
        );
        Ok(sqlx::query_as::<_, TrainingProgress>(&query)
            .bind(learner_id)
            .bind(training_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_or_create_training_progress(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
    ) -> StoreResult<TrainingProgress> {
        let fresh = TrainingProgress::new(learner_id, training_id);
        sqlx::query(
            "INSERT INTO training_progress (learner_id, training_id, video_progress_pct,
                 video_watched_seconds, quiz_completed, quiz_postponed, progress_pct, is_completed)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (learner_id, training_id) DO NOTHING",
        )
        .bind(fresh.learner_id)
        .bind(fresh.training_id)
        .bind(fresh.video_progress_pct)
        .bind(fresh.video_watched_seconds)
        .bind(fresh.quiz_completed)
        .bind(fresh.quiz_postponed)
        .bind(fresh.progress_pct)
        .bind(fresh.is_completed)
        .execute(&self.pool)
        .await?;
        let query = format!(
            "SELECT {TRAINING_PROGRESS_COLUMNS} FROM training_progress
             WHERE learner_id = $1 AND training_id = $2"
        );
        Ok(sqlx::query_as::<_, TrainingProgress>(&query)
            .bind(learner_id)
            .bind(training_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_training_progress(&self, training_id: Uuid) -> StoreResult<Vec<TrainingProgress>> {
        let query = format!(
            "SELECT {TRAINING_PROGRESS_COLUMNS} FROM training_progress
             WHERE training_id = $1
             ORDER BY learner_id"
        );
        Ok(sqlx::query_as::<_, TrainingProgress>(&query)
            .bind(training_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn list_learner_progress_in_course(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Vec<TrainingProgress>> {
        let query = format!(
            "SELECT {} FROM training_progress tp
             JOIN trainings t ON t.id = tp.training_id
             WHERE tp.learner_id = $1 AND t.course_id = $2",
            TRAINING_PROGRESS_COLUMNS
                .split(", ")
                .map(|c| format!("tp.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(sqlx::query_as::<_, TrainingProgress>(&query)
            .bind(learner_id)
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn record_training_watch(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
        watched_seconds: i64,
        video_progress_pct: f64,
    ) -> StoreResult<TrainingProgress> {
        let query = format!(
            "INSERT INTO training_progress
                (learner_id, training_id, video_watched_seconds, video_progress_pct)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (learner_id, training_id) DO UPDATE SET
                video_watched_seconds = GREATEST(training_progress.video_watched_seconds,
                                                 EXCLUDED.video_watched_seconds),
                video_progress_pct = GREATEST(training_progress.video_progress_pct,
                                              EXCLUDED.video_progress_pct),
                updated_at = now()
             RETURNING {TRAINING_PROGRESS_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, TrainingProgress>(&query)
            .bind(learner_id)
            .bind(training_id)
            .bind(watched_seconds)
            .bind(video_progress_pct)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn record_training_quiz_result(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
        score: f64,
        passed: bool,
    ) -> StoreResult<TrainingProgress> {
        let query = format!(
            "INSERT INTO training_progress (learner_id, training_id, quiz_completed, quiz_score)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (learner_id, training_id) DO UPDATE SET
                quiz_completed = training_progress.quiz_completed OR EXCLUDED.quiz_completed,
                quiz_score = GREATEST(training_progress.quiz_score, EXCLUDED.quiz_score),
                quiz_postponed = FALSE,
                updated_at = now()
             RETURNING {TRAINING_PROGRESS_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, TrainingProgress>(&query)
            .bind(learner_id)
            .bind(training_id)
            .bind(passed)
            .bind(score)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn set_quiz_postponed(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
        postponed: bool,
    ) -> StoreResult<TrainingProgress> {
        let query = format!(
            "INSERT INTO training_progress (learner_id, training_id, quiz_postponed)
             VALUES ($1, $2, $3)
             ON CONFLICT (learner_id, training_id) DO UPDATE SET
                quiz_postponed = EXCLUDED.quiz_postponed,
                updated_at = now()
             RETURNING {TRAINING_PROGRESS_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, TrainingProgress>(&query)
            .bind(learner_id)
            .bind(training_id)
            .bind(postponed)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn save_training_outcome(&self, record: &TrainingProgress) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO training_progress (learner_id, training_id, progress_pct, is_completed,
                 completed_at, sub_units_completed, sub_units_total)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (learner_id, training_id) DO UPDATE SET
                progress_pct = EXCLUDED.progress_pct,
                is_completed = EXCLUDED.is_completed,
                completed_at = EXCLUDED.completed_at,
                sub_units_completed = EXCLUDED.sub_units_completed,
                sub_units_total = EXCLUDED.sub_units_total,
                updated_at = now()",
        )
        .bind(record.learner_id)
        .bind(record.training_id)
        .bind(record.progress_pct)
        .bind(record.is_completed)
        .bind(record.completed_at)
        .bind(record.sub_units_completed)
        .bind(record.sub_units_total)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_sub_unit_progress(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
    ) -> StoreResult<Vec<SubUnitProgress>> {
        let query = format!(
            "SELECT {SUB_UNIT_PROGRESS_COLUMNS} FROM sub_unit_progress
             WHERE learner_id = $1 AND training_id = $2"
        );
        Ok(sqlx::query_as::<_, SubUnitProgress>(&query)
            .bind(learner_id)
            .bind(training_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn record_sub_unit_watch(
        &self,
        learner_id: Uuid,
        sub_unit: &SubUnit,
        watched_seconds: i64,
        video_progress_pct: f64,
        completes: bool,
    ) -> StoreResult<SubUnitProgress> {
        let query = format!(
            "INSERT INTO sub_unit_progress (learner_id, sub_unit_id, training_id,
                 video_watched_seconds, video_progress_pct, is_completed)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (learner_id, sub_unit_id) DO UPDATE SET
                video_watched_seconds = GREATEST(sub_unit_progress.video_watched_seconds,
                                                 EXCLUDED.video_watched_seconds),
                video_progress_pct = GREATEST(sub_unit_progress.video_progress_pct,
                                              EXCLUDED.video_progress_pct),
                is_completed = sub_unit_progress.is_completed OR EXCLUDED.is_completed,
                updated_at = now()
             RETURNING {SUB_UNIT_PROGRESS_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, SubUnitProgress>(&query)
            .bind(learner_id)
            .bind(sub_unit.id)
            .bind(sub_unit.training_id)
            .bind(watched_seconds)
            .bind(video_progress_pct)
            .bind(completes)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn record_sub_unit_quiz_result(
        &self,
        learner_id: Uuid,
        sub_unit: &SubUnit,
        passed: bool,
    ) -> StoreResult<SubUnitProgress> {
        let query = format!(
            "INSERT INTO sub_unit_progress (learner_id, sub_unit_id, training_id,
                 quiz_completed, is_completed)
             VALUES ($1, $2, $3, $4, $4)
             ON CONFLICT (learner_id, sub_unit_id) DO UPDATE SET
                quiz_completed = sub_unit_progress.quiz_completed OR EXCLUDED.quiz_completed,
                is_completed = sub_unit_progress.is_completed OR EXCLUDED.is_completed,
                updated_at = now()
             RETURNING {SUB_UNIT_PROGRESS_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, SubUnitProgress>(&query)
            .bind(learner_id)
            .bind(sub_unit.id)
            .bind(sub_unit.training_id)
            .bind(passed)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_course_progress(
        &self,
        learner_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Option<CourseProgress>> {
        let query = format!(
            "SELECT {COURSE_PROGRESS_COLUMNS} FROM course_progress
             WHERE learner_id = $1 AND course_id = $2"
        );
        Ok(sqlx::query_as::<_, CourseProgress>(&query)
            .bind(learner_id)
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn save_course_progress(&self, record: &CourseProgress) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO course_progress (learner_id, course_id, progress_pct,
                 completed_trainings, total_trainings, is_completed, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (learner_id, course_id) DO UPDATE SET
                progress_pct = EXCLUDED.progress_pct,
                completed_trainings = EXCLUDED.completed_trainings,
                total_trainings = EXCLUDED.total_trainings,
                is_completed = EXCLUDED.is_completed,
                completed_at = EXCLUDED.completed_at,
                updated_at = now()",
        )
        .bind(record.learner_id)
        .bind(record.course_id)
        .bind(record.progress_pct)
        .bind(record.completed_trainings)
        .bind(record.total_trainings)
        .bind(record.is_completed)
        .bind(record.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_quiz_attempts(&self, learner_id: Uuid, quiz_id: Uuid) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM quiz_attempts WHERE learner_id = $1 AND quiz_id = $2",
        )
        .bind(learner_id)
        .bind(quiz_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn insert_quiz_attempt(&self, attempt: &NewQuizAttempt) -> StoreResult<QuizAttempt> {
        let query = format!(
            "INSERT INTO quiz_attempts (id, learner_id, quiz_id, attempt_number, score,
                 answers, started_at, time_spent_seconds, passed)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {ATTEMPT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, QuizAttempt>(&query)
            .bind(Uuid::new_v4())
            .bind(attempt.learner_id)
            .bind(attempt.quiz_id)
            .bind(attempt.attempt_number)
            .bind(attempt.score)
            .bind(sqlx::types::Json(&attempt.answers))
            .bind(attempt.started_at)
            .bind(attempt.time_spent_seconds)
            .bind(attempt.passed)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_learner_stats(&self, learner_id: Uuid) -> StoreResult<Option<LearnerStats>> {
        let query = format!("SELECT {STATS_COLUMNS} FROM learner_stats WHERE learner_id = $1");
        Ok(sqlx::query_as::<_, LearnerStats>(&query)
            .bind(learner_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn award_xp(
        &self,
        learner_id: Uuid,
        training_id: Uuid,
        xp: i64,
        level_of: LevelFn,
    ) -> StoreResult<Option<LearnerStats>> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO xp_awards (learner_id, training_id, xp) VALUES ($1, $2, $3)
             ON CONFLICT (learner_id, training_id) DO NOTHING",
        )
        .bind(learner_id)
        .bind(training_id)
        .bind(xp)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if inserted == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let total = sqlx::query_scalar::<_, i64>(
            "INSERT INTO learner_stats (learner_id, total_xp) VALUES ($1, $2)
             ON CONFLICT (learner_id) DO UPDATE SET
                total_xp = learner_stats.total_xp + EXCLUDED.total_xp,
                updated_at = now()
             RETURNING total_xp",
        )
        .bind(learner_id)
        .bind(xp)
        .fetch_one(&mut *tx)
        .await?;

        let query = format!(
            "UPDATE learner_stats SET level = $2 WHERE learner_id = $1 RETURNING {STATS_COLUMNS}"
        );
        let stats = sqlx::query_as::<_, LearnerStats>(&query)
            .bind(learner_id)
            .bind(level_of(total))
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(stats))
    }
}
