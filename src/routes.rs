use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::request::Parts,
    routing::{delete, get, post},
    Json, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use uuid::Uuid;

use crate::engine::LearningEngine;
use crate::error::EngineError;
use crate::models::*;
use crate::quiz::QuizView;

type AppState = Arc<LearningEngine>;
type ApiResult<T> = Result<Json<T>, EngineError>;

pub fn router(engine: AppState) -> Router {
    Router::new()
        // learner: trainings
        .route("/api/trainings/:id/watch", post(watch_training))
        .route("/api/trainings/:id/progress", get(training_progress))
        .route("/api/trainings/:id/quiz", get(training_quiz))
        .route("/api/trainings/:id/quiz/submit", post(submit_training_quiz))
        .route("/api/trainings/:id/quiz/postpone", post(postpone_training_quiz))
        // learner: sub-units
        .route("/api/sub-units/:id/watch", post(watch_sub_unit))
        .route("/api/sub-units/:id/quiz", get(sub_unit_quiz))
        .route("/api/sub-units/:id/quiz/submit", post(submit_sub_unit_quiz))
        // learner: aggregates
        .route("/api/courses/:id/progress", get(course_progress))
        .route("/api/me/stats", get(my_stats))
        // content authoring
        .route("/api/admin/trainings/:id/quiz", post(create_training_quiz))
        .route("/api/admin/trainings/:id/sub-units", post(create_sub_unit))
        .route("/api/admin/trainings/:id/recalculate", post(recalculate_training))
        .route("/api/admin/sub-units/:id/quiz", post(create_sub_unit_quiz))
        .route("/api/admin/sub-units/:id", delete(delete_sub_unit))
        .route("/api/admin/quizzes/:id", delete(delete_quiz))
        .with_state(engine)
}

/// Learner identity from `Authorization: Bearer <learner uuid>`. Token
/// issuance and verification happen upstream of this service.
#[derive(Debug, Clone, Copy)]
pub struct CurrentLearner(pub Uuid);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentLearner {
    type Rejection = EngineError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    EngineError::Unauthorized("expected Authorization: Bearer <learner id>".into())
                })?;
        let id = Uuid::parse_str(bearer.token())
            .map_err(|_| EngineError::Unauthorized("bearer token is not a learner id".into()))?;
        Ok(CurrentLearner(id))
    }
}

// --- trainings ---

async fn watch_training(
    State(engine): State<AppState>,
    CurrentLearner(learner): CurrentLearner,
    Path(training_id): Path<Uuid>,
    Json(req): Json<WatchProgressReq>,
) -> ApiResult<WatchProgressResult> {
    let res = engine
        .record_watch_progress(learner, training_id, req.watched_seconds)
        .await?;
    Ok(Json(res))
}

async fn training_progress(
    State(engine): State<AppState>,
    CurrentLearner(learner): CurrentLearner,
    Path(training_id): Path<Uuid>,
) -> ApiResult<TrainingProgress> {
    Ok(Json(engine.get_training_progress(learner, training_id).await?))
}

async fn training_quiz(
    State(engine): State<AppState>,
    CurrentLearner(learner): CurrentLearner,
    Path(training_id): Path<Uuid>,
) -> ApiResult<QuizView> {
    Ok(Json(engine.get_training_quiz(learner, training_id).await?))
}

async fn submit_training_quiz(
    State(engine): State<AppState>,
    CurrentLearner(learner): CurrentLearner,
    Path(training_id): Path<Uuid>,
    Json(req): Json<SubmitQuizReq>,
) -> ApiResult<QuizSubmissionResult> {
    let res = engine
        .submit_training_quiz(learner, training_id, &req.answers, &req.meta)
        .await?;
    Ok(Json(res))
}

async fn postpone_training_quiz(
    State(engine): State<AppState>,
    CurrentLearner(learner): CurrentLearner,
    Path(training_id): Path<Uuid>,
) -> ApiResult<TrainingProgress> {
    Ok(Json(engine.postpone_training_quiz(learner, training_id).await?))
}

// --- sub-units ---

async fn watch_sub_unit(
    State(engine): State<AppState>,
    CurrentLearner(learner): CurrentLearner,
    Path(sub_unit_id): Path<Uuid>,
    Json(req): Json<WatchProgressReq>,
) -> ApiResult<SubUnitWatchResult> {
    let res = engine
        .record_sub_unit_watch(learner, sub_unit_id, req.watched_seconds)
        .await?;
    Ok(Json(res))
}

async fn sub_unit_quiz(
    State(engine): State<AppState>,
    CurrentLearner(learner): CurrentLearner,
    Path(sub_unit_id): Path<Uuid>,
) -> ApiResult<QuizView> {
    Ok(Json(engine.get_sub_unit_quiz(learner, sub_unit_id).await?))
}

async fn submit_sub_unit_quiz(
    State(engine): State<AppState>,
    CurrentLearner(learner): CurrentLearner,
    Path(sub_unit_id): Path<Uuid>,
    Json(req): Json<SubmitQuizReq>,
) -> ApiResult<SubUnitQuizResult> {
    let res = engine
        .submit_sub_unit_quiz(learner, sub_unit_id, &req.answers, &req.meta)
        .await?;
    Ok(Json(res))
}

// --- aggregates ---

async fn course_progress(
    State(engine): State<AppState>,
    CurrentLearner(learner): CurrentLearner,
    Path(course_id): Path<Uuid>,
) -> ApiResult<CourseProgressView> {
    Ok(Json(engine.get_course_progress(learner, course_id).await?))
}

async fn my_stats(
    State(engine): State<AppState>,
    CurrentLearner(learner): CurrentLearner,
) -> ApiResult<StatsView> {
    Ok(Json(engine.get_learner_stats(learner).await?))
}

// --- content authoring ---

async fn create_training_quiz(
    State(engine): State<AppState>,
    Path(training_id): Path<Uuid>,
    Json(req): Json<NewQuiz>,
) -> ApiResult<ContentChangeResult> {
    Ok(Json(engine.create_training_quiz(training_id, &req).await?))
}

async fn create_sub_unit(
    State(engine): State<AppState>,
    Path(training_id): Path<Uuid>,
    Json(req): Json<NewSubUnit>,
) -> ApiResult<ContentChangeResult> {
    Ok(Json(engine.create_sub_unit(training_id, &req).await?))
}

async fn recalculate_training(
    State(engine): State<AppState>,
    Path(training_id): Path<Uuid>,
) -> ApiResult<ContentChangeResult> {
    Ok(Json(engine.recalculate_training(training_id).await?))
}

async fn create_sub_unit_quiz(
    State(engine): State<AppState>,
    Path(sub_unit_id): Path<Uuid>,
    Json(req): Json<NewQuiz>,
) -> ApiResult<ContentChangeResult> {
    Ok(Json(engine.create_sub_unit_quiz(sub_unit_id, &req).await?))
}

async fn delete_sub_unit(
    State(engine): State<AppState>,
    Path(sub_unit_id): Path<Uuid>,
) -> ApiResult<ContentChangeResult> {
    Ok(Json(engine.delete_sub_unit(sub_unit_id).await?))
}

async fn delete_quiz(
    State(engine): State<AppState>,
    Path(quiz_id): Path<Uuid>,
) -> ApiResult<ContentChangeResult> {
    Ok(Json(engine.delete_quiz(quiz_id).await?))
}
