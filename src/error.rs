use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Errors surfaced by the progress engine.
///
/// `NotFound` is only raised for missing content (trainings, quizzes,
/// courses). A learner without progress is zero state, not an error.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("{0}")]
    Unauthorized(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            EngineError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            EngineError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            EngineError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            EngineError::Store(StoreError::InvalidQuizContent { .. }) => {
                tracing::error!(error = %self, "stored quiz content is invalid");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INVALID_QUIZ_CONTENT",
                    "quiz content is invalid".to_string(),
                )
            }
            EngineError::Store(_) | EngineError::Serialization(_) => {
                tracing::error!(error = %self, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "an internal error occurred".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}
