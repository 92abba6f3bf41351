//! `EngineError` to HTTP response mapping.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use uuid::Uuid;

use learning_progress::error::EngineError;
use learning_progress::store::StoreError;

async fn error_to_response(err: EngineError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn validation_is_400() {
    let (status, json) = error_to_response(EngineError::validation("bad input")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "bad input");
}

#[tokio::test]
async fn not_found_names_the_entity() {
    let id = Uuid::nil();
    let (status, json) = error_to_response(EngineError::not_found("training", id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], format!("training {id} not found"));
}

#[tokio::test]
async fn store_errors_are_sanitized() {
    let err = EngineError::Store(StoreError::Unavailable("pg at 10.0.0.3 refused".into()));
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert!(!json["error"].as_str().unwrap().contains("10.0.0.3"));
}

#[tokio::test]
async fn broken_quiz_content_has_its_own_code() {
    let err = EngineError::Store(StoreError::InvalidQuizContent {
        quiz_id: Uuid::nil(),
        reason: "options missing".into(),
    });
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INVALID_QUIZ_CONTENT");
}

#[tokio::test]
async fn serialization_failures_surface_as_internal_errors() {
    let cause = serde_json::from_str::<u8>("not json").unwrap_err();
    let err = EngineError::from(cause);
    assert!(matches!(err, EngineError::Serialization(_)));

    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
}
