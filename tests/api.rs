//! End-to-end flows through the HTTP router.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;
use uuid::Uuid;

use common::TestApp;

fn quiz_body() -> serde_json::Value {
    json!({
        "title": "Final check",
        "passing_score": 70,
        "questions": [
            {"id": "q1", "text": "Where is the exit?", "options": ["left", "right"], "correct_answer": 1},
            {"id": "q2", "text": "Who to call?", "options": ["supervisor", "nobody"], "correct_answer": 0}
        ]
    })
}

#[tokio::test]
async fn learner_routes_require_a_bearer_learner_id() {
    let app = TestApp::new().await;
    let training = app.training(Some(100), 100).await;
    let uri = format!("/api/trainings/{training}/progress");

    let (status, json) = app.send(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "UNAUTHORIZED");

    let (status, _) = app.get(&uri, Uuid::new_v4()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_training_is_404_and_bad_input_is_400() {
    let app = TestApp::new().await;
    let learner = Uuid::new_v4();

    let (status, json) = app
        .post(
            &format!("/api/trainings/{}/watch", Uuid::new_v4()),
            learner,
            json!({"watched_seconds": 10.0}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");

    let training = app.training(Some(100), 100).await;
    let (status, json) = app
        .post(
            &format!("/api/trainings/{training}/watch"),
            learner,
            json!({"watched_seconds": -5.0}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn watch_then_quiz_completes_training_and_course() {
    let app = TestApp::new().await;
    let learner = Uuid::new_v4();
    let training = app.training(Some(100), 200).await;

    let (status, _) = app
        .admin_post(&format!("/api/admin/trainings/{training}/quiz"), quiz_body())
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = app
        .post(
            &format!("/api/trainings/{training}/watch"),
            learner,
            json!({"watched_seconds": 100.0}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["video_progress_pct"], 100.0);
    assert_eq!(json["can_take_quiz"], true);
    assert_eq!(json["progress_pct"], 50.0);

    let (status, quiz) = app.get(&format!("/api/trainings/{training}/quiz"), learner).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(quiz["attempt_number"], 1);
    let questions = quiz["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 2);
    assert!(questions.iter().all(|q| q.get("correct_answer").is_none()));

    let (status, res) = app
        .post(
            &format!("/api/trainings/{training}/quiz/submit"),
            learner,
            json!({
                "answers": [
                    {"question_id": "q1", "selected": 1},
                    {"question_id": "q2", "selected": 0}
                ],
                "time_spent_seconds": 42
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["score"], 100.0);
    assert_eq!(res["passed"], true);
    assert_eq!(res["is_completed"], true);
    assert_eq!(res["xp_earned"], 200);

    let (_, course) = app
        .get(&format!("/api/courses/{}/progress", app.course_id), learner)
        .await;
    assert_eq!(course["progress_pct"], 100.0);
    assert_eq!(course["is_completed"], true);

    let (_, stats) = app.get("/api/me/stats", learner).await;
    assert_eq!(stats["total_xp"], 200);
    assert_eq!(stats["level"], 2);
}

#[tokio::test]
async fn adding_a_sub_unit_reports_demoted_learners() {
    let app = TestApp::new().await;
    let learner = Uuid::new_v4();
    let training = app.training(Some(100), 100).await;
    let other = app.training(Some(100), 100).await;

    app.post(
        &format!("/api/trainings/{training}/watch"),
        learner,
        json!({"watched_seconds": 100.0}),
    )
    .await;
    let (_, course) = app
        .get(&format!("/api/courses/{}/progress", app.course_id), learner)
        .await;
    assert_eq!(course["completed_trainings"], 1);
    assert_eq!(course["total_trainings"], 2);
    assert_eq!(course["progress_pct"], 50.0);

    let (status, change) = app
        .admin_post(
            &format!("/api/admin/trainings/{training}/sub-units"),
            json!({"title": "Refresher", "video_duration_seconds": 50}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["affected_learners"], json!([learner]));
    assert_eq!(change["report"]["processed"], 1);
    let sub_unit = change["created_id"].as_str().unwrap().to_string();

    let (_, progress) = app
        .get(&format!("/api/trainings/{training}/progress"), learner)
        .await;
    assert_eq!(progress["progress_pct"], 60.0);
    assert_eq!(progress["is_completed"], false);

    let (_, course) = app
        .get(&format!("/api/courses/{}/progress", app.course_id), learner)
        .await;
    assert_eq!(course["completed_trainings"], 0);

    let (status, watch) = app
        .post(
            &format!("/api/sub-units/{sub_unit}/watch"),
            learner,
            json!({"watched_seconds": 50.0}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(watch["sub_unit_pct"], 100.0);
    assert_eq!(watch["training_progress_pct"], 100.0);

    let (_, untouched) = app
        .get(&format!("/api/trainings/{other}/progress"), learner)
        .await;
    assert_eq!(untouched["progress_pct"], 0.0);
}

#[tokio::test]
async fn deleting_a_sub_unit_recalculates() {
    let app = TestApp::new().await;
    let learner = Uuid::new_v4();
    let training = app.training(Some(100), 100).await;

    let (_, change) = app
        .admin_post(
            &format!("/api/admin/trainings/{training}/sub-units"),
            json!({"title": "Extra", "video_duration_seconds": 30}),
        )
        .await;
    let sub_unit = change["created_id"].as_str().unwrap().to_string();

    let (_, watch) = app
        .post(
            &format!("/api/trainings/{training}/watch"),
            learner,
            json!({"watched_seconds": 100.0}),
        )
        .await;
    assert_eq!(watch["progress_pct"], 60.0);

    let (status, change) = app
        .send(Method::DELETE, &format!("/api/admin/sub-units/{sub_unit}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["report"]["promoted"], json!([learner]));

    let (_, progress) = app
        .get(&format!("/api/trainings/{training}/progress"), learner)
        .await;
    assert_eq!(progress["is_completed"], true);
}
