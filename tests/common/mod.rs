#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use learning_progress::engine::{EngineSettings, LearningEngine};
use learning_progress::models::{Course, Training};
use learning_progress::notify::LogNotifier;
use learning_progress::routes;
use learning_progress::store::MemoryStore;

/// Router over an in-memory store, with one course and its trainings seeded
/// by the individual tests.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub router: Router,
    pub course_id: Uuid,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let course_id = Uuid::new_v4();
        store
            .add_course(Course {
                id: course_id,
                title: "Onboarding".into(),
                created_at: Utc::now(),
            })
            .await;
        let engine = LearningEngine::new(store.clone(), Arc::new(LogNotifier), EngineSettings::default());
        let router = routes::router(Arc::new(engine));
        Self {
            store,
            router,
            course_id,
        }
    }

    /// Seed a published training; `video_seconds` of `None` means no video.
    pub async fn training(&self, video_seconds: Option<i32>, total_xp: i32) -> Uuid {
        let id = Uuid::new_v4();
        self.store
            .add_training(Training {
                id,
                course_id: self.course_id,
                title: format!("Training {id}"),
                video_url: video_seconds.map(|_| "https://cdn.example/v.mp4".to_string()),
                video_duration_seconds: video_seconds,
                total_xp,
                is_published: true,
                created_at: Utc::now(),
            })
            .await;
        id
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        learner: Option<Uuid>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(learner) = learner {
            req = req.header(header::AUTHORIZATION, format!("Bearer {learner}"));
        }
        let req = match body {
            Some(json) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, learner: Uuid) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(learner), None).await
    }

    pub async fn post(&self, uri: &str, learner: Uuid, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(learner), Some(body)).await
    }

    pub async fn admin_post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, None, Some(body)).await
    }
}
