//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use scribly_api::auth::USER_ID_HEADER;
use scribly_api::build_router;
use scribly_api::state::AppState;
use scribly_test_support::{RecordingEmailGateway, StoryHarness};
use tower::ServiceExt;
use uuid::Uuid;

/// The router over an in-memory harness, plus the outbox it sends to.
pub struct TestApp {
    pub harness: StoryHarness,
    pub emails: Arc<RecordingEmailGateway>,
}

impl TestApp {
    pub fn new() -> Self {
        let emails = Arc::new(RecordingEmailGateway::default());
        let harness = StoryHarness::new(emails.clone());
        Self { harness, emails }
    }

    /// A fresh router; `oneshot` consumes it.
    pub fn router(&self) -> Router {
        build_router(AppState::new(self.harness.service.clone()))
    }

    pub async fn get(&self, uri: &str, user: Option<Uuid>) -> (StatusCode, serde_json::Value) {
        send(self.router(), "GET", uri, user, None).await
    }

    pub async fn post(
        &self,
        uri: &str,
        user: Option<Uuid>,
        body: &serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        send(self.router(), "POST", uri, user, Some(body)).await
    }
}

/// Sends a request and returns the status with the body parsed as JSON.
///
/// Non-JSON bodies (framework rejections) come back as a JSON string.
pub async fn send(
    app: Router,
    method: &str,
    uri: &str,
    user: Option<Uuid>,
    body: Option<&serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = user {
        builder = builder.header(USER_ID_HEADER, user_id.to_string());
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body_bytes).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(&body_bytes).into_owned())
    });

    (status, json)
}
