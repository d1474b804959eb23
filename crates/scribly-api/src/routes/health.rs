//! Liveness and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

/// Probe response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` or `unavailable`.
    pub status: &'static str,
    /// Crate version of the running binary.
    pub version: &'static str,
}

impl HealthResponse {
    fn with_status(status: &'static str) -> Json<Self> {
        Json(Self {
            status,
            version: env!("CARGO_PKG_VERSION"),
        })
    }
}

/// GET /health
async fn liveness() -> Json<HealthResponse> {
    HealthResponse::with_status("ok")
}

/// GET /health/ready
///
/// 503 when the store cannot answer a trivial lookup.
async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.store().find_user(Uuid::nil()).await {
        Ok(_) => (StatusCode::OK, HealthResponse::with_status("ok")),
        Err(err) => {
            warn!(error = %err, "readiness probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                HealthResponse::with_status("unavailable"),
            )
        }
    }
}

/// Returns the health router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(liveness))
        .route("/health/ready", get(readiness))
}
