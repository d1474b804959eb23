//! Account routes: sign-up, log-in, the dashboard, and email verification.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use scribly_stories::application::query_handlers::{self, MeView};
use scribly_stories::domain::commands;
use scribly_stories::domain::user::User;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /sign-up.
#[derive(Deserialize)]
pub struct SignUpRequest {
    /// Desired username.
    pub username: String,
    /// Address for notifications.
    pub email: String,
    /// Plain-text password; hashed by the store.
    pub password: String,
}

/// Request body for POST /log-in.
#[derive(Deserialize)]
pub struct LogInRequest {
    /// Username, any case.
    pub username: String,
    /// Plain-text password.
    pub password: String,
}

/// Request body for POST /me/email-verification.
#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    /// Token from the verification link.
    pub token: String,
}

/// Acknowledges work that happened as a side effect.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// What was done.
    pub status: &'static str,
}

/// POST /sign-up
#[instrument(skip_all, fields(username = %request.username))]
async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let command = commands::SignUp {
        correlation_id: Uuid::new_v4(),
        username: request.username,
        email: request.email,
        password: request.password,
    };

    info!(correlation_id = %command.correlation_id, "handling sign_up command");

    let user = state.service.sign_up(&command).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /log-in
#[instrument(skip_all, fields(username = %request.username))]
async fn log_in(
    State(state): State<AppState>,
    Json(request): Json<LogInRequest>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .service
        .log_in(&request.username, &request.password)
        .await?;
    Ok(Json(user))
}

/// GET /me
#[instrument(skip_all, fields(user_id = %user.id))]
async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MeView>, ApiError> {
    let view = query_handlers::get_me(user.id, state.store()).await?;
    Ok(Json(view))
}

/// GET /suggestions
async fn suggestions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = query_handlers::user_suggestions(&user, state.store()).await?;
    Ok(Json(users))
}

/// POST /me/email-verification-requests
#[instrument(skip_all, fields(user_id = %user.id))]
async fn request_verification_email(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    let command = commands::RequestVerificationEmail {
        correlation_id: Uuid::new_v4(),
        user_id: user.id,
    };

    info!(correlation_id = %command.correlation_id, "handling request_verification_email command");

    state.service.request_verification_email(&command).await?;
    Ok((StatusCode::ACCEPTED, Json(StatusResponse { status: "sent" })))
}

/// POST /me/email-verification
#[instrument(skip_all, fields(user_id = %user.id))]
async fn verify_email(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<VerifyEmailRequest>,
) -> Result<Json<User>, ApiError> {
    let command = commands::VerifyEmail {
        correlation_id: Uuid::new_v4(),
        user_id: user.id,
        token: request.token,
    };

    info!(correlation_id = %command.correlation_id, "handling verify_email command");

    let user = state.service.verify_email(&command).await?;
    Ok(Json(user))
}

/// Returns the router for account routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sign-up", post(sign_up))
        .route("/log-in", post(log_in))
        .route("/me", get(me))
        .route("/suggestions", get(suggestions))
        .route(
            "/me/email-verification-requests",
            post(request_verification_email),
        )
        .route("/me/email-verification", post(verify_email))
}
