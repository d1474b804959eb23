//! Story routes: start, read, seat cowriters, take turns, hide, nudge.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;

use scribly_stories::application::query_handlers::{self, UserStoryView};
use scribly_stories::domain::aggregates::{HiddenStatus, Story, UserStoryHide};
use scribly_stories::domain::commands;
use scribly_stories::domain::turn::TurnAction;

use super::users::StatusResponse;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct StartStoryRequest {
    /// Story title.
    pub title: String,
    /// Opening text, stored as the author's first turn.
    pub body: String,
}

/// Request body for POST /{story_id}/cowriters.
#[derive(Debug, Deserialize)]
pub struct AddCowritersRequest {
    /// Usernames in the order they should write.
    pub usernames: Vec<String>,
}

/// Request body for POST /{story_id}/turns.
#[derive(Debug, Deserialize)]
pub struct TakeTurnRequest {
    /// `write`, `pass`, `finish`, or `write_and_finish`.
    pub action: String,
    /// Text for writing actions.
    #[serde(default)]
    pub text: Option<String>,
}

/// POST /
#[instrument(skip_all, fields(user_id = %user.id))]
async fn start_story(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<StartStoryRequest>,
) -> Result<(StatusCode, Json<Story>), ApiError> {
    let command = commands::StartStory {
        correlation_id: Uuid::new_v4(),
        author_id: user.id,
        title: request.title,
        text: request.body,
    };

    info!(correlation_id = %command.correlation_id, "handling start_story command");

    let story = state.service.start_story(&command).await?;
    Ok((StatusCode::CREATED, Json(story)))
}

/// GET /{story_id}
#[instrument(skip_all, fields(user_id = %user.id, %story_id))]
async fn get_story(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(story_id): Path<Uuid>,
) -> Result<Json<UserStoryView>, ApiError> {
    let view = query_handlers::get_user_story(&user, story_id, state.store()).await?;
    Ok(Json(view))
}

/// POST /{story_id}/cowriters
#[instrument(skip_all, fields(user_id = %user.id, %story_id))]
async fn add_cowriters(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(story_id): Path<Uuid>,
    Json(request): Json<AddCowritersRequest>,
) -> Result<Json<Story>, ApiError> {
    let command = commands::AddCowriters {
        correlation_id: Uuid::new_v4(),
        requester_id: user.id,
        story_id,
        usernames: request.usernames,
    };

    info!(correlation_id = %command.correlation_id, "handling add_cowriters command");

    let story = state.service.add_cowriters(&command).await?;
    Ok(Json(story))
}

/// POST /{story_id}/turns
#[instrument(skip_all, fields(user_id = %user.id, %story_id, action = %request.action))]
async fn take_turn(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(story_id): Path<Uuid>,
    Json(request): Json<TakeTurnRequest>,
) -> Result<Json<Story>, ApiError> {
    let command = commands::TakeTurn {
        correlation_id: Uuid::new_v4(),
        user_id: user.id,
        story_id,
        action: request.action.parse::<TurnAction>()?,
        text: request.text,
    };

    info!(correlation_id = %command.correlation_id, "handling take_turn command");

    let story = state.service.take_turn(&command).await?;
    Ok(Json(story))
}

async fn set_hidden(
    state: &AppState,
    user_id: Uuid,
    story_id: Uuid,
    hidden_status: HiddenStatus,
) -> Result<Json<UserStoryHide>, ApiError> {
    let command = commands::HideStory {
        correlation_id: Uuid::new_v4(),
        user_id,
        story_id,
        hidden_status,
    };

    info!(correlation_id = %command.correlation_id, %hidden_status, "handling hide_story command");

    let hide = state.service.hide_story(&command).await?;
    Ok(Json(hide))
}

/// POST /{story_id}/hide
#[instrument(skip_all, fields(user_id = %user.id, %story_id))]
async fn hide(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(story_id): Path<Uuid>,
) -> Result<Json<UserStoryHide>, ApiError> {
    set_hidden(&state, user.id, story_id, HiddenStatus::Hidden).await
}

/// POST /{story_id}/unhide
#[instrument(skip_all, fields(user_id = %user.id, %story_id))]
async fn unhide(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(story_id): Path<Uuid>,
) -> Result<Json<UserStoryHide>, ApiError> {
    set_hidden(&state, user.id, story_id, HiddenStatus::Unhidden).await
}

/// POST /{story_id}/nudge/{nudgee_id}
#[instrument(skip_all, fields(user_id = %user.id, %story_id, %nudgee_id))]
async fn nudge(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((story_id, nudgee_id)): Path<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    let command = commands::NudgeWriter {
        correlation_id: Uuid::new_v4(),
        nudger_id: user.id,
        nudgee_id,
        story_id,
    };

    info!(correlation_id = %command.correlation_id, "handling nudge command");

    state.service.nudge(&command).await?;
    Ok((StatusCode::ACCEPTED, Json(StatusResponse { status: "sent" })))
}

/// Returns the router for story routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_story))
        .route("/{story_id}", get(get_story))
        .route("/{story_id}/cowriters", post(add_cowriters))
        .route("/{story_id}/turns", post(take_turn))
        .route("/{story_id}/hide", post(hide))
        .route("/{story_id}/unhide", post(unhide))
        .route("/{story_id}/nudge/{nudgee_id}", post(nudge))
}
