//! Resolves the signed-in user from the request.
//!
//! Sessions are handled in front of this service; it forwards the user id in
//! the `x-scribly-user-id` header.

use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use scribly_core::error::DomainError;
use scribly_stories::domain::user::User;
use uuid::Uuid;

use crate::error::{ApiError, ErrorBody};
use crate::state::AppState;

/// Header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-scribly-user-id";

/// The user making the request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Why a request could not be tied to a user.
#[derive(Debug)]
pub enum AuthRejection {
    /// No user id header.
    Missing,
    /// The header is not a UUID.
    Malformed,
    /// No user has that id.
    UnknownUser,
    /// The lookup itself failed.
    Store(DomainError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::Missing => format!("missing {USER_ID_HEADER} header"),
            Self::Malformed => format!("{USER_ID_HEADER} is not a valid user id"),
            Self::UnknownUser => "unknown user".to_owned(),
            Self::Store(err) => return ApiError(err).into_response(),
        };
        let body = ErrorBody {
            error: "unauthorized",
            message,
        };
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or(AuthRejection::Missing)?;
        let user_id = header
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or(AuthRejection::Malformed)?;

        state
            .store()
            .find_user(user_id)
            .await
            .map_err(AuthRejection::Store)?
            .map(Self)
            .ok_or(AuthRejection::UnknownUser)
    }
}
