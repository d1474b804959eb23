//! Domain error types.

use thiserror::Error;

/// Top-level domain error type.
///
/// Every primary-path failure is one of these; the web layer maps each
/// variant to a status code. None of them is retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input: empty required text, unknown action, bad username,
    /// email or password format.
    #[error("validation error: {0}")]
    Validation(String),

    /// The operation is forbidden given the current state: not your turn,
    /// not the author, not a participant.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A story state precondition was violated.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An email verification token was malformed, expired or stale.
    #[error("token error: {0}")]
    Token(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Short machine-readable code for this error kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::Token(_) => "token_error",
            Self::Infrastructure(_) => "infrastructure_error",
        }
    }
}
