//! Outbound email port.

use async_trait::async_trait;
use scribly_core::error::DomainError;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Who an email is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    /// The recipient's user id.
    pub user_id: Uuid,
    /// Display name.
    pub username: String,
    /// Delivery address.
    pub email: String,
}

/// A composed email. Transient: built from current state, sent, forgotten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub body: String,
    /// Recipient.
    pub to: Recipient,
}

/// Failure to deliver a notification.
///
/// Every variant is treated as retryable by the dispatcher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The provider answered with a non-2xx status.
    #[error("email provider rejected message with status {status}: {body}")]
    Rejected {
        /// HTTP status returned by the provider.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The provider could not be reached.
    #[error("email transport failed: {0}")]
    Transport(String),

    /// An email template failed to render.
    #[error("email rendering failed: {0}")]
    Render(String),

    /// The state needed to compose the notification could not be loaded.
    #[error("could not load notification source: {0}")]
    Source(String),
}

impl From<DomainError> for DeliveryError {
    fn from(err: DomainError) -> Self {
        Self::Source(err.to_string())
    }
}

impl From<DeliveryError> for DomainError {
    fn from(err: DeliveryError) -> Self {
        Self::Infrastructure(err.to_string())
    }
}

/// Sends composed emails through some provider.
#[async_trait]
pub trait EmailGateway: Send + Sync {
    /// Deliver one email.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` for any non-success outcome, including non-2xx
    /// provider responses.
    async fn send_email(&self, email: &Email) -> Result<(), DeliveryError>;
}

/// Gateway that logs emails instead of sending them. Used when no provider is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEmailGateway;

#[async_trait]
impl EmailGateway for LoggingEmailGateway {
    async fn send_email(&self, email: &Email) -> Result<(), DeliveryError> {
        tracing::info!(
            to = %email.to.email,
            user_id = %email.to.user_id,
            subject = %email.subject,
            body_len = email.body.len(),
            "email delivery skipped; no provider configured"
        );
        Ok(())
    }
}
