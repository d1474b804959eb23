//! Users, sign-up validation, and email-verification rules.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scribly_core::error::DomainError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How long a verification token stays redeemable after it was issued.
pub const VERIFICATION_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

const MIN_USERNAME_CHARS: usize = 4;
const MIN_PASSWORD_CHARS: usize = 8;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // Literal pattern; compiling it cannot fail.
    Regex::new(r"^\w+([.+-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,})+$").expect("email pattern compiles")
});

/// Whether a user has proven ownership of their email address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailVerificationStatus {
    /// Signed up, not yet verified.
    Pending,
    /// Verified through a token.
    Verified,
}

impl EmailVerificationStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
        }
    }
}

impl fmt::Display for EmailVerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailVerificationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "verified" => Ok(Self::Verified),
            other => Err(DomainError::Validation(format!(
                "Unknown email verification status '{other}'"
            ))),
        }
    }
}

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// User identifier.
    pub id: Uuid,
    /// Unique (case-insensitive) display name.
    pub username: String,
    /// Delivery address for notifications.
    pub email: String,
    /// Verification state of `email`.
    pub email_verification_status: EmailVerificationStatus,
}

impl User {
    /// True once the user redeemed a verification token.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.email_verification_status == EmailVerificationStatus::Verified
    }

    /// Case-insensitive username comparison.
    #[must_use]
    pub fn has_username(&self, username: &str) -> bool {
        self.username.eq_ignore_ascii_case(username.trim())
    }

    /// A verification email may only be requested while verification is pending.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Conflict` if the user is already verified.
    pub fn validate_can_request_verification(&self) -> Result<(), DomainError> {
        if self.is_verified() {
            return Err(DomainError::Conflict(format!(
                "User {} has already verified their email",
                self.username
            )));
        }
        Ok(())
    }

    /// Checks a decrypted token payload against this user at time `now`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Conflict` if the user is already verified, and
    /// `DomainError::Token` if the payload was issued for another user or
    /// another email, or is older than 24 hours.
    pub fn validate_email_verification(
        &self,
        payload: &VerificationPayload,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.validate_can_request_verification()?;

        if payload.user_id != self.id {
            return Err(DomainError::Token(
                "token was issued for a different user".to_owned(),
            ));
        }
        if payload.email != self.email {
            return Err(DomainError::Token(
                "token was issued for an email address that is no longer current".to_owned(),
            ));
        }
        let age = now.timestamp() - payload.issued_at;
        if age > VERIFICATION_TOKEN_TTL_SECS {
            return Err(DomainError::Token("token has expired".to_owned()));
        }
        Ok(())
    }
}

/// Plaintext sealed inside an email-verification token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationPayload {
    /// The user the token was issued to.
    pub user_id: Uuid,
    /// The email address at issuance.
    pub email: String,
    /// Issuance time, unix seconds.
    pub issued_at: i64,
}

impl VerificationPayload {
    /// Payload for `user` issued at `now`.
    #[must_use]
    pub fn issue(user: &User, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            issued_at: now.timestamp(),
        }
    }
}

/// Sign-up input. The password is handed to the store, which hashes it.
#[derive(Clone, PartialEq, Eq)]
pub struct NewUser {
    /// Requested username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Plaintext password.
    pub password: String,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl NewUser {
    /// Trims username and email.
    #[must_use]
    pub fn new(username: &str, email: &str, password: impl Into<String>) -> Self {
        Self {
            username: username.trim().to_owned(),
            email: email.trim().to_owned(),
            password: password.into(),
        }
    }

    /// Validates every field, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` listing each failed rule.
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut problems = Vec::new();

        if self.password.chars().count() < MIN_PASSWORD_CHARS {
            problems.push(format!(
                "Password must be at least {MIN_PASSWORD_CHARS} characters"
            ));
        }
        if self.username.chars().count() < MIN_USERNAME_CHARS
            || !self.username.chars().all(|c| c.is_ascii_alphanumeric())
        {
            problems.push(format!(
                "Username must be at least {MIN_USERNAME_CHARS} characters and contain only letters and numbers"
            ));
        }
        if !EMAIL_PATTERN.is_match(&self.email) {
            problems.push("Invalid email address".to_owned());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(problems.join("; ")))
        }
    }
}
