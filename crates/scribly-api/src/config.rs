//! Server configuration, read once from the environment at startup.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use scribly_notifications::{DispatcherConfig, RetryPolicy};

use crate::error::AppError;

/// AES-256 key used when `EMAIL_VERIFICATION_SECRET` is unset.
const DEVELOPMENT_VERIFICATION_SECRET: &[u8; 32] = b"scribly-dev-secret-do-not-use!!!";

/// Everything the binary needs to wire the service.
#[derive(Clone)]
pub struct AppConfig {
    /// `PostgreSQL` connection string.
    pub database_url: String,
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Pool size.
    pub database_max_connections: u32,
    /// Key for sealing email verification tokens.
    pub verification_secret: [u8; 32],
    /// Base URL for links in emails.
    pub website_url: String,
    /// Notification queue sizing and retry budget.
    pub dispatcher: DispatcherConfig,
    /// OTLP collector endpoint; spans are only exported when set.
    pub otlp_endpoint: Option<String>,
    development_secret: bool,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_max_connections", &self.database_max_connections)
            .field("website_url", &self.website_url)
            .field("dispatcher", &self.dispatcher)
            .field("otlp_endpoint", &self.otlp_endpoint)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a value
    /// does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| AppError::Config("DATABASE_URL must be set".to_owned()))?;

        let (verification_secret, development_secret) = match lookup("EMAIL_VERIFICATION_SECRET")
        {
            Some(secret) => {
                let key: [u8; 32] = secret.as_bytes().try_into().map_err(|_| {
                    AppError::Config(format!(
                        "EMAIL_VERIFICATION_SECRET must be exactly 32 bytes, got {}",
                        secret.len()
                    ))
                })?;
                (key, false)
            }
            None => (*DEVELOPMENT_VERIFICATION_SECRET, true),
        };

        let max_attempts = parse_or(&lookup, "NOTIFICATION_MAX_ATTEMPTS", 3_u32)?;
        let backoff_ms = parse_or(&lookup, "NOTIFICATION_BACKOFF_MS", 1000_u64)?;
        let dispatcher = DispatcherConfig {
            retry: RetryPolicy::new(max_attempts, Duration::from_millis(backoff_ms)),
            queue_capacity: parse_or(&lookup, "NOTIFICATION_QUEUE_CAPACITY", 256_usize)?,
            concurrency: parse_or(&lookup, "NOTIFICATION_CONCURRENCY", 8_usize)?,
        };

        Ok(Self {
            database_url,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned()),
            port: parse_or(&lookup, "PORT", 3000_u16)?,
            database_max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10_u32)?,
            verification_secret,
            website_url: lookup("WEBSITE_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_owned()),
            dispatcher,
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.trim().is_empty()),
            development_secret,
        })
    }

    /// Whether tokens are sealed with the built-in development key.
    #[must_use]
    pub const fn uses_development_secret(&self) -> bool {
        self.development_secret
    }

    /// The address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST:PORT` is not a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
        None => Ok(default),
    }
}
