//! Command abstractions.

use uuid::Uuid;

/// Trait that all user-initiated commands implement.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging).
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system, including any
    /// notifications it triggers.
    fn correlation_id(&self) -> Uuid;

    /// The user on whose behalf the command runs; `None` for anonymous
    /// commands such as sign-up.
    fn actor_id(&self) -> Option<Uuid>;
}
