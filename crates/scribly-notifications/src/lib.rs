//! Scribly notifications.
//!
//! Decouples slow, unreliable downstream work (sending emails) from the
//! transaction that triggered it. The story service announces what happened;
//! the dispatcher runs the matching handler on its own task with a bounded
//! retry budget, and the outcome never flows back to the announcer.

pub mod dispatcher;
pub mod email;
pub mod retry;

pub use dispatcher::{
    Announcement, AnnouncementHandler, DispatcherConfig, DispatcherHandle, NotificationDispatcher,
};
pub use email::{DeliveryError, Email, EmailGateway, LoggingEmailGateway, Recipient};
pub use retry::{RetryExhausted, RetryPolicy, Sleeper, TokioSleeper, retry_with_backoff};
