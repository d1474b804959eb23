//! Application layer: the story service, read models, and notification work.

pub mod command_handlers;
pub mod emails;
pub mod notifier;
pub mod query_handlers;
pub mod scribbot;
pub mod verification;
