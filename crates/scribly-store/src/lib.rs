//! `PostgreSQL` persistence for the story context.

pub mod pg_story_store;
mod rows;

pub use pg_story_store::{MIGRATOR, PgStoryStore};
