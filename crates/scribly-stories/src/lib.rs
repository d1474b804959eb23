//! Scribly story context.
//!
//! Users start stories, add cowriters, and take turns in a fixed rotation
//! until someone finishes the story. Participants are emailed as the story
//! moves along.

pub mod application;
pub mod domain;
