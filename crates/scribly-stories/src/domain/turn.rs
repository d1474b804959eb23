//! Turns: one action by one writer on one story.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use scribly_core::error::DomainError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::User;

/// What a writer did with their turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnAction {
    /// Append text; the story continues.
    Write,
    /// Skip this turn.
    Pass,
    /// End the story without writing.
    Finish,
    /// Append text and end the story.
    WriteAndFinish,
}

impl TurnAction {
    /// Wire and storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Pass => "pass",
            Self::Finish => "finish",
            Self::WriteAndFinish => "write_and_finish",
        }
    }

    /// True for the actions that move the story to `done`.
    #[must_use]
    pub const fn finishes(self) -> bool {
        matches!(self, Self::Finish | Self::WriteAndFinish)
    }

    /// True for the actions that must carry text.
    #[must_use]
    pub const fn writes(self) -> bool {
        matches!(self, Self::Write | Self::WriteAndFinish)
    }
}

impl fmt::Display for TurnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TurnAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "write" => Ok(Self::Write),
            "pass" => Ok(Self::Pass),
            "finish" => Ok(Self::Finish),
            "write_and_finish" => Ok(Self::WriteAndFinish),
            other => Err(DomainError::Validation(format!(
                "Unknown turn action '{other}'"
            ))),
        }
    }
}

/// An append-only record in a story's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    /// Turn identifier (UUIDv7, so it sorts by creation).
    pub id: Uuid,
    /// The story this turn belongs to.
    pub story_id: Uuid,
    /// The writer who took the turn.
    pub taken_by: Uuid,
    /// The writer, when loaded.
    pub author: Option<User>,
    /// What the writer did.
    pub action: TurnAction,
    /// Text, present iff `action.writes()`.
    pub text: Option<String>,
    /// When the turn was committed.
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Builds a new turn with a fresh UUIDv7 id, normalizing its text.
    ///
    /// Writing actions keep their text trimmed; other actions drop it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if a writing action has no text.
    pub fn new(
        story_id: Uuid,
        taken_by: Uuid,
        action: TurnAction,
        text: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let text = if action.writes() {
            text.map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned)
        } else {
            None
        };
        let turn = Self {
            id: Uuid::now_v7(),
            story_id,
            taken_by,
            author: None,
            action,
            text,
            created_at,
        };
        turn.validate()?;
        Ok(turn)
    }

    /// Gives the turn a fresh id and a timestamp strictly after `previous`.
    /// Call with the story locked.
    pub fn stamp_after(&mut self, previous: Option<&Self>, now: DateTime<Utc>) {
        self.id = Uuid::now_v7();
        self.created_at = previous.map_or(now, |p| {
            now.max(p.created_at + TimeDelta::microseconds(1))
        });
    }

    /// Checks the turn's own shape.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if a writing action has empty text.
    pub fn validate(&self) -> Result<(), DomainError> {
        let has_text = self.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        if self.action.writes() && !has_text {
            return Err(DomainError::Validation(format!(
                "Text for a `{}` turn cannot be empty.",
                self.action
            )));
        }
        Ok(())
    }

    /// True if this turn ends the story.
    #[must_use]
    pub const fn finishes(&self) -> bool {
        self.action.finishes()
    }

    /// Author's username, or an empty string when the author was not loaded.
    #[must_use]
    pub fn author_name(&self) -> &str {
        self.author.as_ref().map_or("", |u| u.username.as_str())
    }
}
