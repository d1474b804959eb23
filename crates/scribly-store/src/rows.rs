//! Database row types and their conversion into domain values.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use scribly_core::error::DomainError;
use scribly_stories::domain::aggregates::{Cowriter, Story, StoryState};
use scribly_stories::domain::turn::{Turn, TurnAction};
use scribly_stories::domain::user::{EmailVerificationStatus, User};
use uuid::Uuid;

/// Parses a text column into a domain enum, treating a bad value as corrupt
/// data rather than bad input.
fn parse_column<T>(column: &str, value: &str) -> Result<T, DomainError>
where
    T: FromStr<Err = DomainError>,
{
    value.parse().map_err(|_| {
        DomainError::Infrastructure(format!("data corruption: unexpected {column} '{value}'"))
    })
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub email_verification_status: String,
}

impl TryFrom<UserRow> for User {
    type Error = DomainError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            username: row.username,
            email: row.email,
            email_verification_status: parse_column::<EmailVerificationStatus>(
                "email_verification_status",
                &row.email_verification_status,
            )?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StoryRow {
    pub id: Uuid,
    pub title: String,
    pub state: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<StoryRow> for Story {
    type Error = DomainError;

    fn try_from(row: StoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            title: row.title,
            state: parse_column::<StoryState>("state", &row.state)?,
            created_by: row.created_by,
            creator: None,
            cowriters: Vec::new(),
            turns: Vec::new(),
            created_at: row.created_at,
        })
    }
}

/// A seat in the rotation joined with its user.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CowriterRow {
    pub user_id: Uuid,
    pub turn_index: i32,
    pub username: String,
    pub email: String,
    pub email_verification_status: String,
}

impl CowriterRow {
    pub(crate) fn into_cowriter(self, with_user: bool) -> Result<Cowriter, DomainError> {
        let turn_index = u32::try_from(self.turn_index).map_err(|_| {
            DomainError::Infrastructure(format!(
                "data corruption: negative turn_index {}",
                self.turn_index
            ))
        })?;
        let user = if with_user {
            Some(User::try_from(UserRow {
                id: self.user_id,
                username: self.username,
                email: self.email,
                email_verification_status: self.email_verification_status,
            })?)
        } else {
            None
        };
        Ok(Cowriter {
            user_id: self.user_id,
            turn_index,
            user,
        })
    }
}

/// A turn joined with the user who took it.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TurnRow {
    pub id: Uuid,
    pub story_id: Uuid,
    pub taken_by: Uuid,
    pub action: String,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub username: String,
    pub email: String,
    pub email_verification_status: String,
}

impl TurnRow {
    pub(crate) fn into_turn(self, with_author: bool) -> Result<Turn, DomainError> {
        let author = if with_author {
            Some(User::try_from(UserRow {
                id: self.taken_by,
                username: self.username,
                email: self.email,
                email_verification_status: self.email_verification_status,
            })?)
        } else {
            None
        };
        Ok(Turn {
            id: self.id,
            story_id: self.story_id,
            taken_by: self.taken_by,
            author,
            action: parse_column::<TurnAction>("action", &self.action)?,
            text: self.text,
            created_at: self.created_at,
        })
    }
}
