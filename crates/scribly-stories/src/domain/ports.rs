//! Persistence ports for the story context.
//!
//! `StoryStore` serves pool-level reads and user bookkeeping. Every story
//! mutation goes through a `StoryTransaction`, whose `lock_story` read is the
//! snapshot that mutation validates against. Dropping a transaction without
//! calling `commit` rolls it back.

use async_trait::async_trait;
use scribly_core::error::DomainError;
use uuid::Uuid;

use super::aggregates::{Cowriter, Story, StoryState, UserStory, UserStoryHide};
use super::turn::Turn;
use super::user::{NewUser, User};

/// Which relations to materialize when reading a story.
///
/// Cowriters always come ordered by `turn_index` and turns by
/// `(created_at, id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct LoadSpec {
    /// Load the author's user row.
    pub creator: bool,
    /// Load the rotation.
    pub cowriters: bool,
    /// Load each cowriter's user row. Implies `cowriters`.
    pub cowriter_users: bool,
    /// Load the turn history.
    pub turns: bool,
    /// Load each turn's author. Implies `turns`.
    pub turn_authors: bool,
}

impl LoadSpec {
    /// Just the story row.
    #[must_use]
    pub const fn bare() -> Self {
        Self {
            creator: false,
            cowriters: false,
            cowriter_users: false,
            turns: false,
            turn_authors: false,
        }
    }

    /// Enough to decide whose turn it is.
    #[must_use]
    pub const fn for_turn() -> Self {
        Self {
            cowriters: true,
            turns: true,
            ..Self::bare()
        }
    }

    /// Enough to decide who takes part.
    #[must_use]
    pub const fn for_participants() -> Self {
        Self {
            cowriters: true,
            ..Self::bare()
        }
    }

    /// Whose turn it is, with users for addressing email.
    #[must_use]
    pub const fn for_nudge() -> Self {
        Self {
            cowriters: true,
            cowriter_users: true,
            turns: true,
            ..Self::bare()
        }
    }

    /// Everything: the shape used for rendering and notification content.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            creator: true,
            cowriters: true,
            cowriter_users: true,
            turns: true,
            turn_authors: true,
        }
    }

    /// Whether the rotation must be read.
    #[must_use]
    pub const fn needs_cowriters(self) -> bool {
        self.cowriters || self.cowriter_users
    }

    /// Whether the turn history must be read.
    #[must_use]
    pub const fn needs_turns(self) -> bool {
        self.turns || self.turn_authors
    }
}

/// Pool-level access to stories and users.
#[async_trait]
pub trait StoryStore: Send + Sync {
    /// Opens a unit of work.
    async fn begin(&self) -> Result<Box<dyn StoryTransaction>, DomainError>;

    /// Reads a story outside any transaction.
    async fn find_story(&self, story_id: Uuid, shape: LoadSpec)
    -> Result<Option<Story>, DomainError>;

    /// Point lookup of a user.
    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, DomainError>;

    /// Case-insensitive username lookup.
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DomainError>;

    /// Registers a user with a hashed password and `pending` verification.
    ///
    /// Fails with `Conflict` if the username is taken (ignoring case).
    async fn create_user(&self, new_user: &NewUser) -> Result<User, DomainError>;

    /// Checks credentials; `None` if they do not match.
    async fn authenticate(&self, username: &str, password: &str)
    -> Result<Option<User>, DomainError>;

    /// Marks a user's email as verified.
    async fn mark_email_verified(&self, user_id: Uuid) -> Result<(), DomainError>;

    /// Every user except `user_id`, ordered by username.
    async fn list_users_except(&self, user_id: Uuid) -> Result<Vec<User>, DomainError>;

    /// Stories the user authored or cowrites, with cowriter users and turns
    /// loaded, newest first.
    async fn stories_for_user(&self, user_id: Uuid) -> Result<Vec<UserStory>, DomainError>;

    /// The user's visibility row for a story, if one was ever written.
    async fn find_hide(&self, user_id: Uuid, story_id: Uuid)
    -> Result<Option<UserStoryHide>, DomainError>;
}

/// A scoped, atomic unit of work.
#[async_trait]
pub trait StoryTransaction: Send {
    /// Reads a story and locks it against concurrent mutation until the
    /// transaction ends.
    async fn lock_story(
        &mut self,
        story_id: Uuid,
        shape: LoadSpec,
    ) -> Result<Option<Story>, DomainError>;

    /// Resolves usernames case-insensitively. Unknown names are simply absent
    /// from the result.
    async fn find_users_by_usernames(
        &mut self,
        usernames: &[String],
    ) -> Result<Vec<User>, DomainError>;

    /// Inserts a new story row together with its turns.
    async fn insert_story(&mut self, story: &Story) -> Result<(), DomainError>;

    /// Appends a turn.
    async fn insert_turn(&mut self, turn: &Turn) -> Result<(), DomainError>;

    /// Inserts the rotation of a story.
    async fn insert_cowriters(
        &mut self,
        story_id: Uuid,
        cowriters: &[Cowriter],
    ) -> Result<(), DomainError>;

    /// Moves a story to `state`.
    async fn update_story_state(
        &mut self,
        story_id: Uuid,
        state: StoryState,
    ) -> Result<(), DomainError>;

    /// Inserts or replaces the (user, story) visibility row.
    async fn upsert_hide(&mut self, hide: &UserStoryHide) -> Result<(), DomainError>;

    /// Makes every write of this unit of work durable.
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;
}
