//! Query handlers for the story context.
//!
//! Read-only views assembled from the store; nothing here takes a lock.

use scribly_core::error::DomainError;
use serde::Serialize;
use uuid::Uuid;

use super::command_handlers::require_user;
use crate::domain::aggregates::{Story, StoryState, UserStory};
use crate::domain::ports::{LoadSpec, StoryStore};
use crate::domain::user::User;

/// A story as rendered for one participant.
#[derive(Debug, Serialize)]
pub struct UserStoryView {
    /// The story in full aggregation shape.
    pub story: Story,
    /// Whether the viewer hid it.
    pub hidden: bool,
    /// Whether the viewer is the current writer.
    pub is_your_turn: bool,
    /// The current writer, while in progress.
    pub current_writer: Option<User>,
}

/// One line in a user's story lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorySummary {
    /// The story.
    pub story_id: Uuid,
    /// Title.
    pub title: String,
    /// Lifecycle state.
    pub state: StoryState,
    /// Username of the current writer, while in progress.
    pub current_writer: Option<String>,
    /// Turns taken, the seed included.
    pub turn_count: usize,
}

/// The signed-in user's home page.
#[derive(Debug, Serialize)]
pub struct MeView {
    /// The user, freshly loaded.
    pub user: User,
    /// Stories the user started that have no cowriters yet.
    pub drafts: Vec<StorySummary>,
    /// Stories waiting on the user.
    pub your_turn: Vec<StorySummary>,
    /// Stories waiting on someone else.
    pub waiting_for_others: Vec<StorySummary>,
    /// Finished stories.
    pub done: Vec<StorySummary>,
    /// Stories the user hid, whatever their state.
    pub hidden: Vec<StorySummary>,
}

fn summarize(story: &Story) -> StorySummary {
    StorySummary {
        story_id: story.id,
        title: story.title.clone(),
        state: story.state,
        current_writer: story.current_writer().map(|u| u.username.clone()),
        turn_count: story.turn_count(),
    }
}

/// Retrieves a story for a participant.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the story does not exist or the user is
/// not part of it.
pub async fn get_user_story(
    user: &User,
    story_id: Uuid,
    store: &dyn StoryStore,
) -> Result<UserStoryView, DomainError> {
    let story = store
        .find_story(story_id, LoadSpec::full())
        .await?
        .filter(|s| s.is_participant(user.id))
        .ok_or_else(|| DomainError::NotFound(format!("story {story_id}")))?;
    let hidden = store
        .find_hide(user.id, story_id)
        .await?
        .is_some_and(|h| h.hidden_status.is_hidden());

    Ok(UserStoryView {
        is_your_turn: story.current_writer_id() == Some(user.id),
        current_writer: story.current_writer().cloned(),
        hidden,
        story,
    })
}

/// Sorts every story the user takes part in into the home-page buckets.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the user no longer exists.
pub async fn get_me(user_id: Uuid, store: &dyn StoryStore) -> Result<MeView, DomainError> {
    let user = require_user(store, user_id).await?;
    let mut view = MeView {
        user,
        drafts: Vec::new(),
        your_turn: Vec::new(),
        waiting_for_others: Vec::new(),
        done: Vec::new(),
        hidden: Vec::new(),
    };

    for UserStory { story, hidden } in store.stories_for_user(user_id).await? {
        let summary = summarize(&story);
        let bucket = if hidden {
            &mut view.hidden
        } else {
            match story.state {
                StoryState::Draft => &mut view.drafts,
                StoryState::Done => &mut view.done,
                StoryState::InProgress if story.current_writer_id() == Some(user_id) => {
                    &mut view.your_turn
                }
                StoryState::InProgress => &mut view.waiting_for_others,
            }
        };
        bucket.push(summary);
    }
    Ok(view)
}

/// Everyone the user could invite as a cowriter.
///
/// # Errors
///
/// Returns a store error.
pub async fn user_suggestions(
    user: &User,
    store: &dyn StoryStore,
) -> Result<Vec<User>, DomainError> {
    store.list_users_except(user.id).await
}
