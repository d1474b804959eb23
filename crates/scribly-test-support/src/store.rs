//! In-memory `StoryStore` with serializable transactions.
//!
//! A transaction holds the whole store's lock from `begin` until it is
//! committed or dropped, and writes to a private copy that `commit` publishes.
//! Concurrent writers therefore run one after another, each reading what the
//! previous one committed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scribly_core::error::DomainError;
use scribly_stories::domain::aggregates::{
    Cowriter, HiddenStatus, Story, StoryState, UserStory, UserStoryHide,
};
use scribly_stories::domain::ports::{LoadSpec, StoryStore, StoryTransaction};
use scribly_stories::domain::turn::Turn;
use scribly_stories::domain::user::{EmailVerificationStatus, NewUser, User};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoryRow {
    id: Uuid,
    title: String,
    state: StoryState,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: Vec<(User, String)>,
    stories: HashMap<Uuid, StoryRow>,
    cowriters: Vec<(Uuid, Cowriter)>,
    turns: Vec<Turn>,
    hides: HashMap<(Uuid, Uuid), HiddenStatus>,
}

impl Tables {
    fn user(&self, user_id: Uuid) -> Option<User> {
        self.users
            .iter()
            .find(|(u, _)| u.id == user_id)
            .map(|(u, _)| u.clone())
    }

    fn user_by_name(&self, username: &str) -> Option<User> {
        self.users
            .iter()
            .find(|(u, _)| u.has_username(username))
            .map(|(u, _)| u.clone())
    }

    fn story(&self, story_id: Uuid, shape: LoadSpec) -> Option<Story> {
        let row = self.stories.get(&story_id)?;
        let mut story = Story {
            id: row.id,
            title: row.title.clone(),
            state: row.state,
            created_by: row.created_by,
            creator: None,
            cowriters: Vec::new(),
            turns: Vec::new(),
            created_at: row.created_at,
        };
        if shape.creator {
            story.creator = self.user(row.created_by);
        }
        if shape.needs_cowriters() {
            story.cowriters = self
                .cowriters
                .iter()
                .filter(|(id, _)| *id == story_id)
                .map(|(_, c)| Cowriter {
                    user: if shape.cowriter_users {
                        self.user(c.user_id)
                    } else {
                        None
                    },
                    ..c.clone()
                })
                .collect();
            story.cowriters.sort_by_key(|c| c.turn_index);
        }
        if shape.needs_turns() {
            story.turns = self
                .turns
                .iter()
                .filter(|t| t.story_id == story_id)
                .map(|t| Turn {
                    author: if shape.turn_authors {
                        self.user(t.taken_by)
                    } else {
                        None
                    },
                    ..t.clone()
                })
                .collect();
            story.turns.sort_by_key(|t| (t.created_at, t.id));
        }
        Some(story)
    }
}

/// Story store kept in memory; every handle shares the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a user directly, bypassing sign-up validation.
    pub async fn seed_user(&self, username: &str, status: EmailVerificationStatus) -> User {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_owned(),
            email: format!("{}@example.com", username.to_lowercase()),
            email_verification_status: status,
        };
        self.tables
            .lock()
            .await
            .users
            .push((user.clone(), "password123".to_owned()));
        user
    }

    /// Inserts a verified user.
    pub async fn seed_verified_user(&self, username: &str) -> User {
        self.seed_user(username, EmailVerificationStatus::Verified)
            .await
    }

    /// Number of cowriter rows for a story.
    pub async fn cowriter_rows(&self, story_id: Uuid) -> usize {
        let tables = self.tables.lock().await;
        tables.cowriters.iter().filter(|(id, _)| *id == story_id).count()
    }

    /// Number of turn rows for a story.
    pub async fn turn_rows(&self, story_id: Uuid) -> usize {
        let tables = self.tables.lock().await;
        tables.turns.iter().filter(|t| t.story_id == story_id).count()
    }

    /// Every visibility row for a (user, story) pair.
    pub async fn hide_rows(&self, user_id: Uuid, story_id: Uuid) -> Vec<HiddenStatus> {
        let tables = self.tables.lock().await;
        tables
            .hides
            .get(&(user_id, story_id))
            .copied()
            .into_iter()
            .collect()
    }
}

#[async_trait]
impl StoryStore for InMemoryStoryStore {
    async fn begin(&self) -> Result<Box<dyn StoryTransaction>, DomainError> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, staged }))
    }

    async fn find_story(
        &self,
        story_id: Uuid,
        shape: LoadSpec,
    ) -> Result<Option<Story>, DomainError> {
        Ok(self.tables.lock().await.story(story_id, shape))
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, DomainError> {
        Ok(self.tables.lock().await.user(user_id))
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DomainError> {
        Ok(self.tables.lock().await.user_by_name(username))
    }

    async fn create_user(&self, new_user: &NewUser) -> Result<User, DomainError> {
        let mut tables = self.tables.lock().await;
        if tables.user_by_name(&new_user.username).is_some() {
            return Err(DomainError::Conflict(format!(
                "Username {} is already taken",
                new_user.username
            )));
        }
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            email_verification_status: EmailVerificationStatus::Pending,
        };
        tables.users.push((user.clone(), new_user.password.clone()));
        Ok(user)
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, DomainError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .iter()
            .find(|(u, p)| u.has_username(username) && p == password)
            .map(|(u, _)| u.clone()))
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<(), DomainError> {
        let mut tables = self.tables.lock().await;
        let (user, _) = tables
            .users
            .iter_mut()
            .find(|(u, _)| u.id == user_id)
            .ok_or_else(|| DomainError::NotFound(format!("user {user_id}")))?;
        user.email_verification_status = EmailVerificationStatus::Verified;
        Ok(())
    }

    async fn list_users_except(&self, user_id: Uuid) -> Result<Vec<User>, DomainError> {
        let tables = self.tables.lock().await;
        let mut users: Vec<User> = tables
            .users
            .iter()
            .filter(|(u, _)| u.id != user_id)
            .map(|(u, _)| u.clone())
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn stories_for_user(&self, user_id: Uuid) -> Result<Vec<UserStory>, DomainError> {
        let tables = self.tables.lock().await;
        let mut stories: Vec<UserStory> = tables
            .stories
            .keys()
            .filter_map(|&id| tables.story(id, LoadSpec::full()))
            .filter(|story| story.is_participant(user_id))
            .map(|story| UserStory {
                hidden: tables
                    .hides
                    .get(&(user_id, story.id))
                    .is_some_and(|s| s.is_hidden()),
                story,
            })
            .collect();
        stories.sort_by(|a, b| b.story.created_at.cmp(&a.story.created_at));
        Ok(stories)
    }

    async fn find_hide(
        &self,
        user_id: Uuid,
        story_id: Uuid,
    ) -> Result<Option<UserStoryHide>, DomainError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .hides
            .get(&(user_id, story_id))
            .map(|&hidden_status| UserStoryHide {
                user_id,
                story_id,
                hidden_status,
            }))
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl StoryTransaction for InMemoryTransaction {
    async fn lock_story(
        &mut self,
        story_id: Uuid,
        shape: LoadSpec,
    ) -> Result<Option<Story>, DomainError> {
        Ok(self.staged.story(story_id, shape))
    }

    async fn find_users_by_usernames(
        &mut self,
        usernames: &[String],
    ) -> Result<Vec<User>, DomainError> {
        Ok(usernames
            .iter()
            .filter_map(|name| self.staged.user_by_name(name))
            .collect())
    }

    async fn insert_story(&mut self, story: &Story) -> Result<(), DomainError> {
        if self.staged.stories.contains_key(&story.id) {
            return Err(DomainError::Conflict(format!("story {} already exists", story.id)));
        }
        self.staged.stories.insert(
            story.id,
            StoryRow {
                id: story.id,
                title: story.title.clone(),
                state: story.state,
                created_by: story.created_by,
                created_at: story.created_at,
            },
        );
        for turn in &story.turns {
            self.insert_turn(turn).await?;
        }
        Ok(())
    }

    async fn insert_turn(&mut self, turn: &Turn) -> Result<(), DomainError> {
        if !self.staged.stories.contains_key(&turn.story_id) {
            return Err(DomainError::NotFound(format!("story {}", turn.story_id)));
        }
        self.staged.turns.push(Turn {
            author: None,
            ..turn.clone()
        });
        Ok(())
    }

    async fn insert_cowriters(
        &mut self,
        story_id: Uuid,
        cowriters: &[Cowriter],
    ) -> Result<(), DomainError> {
        for cowriter in cowriters {
            let duplicate = self.staged.cowriters.iter().any(|(id, c)| {
                *id == story_id
                    && (c.user_id == cowriter.user_id || c.turn_index == cowriter.turn_index)
            });
            if duplicate {
                return Err(DomainError::Conflict(format!(
                    "cowriter seat {} on story {story_id} is taken",
                    cowriter.turn_index
                )));
            }
            self.staged.cowriters.push((
                story_id,
                Cowriter {
                    user: None,
                    ..cowriter.clone()
                },
            ));
        }
        Ok(())
    }

    async fn update_story_state(
        &mut self,
        story_id: Uuid,
        state: StoryState,
    ) -> Result<(), DomainError> {
        let row = self
            .staged
            .stories
            .get_mut(&story_id)
            .ok_or_else(|| DomainError::NotFound(format!("story {story_id}")))?;
        row.state = state;
        Ok(())
    }

    async fn upsert_hide(&mut self, hide: &UserStoryHide) -> Result<(), DomainError> {
        self.staged
            .hides
            .insert((hide.user_id, hide.story_id), hide.hidden_status);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let Self { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
