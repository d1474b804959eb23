//! Command handlers for the story context.
//!
//! Each state-changing handler runs in one `StoryTransaction`: lock and load,
//! validate against what was read inside the transaction, write, commit. Only
//! after a successful commit is the change announced to the notification
//! dispatcher, which never blocks and never reports back.

use std::sync::Arc;

use scribly_core::clock::Clock;
use scribly_core::command::Command;
use scribly_core::error::DomainError;
use scribly_notifications::{Announcement, NotificationDispatcher};
use tracing::{info, instrument};
use uuid::Uuid;

use super::notifier::StoryNotifier;
use super::verification::TokenCipher;
use crate::domain::aggregates::{Story, UserStoryHide};
use crate::domain::commands::{
    AddCowriters, HideStory, NudgeWriter, RequestVerificationEmail, SignUp, StartStory, TakeTurn,
    VerifyEmail,
};
use crate::domain::ports::{LoadSpec, StoryStore};
use crate::domain::turn::Turn;
use crate::domain::user::{EmailVerificationStatus, NewUser, User};

/// Orchestrates every state change in the story context.
pub struct StoryService {
    store: Arc<dyn StoryStore>,
    clock: Arc<dyn Clock>,
    cipher: TokenCipher,
    notifier: Arc<StoryNotifier>,
    dispatcher: NotificationDispatcher,
}

impl std::fmt::Debug for StoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryService")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

pub(crate) async fn require_user(
    store: &dyn StoryStore,
    user_id: Uuid,
) -> Result<User, DomainError> {
    store
        .find_user(user_id)
        .await?
        .ok_or_else(|| DomainError::NotFound(format!("user {user_id}")))
}

fn story_not_found(story_id: Uuid) -> DomainError {
    DomainError::NotFound(format!("story {story_id}"))
}

impl StoryService {
    /// Builds the service. `dispatcher` should be running `notifier`.
    #[must_use]
    pub fn new(
        store: Arc<dyn StoryStore>,
        clock: Arc<dyn Clock>,
        cipher: TokenCipher,
        notifier: Arc<StoryNotifier>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            clock,
            cipher,
            notifier,
            dispatcher,
        }
    }

    /// The store this service writes through.
    #[must_use]
    pub fn store(&self) -> &dyn StoryStore {
        self.store.as_ref()
    }

    /// Creates a draft story seeded with the author's first turn.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown author, `Validation` for a blank title or
    /// text, or a store error.
    #[instrument(skip_all, fields(
        command = command.command_type(),
        correlation_id = %command.correlation_id,
        user_id = %command.author_id,
    ))]
    pub async fn start_story(&self, command: &StartStory) -> Result<Story, DomainError> {
        let author = require_user(self.store.as_ref(), command.author_id).await?;
        let story = Story::start(&author, &command.title, &command.text, self.clock.now())?;

        let mut tx = self.store.begin().await?;
        tx.insert_story(&story).await?;
        tx.commit().await?;

        info!(story_id = %story.id, "story started");
        Ok(story)
    }

    /// Seats the requester and the named users, then starts the rotation.
    ///
    /// All names must resolve or nothing is written.
    ///
    /// # Errors
    ///
    /// `Validation` for a bad name list or self-nomination, `Conflict` if the
    /// requester is not the author, `InvalidState` if the story left draft,
    /// `NotFound` for an unknown story or any unresolved name.
    #[instrument(skip_all, fields(
        command = command.command_type(),
        correlation_id = %command.correlation_id,
        user_id = %command.requester_id,
        story_id = %command.story_id,
    ))]
    pub async fn add_cowriters(&self, command: &AddCowriters) -> Result<Story, DomainError> {
        let usernames = command.normalized_usernames()?;
        let requester = require_user(self.store.as_ref(), command.requester_id).await?;

        let mut tx = self.store.begin().await?;
        let mut story = tx
            .lock_story(command.story_id, LoadSpec::bare())
            .await?
            .ok_or_else(|| story_not_found(command.story_id))?;
        story.validate_can_add_cowriters(&requester, &usernames)?;

        let found = tx.find_users_by_usernames(&usernames).await?;
        let mut resolved = Vec::with_capacity(usernames.len());
        let mut missing = Vec::new();
        for name in &usernames {
            match found.iter().find(|u| u.has_username(name)) {
                Some(user) => resolved.push(user.clone()),
                None => missing.push(name.as_str()),
            }
        }
        if !missing.is_empty() {
            return Err(DomainError::NotFound(format!(
                "Could not find users: {}",
                missing.join(", ")
            )));
        }

        story.add_cowriters(&requester, resolved)?;
        tx.insert_cowriters(story.id, &story.cowriters).await?;
        tx.update_story_state(story.id, story.state).await?;
        tx.commit().await?;

        info!(cowriters = story.cowriters.len(), "cowriters added");
        self.dispatcher
            .announce(Announcement::CowritersAdded { story_id: story.id });
        Ok(story)
    }

    /// Appends the current writer's turn, finishing the story if asked.
    ///
    /// Ownership is checked against the story as locked inside the
    /// transaction, so of two racing writers only the rightful one commits.
    /// The turn is stamped under the same lock and sorts after every turn
    /// committed before it.
    ///
    /// # Errors
    ///
    /// `Validation` for a writing action without text, `InvalidState` if the
    /// story is not in progress, `Conflict` if it is not the user's turn,
    /// `NotFound` for an unknown story or user.
    #[instrument(skip_all, fields(
        command = command.command_type(),
        correlation_id = %command.correlation_id,
        user_id = %command.user_id,
        story_id = %command.story_id,
        action = %command.action,
    ))]
    pub async fn take_turn(&self, command: &TakeTurn) -> Result<Story, DomainError> {
        let mut turn = Turn::new(
            command.story_id,
            command.user_id,
            command.action,
            command.text.as_deref(),
            self.clock.now(),
        )?;
        let user = require_user(self.store.as_ref(), command.user_id).await?;

        let mut tx = self.store.begin().await?;
        let mut story = tx
            .lock_story(command.story_id, LoadSpec::for_turn())
            .await?
            .ok_or_else(|| story_not_found(command.story_id))?;
        turn.stamp_after(story.last_turn(), self.clock.now());
        let turn_number = story.take_turn(&user, turn.clone())?;
        tx.insert_turn(&turn).await?;
        if turn.finishes() {
            tx.update_story_state(story.id, story.state).await?;
        }
        tx.commit().await?;

        info!(turn_number, state = %story.state, "turn taken");
        self.dispatcher.announce(Announcement::TurnTaken {
            story_id: story.id,
            turn_number,
        });
        Ok(story)
    }

    /// Records whether a participant hides the story. Last write wins.
    ///
    /// # Errors
    ///
    /// `Conflict` for a non-participant, `NotFound` for an unknown story or
    /// user.
    #[instrument(skip_all, fields(
        command = command.command_type(),
        correlation_id = %command.correlation_id,
        user_id = %command.user_id,
        story_id = %command.story_id,
        hidden_status = %command.hidden_status,
    ))]
    pub async fn hide_story(&self, command: &HideStory) -> Result<UserStoryHide, DomainError> {
        let user = require_user(self.store.as_ref(), command.user_id).await?;
        // Participants are never removed; no lock needed.
        let story = self
            .store
            .find_story(command.story_id, LoadSpec::for_participants())
            .await?
            .ok_or_else(|| story_not_found(command.story_id))?;
        story.validate_can_hide(&user)?;

        let mut tx = self.store.begin().await?;

        let hide = UserStoryHide {
            user_id: user.id,
            story_id: story.id,
            hidden_status: command.hidden_status,
        };
        tx.upsert_hide(&hide).await?;
        tx.commit().await?;

        info!("story visibility updated");
        Ok(hide)
    }

    /// Emails the current writer a reminder, synchronously.
    ///
    /// # Errors
    ///
    /// `Conflict` if the nudge is not allowed, `NotFound` for unknown ids,
    /// `Infrastructure` if the email could not be built or sent.
    #[instrument(skip_all, fields(
        command = command.command_type(),
        correlation_id = %command.correlation_id,
        user_id = %command.nudger_id,
        nudgee_id = %command.nudgee_id,
        story_id = %command.story_id,
    ))]
    pub async fn nudge(&self, command: &NudgeWriter) -> Result<(), DomainError> {
        let nudger = require_user(self.store.as_ref(), command.nudger_id).await?;
        let nudgee = require_user(self.store.as_ref(), command.nudgee_id).await?;
        let story = self
            .store
            .find_story(command.story_id, LoadSpec::for_nudge())
            .await?
            .ok_or_else(|| story_not_found(command.story_id))?;
        story.validate_can_nudge(&nudger, &nudgee)?;

        let email = self.notifier.composer().nudge(&nudger, &nudgee, &story)?;
        self.notifier.emailer().send_email(&email).await?;

        info!("nudge sent");
        Ok(())
    }

    /// Registers a user and schedules their verification email.
    ///
    /// # Errors
    ///
    /// `Validation` for malformed input, `Conflict` for a taken username.
    #[instrument(skip_all, fields(
        command = command.command_type(),
        correlation_id = %command.correlation_id,
        username = %command.username,
    ))]
    pub async fn sign_up(&self, command: &SignUp) -> Result<User, DomainError> {
        let new_user = NewUser::new(&command.username, &command.email, command.password.clone());
        new_user.validate()?;

        let user = self.store.create_user(&new_user).await?;

        info!(user_id = %user.id, "user signed up");
        self.dispatcher
            .announce(Announcement::UserCreated { user_id: user.id });
        Ok(user)
    }

    /// Checks credentials.
    ///
    /// # Errors
    ///
    /// `Validation` if the username or password does not match.
    #[instrument(skip_all, fields(username = %username))]
    pub async fn log_in(&self, username: &str, password: &str) -> Result<User, DomainError> {
        self.store
            .authenticate(username.trim(), password)
            .await?
            .ok_or_else(|| DomainError::Validation("Invalid username or password".to_owned()))
    }

    /// Sends a verification email now, outside the dispatcher.
    ///
    /// # Errors
    ///
    /// `Conflict` if already verified, `NotFound` for an unknown user,
    /// `Infrastructure` if the email could not be sent.
    #[instrument(skip_all, fields(
        command = command.command_type(),
        correlation_id = %command.correlation_id,
        user_id = %command.user_id,
    ))]
    pub async fn request_verification_email(
        &self,
        command: &RequestVerificationEmail,
    ) -> Result<(), DomainError> {
        let user = require_user(self.store.as_ref(), command.user_id).await?;
        user.validate_can_request_verification()?;

        self.notifier.send_verification_email(user.id).await?;
        info!("verification email sent");
        Ok(())
    }

    /// Redeems a verification token for the signed-in user.
    ///
    /// # Errors
    ///
    /// `Token` if the token is malformed, expired, or issued for another
    /// user or email; `Conflict` if the user is already verified.
    #[instrument(skip_all, fields(
        command = command.command_type(),
        correlation_id = %command.correlation_id,
        user_id = %command.user_id,
    ))]
    pub async fn verify_email(&self, command: &VerifyEmail) -> Result<User, DomainError> {
        let mut user = require_user(self.store.as_ref(), command.user_id).await?;
        let payload = self.cipher.open(&command.token)?;
        user.validate_email_verification(&payload, self.clock.now())?;

        self.store.mark_email_verified(user.id).await?;
        user.email_verification_status = EmailVerificationStatus::Verified;

        info!("email verified");
        Ok(user)
    }
}
