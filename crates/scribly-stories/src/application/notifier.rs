//! Notification work run by the dispatcher.
//!
//! Every call reloads what it needs from the store, so a retried attempt sees
//! current state and may resend to recipients an earlier attempt reached.

use std::sync::Arc;

use async_trait::async_trait;
use scribly_core::clock::Clock;
use scribly_notifications::{Announcement, AnnouncementHandler, DeliveryError, EmailGateway};
use tracing::{debug, info};
use uuid::Uuid;

use super::emails::EmailComposer;
use super::verification::TokenCipher;
use crate::domain::aggregates::Story;
use crate::domain::ports::{LoadSpec, StoryStore};
use crate::domain::user::VerificationPayload;

/// Builds and sends the emails behind each `Announcement`.
pub struct StoryNotifier {
    store: Arc<dyn StoryStore>,
    composer: EmailComposer,
    emailer: Arc<dyn EmailGateway>,
    cipher: TokenCipher,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for StoryNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoryNotifier")
            .field("composer", &self.composer)
            .finish_non_exhaustive()
    }
}

impl StoryNotifier {
    /// Wires the notifier to its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn StoryStore>,
        composer: EmailComposer,
        emailer: Arc<dyn EmailGateway>,
        cipher: TokenCipher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            composer,
            emailer,
            cipher,
            clock,
        }
    }

    /// The composer, for synchronous emails such as nudges.
    #[must_use]
    pub fn composer(&self) -> &EmailComposer {
        &self.composer
    }

    /// The outbound gateway, for synchronous emails such as nudges.
    #[must_use]
    pub fn emailer(&self) -> &dyn EmailGateway {
        self.emailer.as_ref()
    }

    async fn load_story(&self, story_id: Uuid) -> Result<Story, DeliveryError> {
        self.store
            .find_story(story_id, LoadSpec::full())
            .await?
            .ok_or_else(|| DeliveryError::Source(format!("story {story_id} not found")))
    }

    /// Tells every cowriter they were added to a story.
    ///
    /// # Errors
    ///
    /// Returns the first `DeliveryError` hit while loading, composing, or
    /// sending.
    pub async fn send_added_to_story_emails(&self, story_id: Uuid) -> Result<(), DeliveryError> {
        let story = self.load_story(story_id).await?;
        let emails = self.composer.added_to_story(&story)?;
        for email in &emails {
            self.emailer.send_email(email).await?;
        }
        debug!(%story_id, sent = emails.len(), "added-to-story emails sent");
        Ok(())
    }

    /// Tells every cowriter about turn `turn_number`.
    ///
    /// # Errors
    ///
    /// Returns the first `DeliveryError` hit while loading, composing, or
    /// sending.
    pub async fn send_turn_notifications(
        &self,
        story_id: Uuid,
        turn_number: usize,
    ) -> Result<(), DeliveryError> {
        let story = self.load_story(story_id).await?;
        let emails = self.composer.turn_notifications(&story, turn_number)?;
        for email in &emails {
            self.emailer.send_email(email).await?;
        }
        debug!(%story_id, turn_number, sent = emails.len(), "turn notifications sent");
        Ok(())
    }

    /// Issues a fresh token and mails the verification link. Does nothing for
    /// a user who verified in the meantime.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Source` if the user is gone or the token cannot
    /// be sealed, or the gateway's error.
    pub async fn send_verification_email(&self, user_id: Uuid) -> Result<(), DeliveryError> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| DeliveryError::Source(format!("user {user_id} not found")))?;
        if user.is_verified() {
            info!(%user_id, "user already verified, skipping verification email");
            return Ok(());
        }

        let payload = VerificationPayload::issue(&user, self.clock.now());
        let token = self.cipher.seal(&payload)?;
        let email = self.composer.verification(&user, &token)?;
        self.emailer.send_email(&email).await
    }
}

#[async_trait]
impl AnnouncementHandler for StoryNotifier {
    async fn handle(&self, announcement: &Announcement) -> Result<(), DeliveryError> {
        match *announcement {
            Announcement::UserCreated { user_id } => self.send_verification_email(user_id).await,
            Announcement::CowritersAdded { story_id } => {
                self.send_added_to_story_emails(story_id).await
            }
            Announcement::TurnTaken {
                story_id,
                turn_number,
            } => self.send_turn_notifications(story_id, turn_number).await,
        }
    }
}
