//! The autonomous writer.
//!
//! Scribbot is an ordinary user named `scribbot`. Whenever it is the current
//! writer it may take its turn through `StoryService::take_turn`, so every
//! rule that binds humans binds it too. Where its words come from is up to the
//! `TurnTextGenerator` it is given.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use scribly_core::error::DomainError;
use scribly_core::rng::DeterministicRng;
use tracing::{info, instrument};
use uuid::Uuid;

use super::command_handlers::StoryService;
use crate::domain::aggregates::{Story, StoryState};
use crate::domain::commands::TakeTurn;
use crate::domain::turn::TurnAction;

/// Username the bot signs up under.
pub const SCRIBBOT_USERNAME: &str = "scribbot";

/// Produces the text of the bot's next turn.
#[async_trait]
pub trait TurnTextGenerator: Send + Sync {
    /// Writes the next passage for `story`, given its full history.
    async fn generate_turn_text(&self, story: &Story) -> Result<String, DomainError>;
}

/// Odds, as `chances` in `out_of`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Odds {
    /// Favourable outcomes.
    pub chances: u32,
    /// Total outcomes.
    pub out_of: u32,
}

impl Odds {
    /// `chances` in `out_of`.
    #[must_use]
    pub const fn new(chances: u32, out_of: u32) -> Self {
        Self { chances, out_of }
    }
}

/// Takes the bot's pending turns.
pub struct Scribbot {
    service: Arc<StoryService>,
    generator: Arc<dyn TurnTextGenerator>,
    rng: Mutex<Box<dyn DeterministicRng>>,
    write_odds: Odds,
    finish_odds: Odds,
}

impl std::fmt::Debug for Scribbot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scribbot")
            .field("write_odds", &self.write_odds)
            .field("finish_odds", &self.finish_odds)
            .finish_non_exhaustive()
    }
}

impl Scribbot {
    /// Always writes when it is up, and finishes one turn in twenty.
    #[must_use]
    pub fn new(
        service: Arc<StoryService>,
        generator: Arc<dyn TurnTextGenerator>,
        rng: Box<dyn DeterministicRng>,
    ) -> Self {
        Self {
            service,
            generator,
            rng: Mutex::new(rng),
            write_odds: Odds::new(1, 1),
            finish_odds: Odds::new(1, 20),
        }
    }

    /// Writes only with the given odds each time it is up.
    #[must_use]
    pub fn with_write_odds(mut self, odds: Odds) -> Self {
        self.write_odds = odds;
        self
    }

    /// Rolls the per-story decisions: write now, and if so, finish?
    fn roll(&self) -> Result<(bool, bool), DomainError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| DomainError::Infrastructure("scribbot rng lock poisoned".to_owned()))?;
        let write = rng.odds(self.write_odds.chances, self.write_odds.out_of);
        let finish = write && rng.odds(self.finish_odds.chances, self.finish_odds.out_of);
        Ok((write, finish))
    }

    /// Takes a turn on every story currently waiting on the bot.
    ///
    /// Returns the ids of the stories it wrote on.
    ///
    /// # Errors
    ///
    /// `NotFound` if the bot user does not exist; otherwise the first error
    /// from text generation or `take_turn`.
    #[instrument(skip_all)]
    pub async fn take_pending_turns(&self) -> Result<Vec<Uuid>, DomainError> {
        let store = self.service.store();
        let bot = store
            .find_user_by_username(SCRIBBOT_USERNAME)
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("user {SCRIBBOT_USERNAME}")))?;

        let mut written = Vec::new();
        for user_story in store.stories_for_user(bot.id).await? {
            let story = user_story.story;
            if story.state != StoryState::InProgress || story.current_writer_id() != Some(bot.id) {
                continue;
            }
            let (write, finish) = self.roll()?;
            if !write {
                continue;
            }

            let text = self.generator.generate_turn_text(&story).await?;
            let action = if finish {
                TurnAction::WriteAndFinish
            } else {
                TurnAction::Write
            };
            self.service
                .take_turn(&TakeTurn {
                    correlation_id: Uuid::new_v4(),
                    user_id: bot.id,
                    story_id: story.id,
                    action,
                    text: Some(text),
                })
                .await?;
            info!(story_id = %story.id, %action, "scribbot took its turn");
            written.push(story.id);
        }
        Ok(written)
    }
}
