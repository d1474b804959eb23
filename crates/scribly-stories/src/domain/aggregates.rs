//! The story aggregate and its rotation rules.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use scribly_core::error::DomainError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::turn::{Turn, TurnAction};
use super::user::User;

/// Lifecycle of a story. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryState {
    /// Seeded by its author, no cowriters yet.
    Draft,
    /// Cowriters are taking turns.
    InProgress,
    /// Finished; no more turns.
    Done,
}

impl StoryState {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for StoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(DomainError::Validation(format!(
                "Unknown story state '{other}'"
            ))),
        }
    }
}

/// A user's seat in a story's rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cowriter {
    /// The participating user.
    pub user_id: Uuid,
    /// 0-based rotation position; the author holds 0.
    pub turn_index: u32,
    /// The user, when loaded.
    pub user: Option<User>,
}

/// The story aggregate.
///
/// Which relations are populated depends on the `LoadSpec` it was read with;
/// callers load what their validation needs before calling in here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Story {
    /// Story identifier.
    pub id: Uuid,
    /// Title.
    pub title: String,
    /// Lifecycle state.
    pub state: StoryState,
    /// The author.
    pub created_by: Uuid,
    /// The author, when loaded.
    pub creator: Option<User>,
    /// Rotation, ordered by `turn_index`.
    pub cowriters: Vec<Cowriter>,
    /// History, ordered by creation.
    pub turns: Vec<Turn>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Story {
    /// Starts a draft story seeded with the author's first turn.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the title or seed text is blank.
    pub fn start(
        author: &User,
        title: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DomainError::Validation(
                "A story needs a title.".to_owned(),
            ));
        }

        let id = Uuid::new_v4();
        let mut seed = Turn::new(id, author.id, TurnAction::Write, Some(text), now)?;
        seed.author = Some(author.clone());

        Ok(Self {
            id,
            title: title.to_owned(),
            state: StoryState::Draft,
            created_by: author.id,
            creator: Some(author.clone()),
            cowriters: Vec::new(),
            turns: vec![seed],
            created_at: now,
        })
    }

    /// The writer whose turn it is: `cowriters[turns % cowriters]`.
    ///
    /// `None` unless the story is in progress.
    #[must_use]
    pub fn current_writer_id(&self) -> Option<Uuid> {
        self.current_cowriter().map(|c| c.user_id)
    }

    /// The current writer's user, if cowriter users were loaded.
    #[must_use]
    pub fn current_writer(&self) -> Option<&User> {
        self.current_cowriter().and_then(|c| c.user.as_ref())
    }

    fn current_cowriter(&self) -> Option<&Cowriter> {
        if self.state != StoryState::InProgress || self.cowriters.is_empty() {
            return None;
        }
        self.cowriters.get(self.turns.len() % self.cowriters.len())
    }

    /// True for the author and every cowriter.
    #[must_use]
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.created_by == user_id || self.cowriters.iter().any(|c| c.user_id == user_id)
    }

    /// Number of turns taken, the seed included.
    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// The most recent turn.
    #[must_use]
    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Only the author may add cowriters, only once, and never themselves.
    ///
    /// # Errors
    ///
    /// `Conflict` if `requester` is not the author, `InvalidState` if the story
    /// has left draft, `Validation` if `usernames` names the requester.
    pub fn validate_can_add_cowriters(
        &self,
        requester: &User,
        usernames: &[String],
    ) -> Result<(), DomainError> {
        if self.created_by != requester.id {
            return Err(DomainError::Conflict(format!(
                "User {} cannot add cowriters to story {} created by {}",
                requester.id, self.id, self.created_by
            )));
        }
        if self.state != StoryState::Draft {
            return Err(DomainError::InvalidState(format!(
                "Story must be in state '{}' to add cowriters. Story {} is in state '{}'.",
                StoryState::Draft,
                self.id,
                self.state
            )));
        }
        if usernames.iter().any(|name| requester.has_username(name)) {
            return Err(DomainError::Validation(
                "You cannot add yourself as a cowriter.".to_owned(),
            ));
        }
        Ok(())
    }

    /// Seats `[requester] + users` in that order and moves the story to
    /// `in_progress`.
    ///
    /// # Errors
    ///
    /// Same as `validate_can_add_cowriters`.
    pub fn add_cowriters(&mut self, requester: &User, users: Vec<User>) -> Result<(), DomainError> {
        let usernames: Vec<String> = users.iter().map(|u| u.username.clone()).collect();
        self.validate_can_add_cowriters(requester, &usernames)?;

        self.cowriters = std::iter::once(requester.clone())
            .chain(users)
            .zip(0_u32..)
            .map(|(user, turn_index)| Cowriter {
                user_id: user.id,
                turn_index,
                user: Some(user),
            })
            .collect();
        self.state = StoryState::InProgress;
        Ok(())
    }

    /// Only the current writer of an in-progress story may act.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the story is not in progress, `Conflict` if it is not
    /// `user`'s turn.
    pub fn validate_can_take_turn(&self, user: &User) -> Result<(), DomainError> {
        if self.state != StoryState::InProgress {
            return Err(DomainError::InvalidState(format!(
                "Story {} is in state '{}'; turns can only be taken while it is '{}'.",
                self.id,
                self.state,
                StoryState::InProgress
            )));
        }
        if self.current_writer_id() != Some(user.id) {
            return Err(DomainError::Conflict(format!(
                "It is not {}'s turn!",
                user.username
            )));
        }
        Ok(())
    }

    /// Appends `turn` and finishes the story if the turn says so.
    ///
    /// Returns the 1-based position of the new turn.
    ///
    /// # Errors
    ///
    /// Turn-shape `Validation` errors, plus those of `validate_can_take_turn`.
    pub fn take_turn(&mut self, user: &User, turn: Turn) -> Result<usize, DomainError> {
        turn.validate()?;
        self.validate_can_take_turn(user)?;
        if turn.story_id != self.id || turn.taken_by != user.id {
            return Err(DomainError::Validation(format!(
                "Turn {} does not belong to story {} and user {}",
                turn.id, self.id, user.id
            )));
        }

        if turn.finishes() {
            self.state = StoryState::Done;
        }
        self.turns.push(turn);
        Ok(self.turns.len())
    }

    /// Nudges go from a participant to the current writer, who must be able to
    /// receive email.
    ///
    /// # Errors
    ///
    /// `Conflict` if `nudger` is not part of the story, if it is not
    /// `nudgee`'s turn, or if `nudgee` has not verified their email.
    pub fn validate_can_nudge(&self, nudger: &User, nudgee: &User) -> Result<(), DomainError> {
        if !self.is_participant(nudger.id) {
            return Err(DomainError::Conflict(
                "You can't send a nudge for a story you're not a part of!".to_owned(),
            ));
        }
        if self.current_writer_id() != Some(nudgee.id) {
            return Err(DomainError::Conflict(format!(
                "It's not {}'s turn!",
                nudgee.username
            )));
        }
        if !nudgee.is_verified() {
            return Err(DomainError::Conflict(format!(
                "{} hasn't verified their email yet!",
                nudgee.username
            )));
        }
        Ok(())
    }

    /// Only participants may hide a story from their own lists.
    ///
    /// # Errors
    ///
    /// `Conflict` if `user` is not part of the story.
    pub fn validate_can_hide(&self, user: &User) -> Result<(), DomainError> {
        if !self.is_participant(user.id) {
            return Err(DomainError::Conflict(format!(
                "User {} is not involved with story {}",
                user.id, self.id
            )));
        }
        Ok(())
    }
}

/// Per-user visibility of a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HiddenStatus {
    /// Hidden from the user's lists.
    Hidden,
    /// Visible.
    Unhidden,
}

impl HiddenStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hidden => "hidden",
            Self::Unhidden => "unhidden",
        }
    }

    /// True for `Hidden`.
    #[must_use]
    pub const fn is_hidden(self) -> bool {
        matches!(self, Self::Hidden)
    }
}

impl fmt::Display for HiddenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HiddenStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hidden" => Ok(Self::Hidden),
            "unhidden" => Ok(Self::Unhidden),
            other => Err(DomainError::Validation(format!(
                "Unknown hidden status '{other}'"
            ))),
        }
    }
}

/// One row per (user, story); the latest write wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserStoryHide {
    /// The user.
    pub user_id: Uuid,
    /// The story.
    pub story_id: Uuid,
    /// Latest status.
    pub hidden_status: HiddenStatus,
}

/// A story as seen by one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStory {
    /// The story, with cowriter users and turns loaded.
    pub story: Story,
    /// Whether the participant hid it.
    pub hidden: bool,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::user::EmailVerificationStatus;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn user(username: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: username.to_owned(),
            email: format!("{username}@example.com"),
            email_verification_status: EmailVerificationStatus::Verified,
        }
    }

    fn turn(story: &Story, by: &User, action: TurnAction, text: Option<&str>) -> Turn {
        Turn::new(story.id, by.id, action, text, now()).unwrap()
    }

    fn story_with_cowriters() -> (Story, User, User, User) {
        let (a, b, c) = (user("alice"), user("bob"), user("carol"));
        let mut story = Story::start(&a, "The Lighthouse", "Once upon a time", now()).unwrap();
        story.add_cowriters(&a, vec![b.clone(), c.clone()]).unwrap();
        (story, a, b, c)
    }

    #[test]
    fn test_start_creates_a_draft_with_a_seed_turn() {
        // Arrange
        let author = user("alice");

        // Act
        let story = Story::start(&author, "  The Lighthouse ", "Once upon a time", now()).unwrap();

        // Assert
        assert_eq!(story.title, "The Lighthouse");
        assert_eq!(story.state, StoryState::Draft);
        assert_eq!(story.turn_count(), 1);
        assert_eq!(story.turns[0].taken_by, author.id);
        assert_eq!(story.turns[0].action, TurnAction::Write);
        assert_eq!(story.current_writer_id(), None);
    }

    #[test]
    fn test_start_rejects_blank_seed_text() {
        let result = Story::start(&user("alice"), "Title", "  ", now());

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_cowriters_are_seated_author_first() {
        // Arrange / Act
        let (story, a, b, c) = story_with_cowriters();

        // Assert
        let seats: Vec<(Uuid, u32)> = story
            .cowriters
            .iter()
            .map(|cw| (cw.user_id, cw.turn_index))
            .collect();
        assert_eq!(seats, vec![(a.id, 0), (b.id, 1), (c.id, 2)]);
        assert_eq!(story.state, StoryState::InProgress);
    }

    #[test]
    fn test_rotation_follows_turn_count_modulo_cowriters() {
        // Arrange
        let (mut story, a, b, c) = story_with_cowriters();

        // Act / Assert: the seed turn counts, so bob goes first.
        assert_eq!(story.current_writer_id(), Some(b.id));
        let t = turn(&story, &b, TurnAction::Write, Some("A storm rolled in."));
        assert_eq!(story.take_turn(&b, t).unwrap(), 2);
        assert_eq!(story.current_writer_id(), Some(c.id));
        let t = turn(&story, &c, TurnAction::Pass, None);
        assert_eq!(story.take_turn(&c, t).unwrap(), 3);
        assert_eq!(story.current_writer_id(), Some(a.id));
        let t = turn(&story, &a, TurnAction::Write, Some("The lamp went dark."));
        assert_eq!(story.take_turn(&a, t).unwrap(), 4);
        assert_eq!(story.current_writer_id(), Some(b.id));
        assert_eq!(story.current_writer().map(|u| u.username.as_str()), Some("bob"));
    }

    #[test]
    fn test_out_of_turn_writer_is_a_conflict() {
        let (story, a, _b, _c) = story_with_cowriters();

        let result = story.validate_can_take_turn(&a);

        assert_eq!(
            result,
            Err(DomainError::Conflict("It is not alice's turn!".to_owned()))
        );
    }

    #[test]
    fn test_finishing_turn_closes_the_story() {
        // Arrange
        let (mut story, _a, b, c) = story_with_cowriters();
        let t = turn(&story, &b, TurnAction::WriteAndFinish, Some("The end."));

        // Act
        story.take_turn(&b, t).unwrap();

        // Assert
        assert_eq!(story.state, StoryState::Done);
        assert_eq!(story.current_writer_id(), None);
        assert!(matches!(
            story.validate_can_take_turn(&c),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn test_turn_on_a_draft_is_invalid_state() {
        let author = user("alice");
        let story = Story::start(&author, "Title", "Seed", now()).unwrap();

        assert!(matches!(
            story.validate_can_take_turn(&author),
            Err(DomainError::InvalidState(_))
        ));
    }

    #[test]
    fn test_self_nomination_is_rejected_regardless_of_case() {
        let author = user("Zach");
        let story = Story::start(&author, "Title", "Seed", now()).unwrap();

        for name in ["zach", "ZACH"] {
            let result = story.validate_can_add_cowriters(&author, &[name.to_owned()]);

            let Err(DomainError::Validation(message)) = result else {
                panic!("expected validation error for {name}");
            };
            assert!(message.contains("cannot add yourself"));
        }
    }

    #[test]
    fn test_only_the_author_adds_cowriters() {
        let author = user("alice");
        let story = Story::start(&author, "Title", "Seed", now()).unwrap();

        let result = story.validate_can_add_cowriters(&user("mallory"), &["bob".to_owned()]);

        assert!(matches!(result, Err(DomainError::Conflict(_))));
    }

    #[test]
    fn test_cowriters_can_only_be_added_once() {
        let (story, a, _b, _c) = story_with_cowriters();

        let result = story.validate_can_add_cowriters(&a, &["dave".to_owned()]);

        assert!(matches!(result, Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn test_nudge_rules() {
        // Arrange
        let (story, a, mut b, c) = story_with_cowriters();
        let outsider = user("mallory");

        // Act / Assert
        assert!(story.validate_can_nudge(&a, &b).is_ok());
        assert!(story.validate_can_nudge(&outsider, &b).is_err());
        assert!(story.validate_can_nudge(&a, &c).is_err());
        b.email_verification_status = EmailVerificationStatus::Pending;
        assert_eq!(
            story.validate_can_nudge(&a, &b),
            Err(DomainError::Conflict(
                "bob hasn't verified their email yet!".to_owned()
            ))
        );
    }

    #[test]
    fn test_hide_requires_participation() {
        let (story, _a, b, _c) = story_with_cowriters();

        assert!(story.validate_can_hide(&b).is_ok());
        assert!(matches!(
            story.validate_can_hide(&user("mallory")),
            Err(DomainError::Conflict(_))
        ));
    }
}
