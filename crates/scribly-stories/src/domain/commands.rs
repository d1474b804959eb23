//! Commands for the story context.

use scribly_core::command::Command;
use scribly_core::error::DomainError;
use uuid::Uuid;

use super::aggregates::HiddenStatus;
use super::turn::TurnAction;

/// Most cowriters a story author may invite.
pub const MAX_INVITED_COWRITERS: usize = 3;

/// Command to start a new story in draft.
#[derive(Debug, Clone)]
pub struct StartStory {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The author.
    pub author_id: Uuid,
    /// Story title.
    pub title: String,
    /// Seed text for the author's first turn.
    pub text: String,
}

/// Command to seat cowriters and start the rotation.
#[derive(Debug, Clone)]
pub struct AddCowriters {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Must be the story's author.
    pub requester_id: Uuid,
    /// The story.
    pub story_id: Uuid,
    /// Usernames to invite, in rotation order.
    pub usernames: Vec<String>,
}

impl AddCowriters {
    /// Trimmed usernames, checked for count, blanks, and duplicates.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if there are no names, more than
    /// three, a blank one, or the same name twice (ignoring case).
    pub fn normalized_usernames(&self) -> Result<Vec<String>, DomainError> {
        let names: Vec<String> = self
            .usernames
            .iter()
            .map(|name| name.trim().to_owned())
            .collect();

        if names.is_empty() || names.len() > MAX_INVITED_COWRITERS {
            return Err(DomainError::Validation(format!(
                "Invite between 1 and {MAX_INVITED_COWRITERS} cowriters."
            )));
        }
        if names.iter().any(String::is_empty) {
            return Err(DomainError::Validation(
                "Cowriter usernames cannot be blank.".to_owned(),
            ));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].iter().any(|seen| seen.eq_ignore_ascii_case(name)) {
                return Err(DomainError::Validation(format!(
                    "{name} was listed more than once."
                )));
            }
        }
        Ok(names)
    }
}

/// Command to take the current writer's turn.
#[derive(Debug, Clone)]
pub struct TakeTurn {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The writer.
    pub user_id: Uuid,
    /// The story.
    pub story_id: Uuid,
    /// What the writer does.
    pub action: TurnAction,
    /// Text for writing actions.
    pub text: Option<String>,
}

/// Command to hide or unhide a story for one participant.
#[derive(Debug, Clone)]
pub struct HideStory {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The participant.
    pub user_id: Uuid,
    /// The story.
    pub story_id: Uuid,
    /// Requested visibility.
    pub hidden_status: HiddenStatus,
}

/// Command to remind the current writer that it is their turn.
#[derive(Debug, Clone)]
pub struct NudgeWriter {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The participant sending the nudge.
    pub nudger_id: Uuid,
    /// The writer being nudged.
    pub nudgee_id: Uuid,
    /// The story.
    pub story_id: Uuid,
}

/// Command to register a new user.
#[derive(Clone)]
pub struct SignUp {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Requested username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Plaintext password.
    pub password: String,
}

impl std::fmt::Debug for SignUp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignUp")
            .field("correlation_id", &self.correlation_id)
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Command to send (again) the email-verification message.
#[derive(Debug, Clone)]
pub struct RequestVerificationEmail {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The unverified user.
    pub user_id: Uuid,
}

/// Command to redeem an email-verification token.
#[derive(Debug, Clone)]
pub struct VerifyEmail {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The signed-in user redeeming the token.
    pub user_id: Uuid,
    /// Hex token from the verification link.
    pub token: String,
}

macro_rules! impl_command {
    ($($ty:ident => $name:literal, $actor:ident;)+) => {
        $(
            impl Command for $ty {
                fn command_type(&self) -> &'static str {
                    $name
                }

                fn correlation_id(&self) -> Uuid {
                    self.correlation_id
                }

                fn actor_id(&self) -> Option<Uuid> {
                    Some(self.$actor)
                }
            }
        )+
    };
}

impl_command! {
    StartStory => "stories.start_story", author_id;
    AddCowriters => "stories.add_cowriters", requester_id;
    TakeTurn => "stories.take_turn", user_id;
    HideStory => "stories.hide_story", user_id;
    NudgeWriter => "stories.nudge_writer", nudger_id;
    RequestVerificationEmail => "users.request_verification_email", user_id;
    VerifyEmail => "users.verify_email", user_id;
}

impl Command for SignUp {
    fn command_type(&self) -> &'static str {
        "users.sign_up"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn actor_id(&self) -> Option<Uuid> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(usernames: &[&str]) -> AddCowriters {
        AddCowriters {
            correlation_id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            story_id: Uuid::new_v4(),
            usernames: usernames.iter().map(|&n| n.to_owned()).collect(),
        }
    }

    #[test]
    fn test_usernames_are_trimmed_in_order() {
        let names = add(&[" bob", "carol "]).normalized_usernames().unwrap();

        assert_eq!(names, vec!["bob".to_owned(), "carol".to_owned()]);
    }

    #[test]
    fn test_between_one_and_three_usernames() {
        assert!(add(&[]).normalized_usernames().is_err());
        assert!(add(&["a1b2", "c3d4", "e5f6", "g7h8"]).normalized_usernames().is_err());
        assert!(add(&["a1b2", "c3d4", "e5f6"]).normalized_usernames().is_ok());
    }

    #[test]
    fn test_blank_and_duplicate_usernames_are_rejected() {
        assert!(add(&["bob", "  "]).normalized_usernames().is_err());
        assert_eq!(
            add(&["bob", "BOB"]).normalized_usernames(),
            Err(DomainError::Validation("BOB was listed more than once.".to_owned()))
        );
    }

    #[test]
    fn test_sign_up_is_anonymous_and_redacts_password() {
        let command = SignUp {
            correlation_id: Uuid::new_v4(),
            username: "zach".to_owned(),
            email: "zach@example.com".to_owned(),
            password: "hunter2hunter2".to_owned(),
        };

        assert_eq!(command.actor_id(), None);
        assert_eq!(command.command_type(), "users.sign_up");
        assert!(!format!("{command:?}").contains("hunter2"));
    }
}
