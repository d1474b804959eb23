//! Email composition.
//!
//! Pure functions from loaded story state to `Email` values. Every function
//! expects the story in `LoadSpec::full()` shape and reports a missing
//! relation as `DeliveryError::Source`.

use askama::Template;
use scribly_notifications::{DeliveryError, Email, Recipient};

use crate::domain::aggregates::{Cowriter, Story};
use crate::domain::turn::{Turn, TurnAction};
use crate::domain::user::User;

#[derive(Template)]
#[template(path = "email/added_to_story.html")]
struct AddedToStoryEmail<'a> {
    website_url: &'a str,
    recipient: &'a str,
    author: &'a str,
    title: &'a str,
    story_url: &'a str,
    seed_text: &'a str,
    cowriters: Vec<&'a str>,
    your_turn: bool,
    current_writer: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "email/turn_notification.html")]
struct TurnNotificationEmail<'a> {
    website_url: &'a str,
    recipient: &'a str,
    author: &'a str,
    title: &'a str,
    story_url: &'a str,
    action: &'a str,
    text: Option<&'a str>,
    finished: bool,
    your_turn: bool,
    next_writer: &'a str,
}

#[derive(Template)]
#[template(path = "email/nudge.html")]
struct NudgeEmail<'a> {
    website_url: &'a str,
    recipient: &'a str,
    nudger: &'a str,
    title: &'a str,
    story_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/verification.html")]
struct VerificationEmail<'a> {
    website_url: &'a str,
    recipient: &'a str,
    verification_url: &'a str,
}

impl From<&User> for Recipient {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

/// Builds notification emails with links back to the website.
#[derive(Debug, Clone)]
pub struct EmailComposer {
    website_url: String,
}

impl EmailComposer {
    /// `website_url` is the public base URL; a trailing slash is ignored.
    #[must_use]
    pub fn new(website_url: &str) -> Self {
        Self {
            website_url: website_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Public base URL without trailing slash.
    #[must_use]
    pub fn website_url(&self) -> &str {
        &self.website_url
    }

    fn story_url(&self, story: &Story) -> String {
        format!("{}/stories/{}", self.website_url, story.id)
    }

    /// One email per verified cowriter other than the author, sent when the
    /// rotation is first seated. A story that already finished has no current
    /// writer, so nobody gets the "your turn" line.
    ///
    /// # Errors
    ///
    /// `DeliveryError::Source` for missing relations, `Render` if a template
    /// fails.
    pub fn added_to_story(&self, story: &Story) -> Result<Vec<Email>, DeliveryError> {
        let author = creator(story)?;
        let seats = seated_users(story)?;
        let current_writer = story.current_writer();
        let story_url = self.story_url(story);
        let seed_text = story
            .turns
            .first()
            .and_then(|t| t.text.as_deref())
            .unwrap_or_default();
        let cowriters: Vec<&str> = seats.iter().map(|u| u.username.as_str()).collect();

        seats
            .iter()
            .filter(|u| u.id != story.created_by && u.is_verified())
            .map(|recipient| {
                let your_turn = current_writer.is_some_and(|w| w.id == recipient.id);
                let body = AddedToStoryEmail {
                    website_url: &self.website_url,
                    recipient: &recipient.username,
                    author: &author.username,
                    title: &story.title,
                    story_url: &story_url,
                    seed_text,
                    cowriters: cowriters.clone(),
                    your_turn,
                    current_writer: current_writer.map(|w| w.username.as_str()),
                }
                .render()
                .map_err(render_error)?;

                let mut subject = format!("{} started the story {}", author.username, story.title);
                if your_turn {
                    subject.push_str(" - it's your turn!");
                }
                Ok(Email {
                    subject,
                    body,
                    to: Recipient::from(*recipient),
                })
            })
            .collect()
    }

    /// One email per verified cowriter other than the turn's author, describing
    /// turn number `turn_number` (1-based) and who writes next.
    ///
    /// # Errors
    ///
    /// `DeliveryError::Source` for missing relations or an unknown turn,
    /// `Render` if a template fails.
    pub fn turn_notifications(
        &self,
        story: &Story,
        turn_number: usize,
    ) -> Result<Vec<Email>, DeliveryError> {
        let turn = turn_number
            .checked_sub(1)
            .and_then(|i| story.turns.get(i))
            .ok_or_else(|| source(story, &format!("turn {turn_number}")))?;
        let author = turn_author(story, turn)?;
        let seats = seated_users(story)?;
        let next_writer = next_writer_after(story, turn_number, turn)?;
        let story_url = self.story_url(story);

        seats
            .iter()
            .filter(|u| u.id != turn.taken_by && u.is_verified())
            .map(|recipient| {
                let your_turn = next_writer.is_some_and(|w| w.id == recipient.id);
                let body = TurnNotificationEmail {
                    website_url: &self.website_url,
                    recipient: &recipient.username,
                    author: &author.username,
                    title: &story.title,
                    story_url: &story_url,
                    action: describe(turn.action),
                    text: turn.text.as_deref(),
                    finished: turn.finishes(),
                    your_turn,
                    next_writer: next_writer.map_or("", |w| w.username.as_str()),
                }
                .render()
                .map_err(render_error)?;

                let subject = if turn.finishes() {
                    format!("{} is done!", story.title)
                } else if your_turn {
                    format!("It's your turn on {}!", story.title)
                } else {
                    format!("{} took their turn on {}!", author.username, story.title)
                };
                Ok(Email {
                    subject,
                    body,
                    to: Recipient::from(*recipient),
                })
            })
            .collect()
    }

    /// The reminder sent to the current writer.
    ///
    /// # Errors
    ///
    /// `DeliveryError::Render` if the template fails.
    pub fn nudge(&self, nudger: &User, nudgee: &User, story: &Story) -> Result<Email, DeliveryError> {
        let body = NudgeEmail {
            website_url: &self.website_url,
            recipient: &nudgee.username,
            nudger: &nudger.username,
            title: &story.title,
            story_url: &self.story_url(story),
        }
        .render()
        .map_err(render_error)?;

        Ok(Email {
            subject: format!(
                "{} nudged you to take your turn on {}",
                nudger.username, story.title
            ),
            body,
            to: Recipient::from(nudgee),
        })
    }

    /// The message carrying a verification link for `token`.
    ///
    /// # Errors
    ///
    /// `DeliveryError::Render` if the template fails.
    pub fn verification(&self, user: &User, token: &str) -> Result<Email, DeliveryError> {
        let verification_url = self.verification_url(token);
        let body = VerificationEmail {
            website_url: &self.website_url,
            recipient: &user.username,
            verification_url: &verification_url,
        }
        .render()
        .map_err(render_error)?;

        Ok(Email {
            subject: "Verify your email".to_owned(),
            body,
            to: Recipient::from(user),
        })
    }

    /// Link a user follows to redeem `token`.
    #[must_use]
    pub fn verification_url(&self, token: &str) -> String {
        format!("{}/email-verification?token={token}", self.website_url)
    }
}

fn source(story: &Story, what: &str) -> DeliveryError {
    DeliveryError::Source(format!("story {} was loaded without its {what}", story.id))
}

#[allow(clippy::needless_pass_by_value)]
fn render_error(err: askama::Error) -> DeliveryError {
    DeliveryError::Render(err.to_string())
}

fn creator(story: &Story) -> Result<&User, DeliveryError> {
    story.creator.as_ref().ok_or_else(|| source(story, "creator"))
}

fn seated_users(story: &Story) -> Result<Vec<&User>, DeliveryError> {
    if story.cowriters.is_empty() {
        return Err(source(story, "cowriters"));
    }
    story
        .cowriters
        .iter()
        .map(|c| c.user.as_ref().ok_or_else(|| source(story, "cowriter users")))
        .collect()
}

fn turn_author<'a>(story: &Story, turn: &'a Turn) -> Result<&'a User, DeliveryError> {
    turn.author
        .as_ref()
        .ok_or_else(|| source(story, "turn authors"))
}

/// Who was up right after turn `turn_number`; `None` once it finished the story.
fn next_writer_after<'a>(
    story: &'a Story,
    turn_number: usize,
    turn: &Turn,
) -> Result<Option<&'a User>, DeliveryError> {
    if turn.finishes() || story.cowriters.is_empty() {
        return Ok(None);
    }
    let seat: &Cowriter = &story.cowriters[turn_number % story.cowriters.len()];
    seat.user
        .as_ref()
        .map(Some)
        .ok_or_else(|| source(story, "cowriter users"))
}

const fn describe(action: TurnAction) -> &'static str {
    match action {
        TurnAction::Write => "wrote",
        TurnAction::Pass => "passed",
        TurnAction::Finish => "finished the story",
        TurnAction::WriteAndFinish => "wrote the ending",
    }
}
