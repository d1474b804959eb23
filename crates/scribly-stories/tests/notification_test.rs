//! Notifications: what is announced after commit, and how delivery failures
//! stay out of the primary path.

use std::sync::Arc;
use std::time::Duration;

use scribly_core::error::DomainError;
use scribly_stories::application::emails::EmailComposer;
use scribly_stories::application::notifier::StoryNotifier;
use scribly_stories::domain::aggregates::Story;
use scribly_stories::domain::commands::{AddCowriters, NudgeWriter, SignUp, StartStory, TakeTurn};
use scribly_stories::domain::turn::TurnAction;
use scribly_stories::domain::user::{EmailVerificationStatus, User};
use scribly_test_support::{
    FlakyEmailGateway, RecordingEmailGateway, StoryHarness, TEST_WEBSITE_URL,
};
use uuid::Uuid;

async fn seated_story(h: &StoryHarness, author: &User, usernames: &[&str]) -> Story {
    let story = h
        .service
        .start_story(&StartStory {
            correlation_id: Uuid::new_v4(),
            author_id: author.id,
            title: "The Lighthouse".to_owned(),
            text: "Once upon a time".to_owned(),
        })
        .await
        .unwrap();
    h.service
        .add_cowriters(&AddCowriters {
            correlation_id: Uuid::new_v4(),
            requester_id: author.id,
            story_id: story.id,
            usernames: usernames.iter().map(|&n| n.to_owned()).collect(),
        })
        .await
        .unwrap()
}

fn sign_up(username: &str) -> SignUp {
    SignUp {
        correlation_id: Uuid::new_v4(),
        username: username.to_owned(),
        email: format!("{username}@example.com"),
        password: "correct horse".to_owned(),
    }
}

#[tokio::test]
async fn test_cowriters_added_emails_every_verified_cowriter_but_the_author() {
    // Arrange
    let emails = Arc::new(RecordingEmailGateway::default());
    let mut h = StoryHarness::new(emails.clone());
    let a = h.store.seed_verified_user("alice").await;
    let b = h.store.seed_verified_user("bob").await;
    let c = h.store.seed_verified_user("carol").await;
    let d = h
        .store
        .seed_user("dave", EmailVerificationStatus::Pending)
        .await;

    // Act
    seated_story(&h, &a, &["bob", "carol", "dave"]).await;
    h.settle().await;

    // Assert
    assert!(emails.subjects_for(a.id).is_empty());
    assert!(emails.subjects_for(d.id).is_empty());
    assert_eq!(
        emails.subjects_for(b.id),
        vec!["alice started the story The Lighthouse - it's your turn!".to_owned()]
    );
    assert_eq!(
        emails.subjects_for(c.id),
        vec!["alice started the story The Lighthouse".to_owned()]
    );
}

#[tokio::test]
async fn test_cowriters_added_emails_survive_a_story_finished_before_delivery() {
    // Arrange
    let h = StoryHarness::new(Arc::new(RecordingEmailGateway::default()));
    let a = h.store.seed_verified_user("alice").await;
    let b = h.store.seed_verified_user("bob").await;
    let story = seated_story(&h, &a, &["bob"]).await;
    h.service
        .take_turn(&TakeTurn {
            correlation_id: Uuid::new_v4(),
            user_id: b.id,
            story_id: story.id,
            action: TurnAction::Finish,
            text: None,
        })
        .await
        .unwrap();
    let emails = Arc::new(RecordingEmailGateway::default());
    let notifier = StoryNotifier::new(
        h.store.clone(),
        EmailComposer::new(TEST_WEBSITE_URL),
        emails.clone(),
        h.cipher.clone(),
        h.clock.clone(),
    );

    // Act
    let result = notifier.send_added_to_story_emails(story.id).await;

    // Assert
    assert!(result.is_ok());
    assert_eq!(
        emails.subjects_for(b.id),
        vec!["alice started the story The Lighthouse".to_owned()]
    );
}

#[tokio::test]
async fn test_turn_taken_emails_the_others() {
    // Arrange
    let emails = Arc::new(RecordingEmailGateway::default());
    let mut h = StoryHarness::new(emails.clone());
    let a = h.store.seed_verified_user("alice").await;
    let b = h.store.seed_verified_user("bob").await;
    let c = h.store.seed_verified_user("carol").await;
    let story = seated_story(&h, &a, &["bob", "carol"]).await;

    // Act
    h.service
        .take_turn(&TakeTurn {
            correlation_id: Uuid::new_v4(),
            user_id: b.id,
            story_id: story.id,
            action: TurnAction::Write,
            text: Some("A storm rolled in.".to_owned()),
        })
        .await
        .unwrap();
    h.settle().await;

    // Assert
    let sent = emails.sent();
    let turn_emails = sent
        .iter()
        .filter(|e| !e.subject.contains("started the story"))
        .count();
    assert_eq!(turn_emails, 2);
    assert!(emails.subjects_for(b.id).iter().all(|s| s.contains("started the story")));
    assert!(
        emails
            .subjects_for(a.id)
            .contains(&"bob took their turn on The Lighthouse!".to_owned())
    );
    assert!(
        emails
            .subjects_for(c.id)
            .contains(&"It's your turn on The Lighthouse!".to_owned())
    );
}

#[tokio::test]
async fn test_delivery_that_fails_twice_succeeds_once_on_the_third_attempt() {
    // Arrange
    let gateway = Arc::new(FlakyEmailGateway::new(2));
    let mut h = StoryHarness::with_gateway(gateway.clone());

    // Act
    let result = h.service.sign_up(&sign_up("zach")).await;
    h.settle().await;

    // Assert
    assert!(result.is_ok());
    assert_eq!(gateway.attempts(), 3);
    let delivered = gateway.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].subject, "Verify your email");
    assert_eq!(h.sleeper.naps(), vec![Duration::from_secs(1); 2]);
}

#[tokio::test]
async fn test_delivery_is_dropped_after_three_attempts_without_failing_the_caller() {
    // Arrange
    let gateway = Arc::new(FlakyEmailGateway::new(u32::MAX));
    let mut h = StoryHarness::with_gateway(gateway.clone());

    // Act
    let result = h.service.sign_up(&sign_up("zach")).await;
    h.settle().await;

    // Assert
    let user = result.unwrap();
    assert_eq!(user.email_verification_status, EmailVerificationStatus::Pending);
    assert_eq!(gateway.attempts(), 3);
    assert!(gateway.delivered().is_empty());
}

#[tokio::test]
async fn test_nudge_is_sent_synchronously_to_the_current_writer() {
    // Arrange
    let emails = Arc::new(RecordingEmailGateway::default());
    let mut h = StoryHarness::new(emails.clone());
    let a = h.store.seed_verified_user("alice").await;
    let b = h.store.seed_verified_user("bob").await;
    let story = seated_story(&h, &a, &["bob"]).await;
    h.settle().await;
    emails.clear();

    // Act
    h.service
        .nudge(&NudgeWriter {
            correlation_id: Uuid::new_v4(),
            nudger_id: a.id,
            nudgee_id: b.id,
            story_id: story.id,
        })
        .await
        .unwrap();

    // Assert
    assert_eq!(
        emails.subjects_for(b.id),
        vec!["alice nudged you to take your turn on The Lighthouse".to_owned()]
    );
}

#[tokio::test]
async fn test_nudging_someone_who_is_not_up_is_a_conflict() {
    let emails = Arc::new(RecordingEmailGateway::default());
    let h = StoryHarness::new(emails.clone());
    let a = h.store.seed_verified_user("alice").await;
    h.store.seed_verified_user("bob").await;
    let story = seated_story(&h, &a, &["bob"]).await;

    let result = h
        .service
        .nudge(&NudgeWriter {
            correlation_id: Uuid::new_v4(),
            nudger_id: a.id,
            nudgee_id: a.id,
            story_id: story.id,
        })
        .await;

    assert_eq!(
        result,
        Err(DomainError::Conflict("It's not alice's turn!".to_owned()))
    );
}

#[tokio::test]
async fn test_nudge_delivery_failure_is_surfaced() {
    // Arrange
    let gateway = Arc::new(FlakyEmailGateway::new(u32::MAX));
    let h = StoryHarness::with_gateway(gateway.clone());
    let a = h.store.seed_verified_user("alice").await;
    let b = h.store.seed_verified_user("bob").await;
    let story = seated_story(&h, &a, &["bob"]).await;

    // Act
    let result = h
        .service
        .nudge(&NudgeWriter {
            correlation_id: Uuid::new_v4(),
            nudger_id: a.id,
            nudgee_id: b.id,
            story_id: story.id,
        })
        .await;

    // Assert
    assert!(matches!(result, Err(DomainError::Infrastructure(_))));
}
