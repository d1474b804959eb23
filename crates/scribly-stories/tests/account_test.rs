//! Sign-up, log-in, and email verification through the story service.

use std::sync::Arc;

use chrono::Duration;
use scribly_core::error::DomainError;
use scribly_stories::domain::commands::{RequestVerificationEmail, SignUp, VerifyEmail};
use scribly_stories::domain::ports::StoryStore;
use scribly_stories::domain::user::{EmailVerificationStatus, VerificationPayload};
use scribly_test_support::{RecordingEmailGateway, StoryHarness, TEST_WEBSITE_URL};
use uuid::Uuid;

fn sign_up(username: &str, email: &str, password: &str) -> SignUp {
    SignUp {
        correlation_id: Uuid::new_v4(),
        username: username.to_owned(),
        email: email.to_owned(),
        password: password.to_owned(),
    }
}

fn verify(user_id: Uuid, token: &str) -> VerifyEmail {
    VerifyEmail {
        correlation_id: Uuid::new_v4(),
        user_id,
        token: token.to_owned(),
    }
}

#[tokio::test]
async fn test_sign_up_then_verify_with_the_emailed_link() {
    // Arrange
    let emails = Arc::new(RecordingEmailGateway::default());
    let mut h = StoryHarness::new(emails.clone());
    let user = h
        .service
        .sign_up(&sign_up("zach", "zach@example.com", "correct horse"))
        .await
        .unwrap();
    h.settle().await;
    let sent = emails.sent();
    let prefix = format!("{TEST_WEBSITE_URL}/email-verification?token=");
    let token: String = sent[0]
        .body
        .split(&prefix)
        .nth(1)
        .unwrap()
        .chars()
        .take_while(char::is_ascii_hexdigit)
        .collect();

    // Act
    let verified = h.service.verify_email(&verify(user.id, &token)).await.unwrap();

    // Assert
    assert_eq!(
        verified.email_verification_status,
        EmailVerificationStatus::Verified
    );
    let stored = h.store.find_user(user.id).await.unwrap().unwrap();
    assert!(stored.is_verified());
}

#[tokio::test]
async fn test_token_expires_after_twenty_four_hours() {
    // Arrange
    let h = StoryHarness::new(Arc::new(RecordingEmailGateway::default()));
    let user = h
        .store
        .seed_user("zach", EmailVerificationStatus::Pending)
        .await;
    let token = h
        .cipher
        .seal(&VerificationPayload::issue(&user, StoryHarness::start_time()))
        .unwrap();
    h.clock.advance(Duration::hours(24) + Duration::minutes(1));

    // Act
    let result = h.service.verify_email(&verify(user.id, &token)).await;

    // Assert
    assert_eq!(result, Err(DomainError::Token("token has expired".to_owned())));
    let stored = h.store.find_user(user.id).await.unwrap().unwrap();
    assert!(!stored.is_verified());
}

#[tokio::test]
async fn test_token_is_accepted_a_minute_before_expiry() {
    let h = StoryHarness::new(Arc::new(RecordingEmailGateway::default()));
    let user = h
        .store
        .seed_user("zach", EmailVerificationStatus::Pending)
        .await;
    let token = h
        .cipher
        .seal(&VerificationPayload::issue(&user, StoryHarness::start_time()))
        .unwrap();
    h.clock.advance(Duration::hours(23) + Duration::minutes(59));

    let result = h.service.verify_email(&verify(user.id, &token)).await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_token_issued_to_someone_else_is_rejected() {
    let h = StoryHarness::new(Arc::new(RecordingEmailGateway::default()));
    let zach = h
        .store
        .seed_user("zach", EmailVerificationStatus::Pending)
        .await;
    let eve = h
        .store
        .seed_user("eve", EmailVerificationStatus::Pending)
        .await;
    let token = h
        .cipher
        .seal(&VerificationPayload::issue(&zach, StoryHarness::start_time()))
        .unwrap();

    let result = h.service.verify_email(&verify(eve.id, &token)).await;

    assert!(matches!(result, Err(DomainError::Token(_))));
}

#[tokio::test]
async fn test_verification_request_for_verified_user_is_a_conflict() {
    let emails = Arc::new(RecordingEmailGateway::default());
    let h = StoryHarness::new(emails.clone());
    let user = h.store.seed_verified_user("zach").await;

    let result = h
        .service
        .request_verification_email(&RequestVerificationEmail {
            correlation_id: Uuid::new_v4(),
            user_id: user.id,
        })
        .await;

    assert!(matches!(result, Err(DomainError::Conflict(_))));
    assert!(emails.sent().is_empty());
}

#[tokio::test]
async fn test_verification_request_sends_immediately() {
    let emails = Arc::new(RecordingEmailGateway::default());
    let h = StoryHarness::new(emails.clone());
    let user = h
        .store
        .seed_user("zach", EmailVerificationStatus::Pending)
        .await;

    h.service
        .request_verification_email(&RequestVerificationEmail {
            correlation_id: Uuid::new_v4(),
            user_id: user.id,
        })
        .await
        .unwrap();

    assert_eq!(emails.subjects_for(user.id), vec!["Verify your email".to_owned()]);
}

#[tokio::test]
async fn test_sign_up_rejects_bad_input_and_taken_usernames() {
    // Arrange
    let h = StoryHarness::new(Arc::new(RecordingEmailGateway::default()));
    h.service
        .sign_up(&sign_up("zach", "zach@example.com", "correct horse"))
        .await
        .unwrap();

    // Act
    let short_password = h
        .service
        .sign_up(&sign_up("zoey", "zoey@example.com", "short"))
        .await;
    let taken = h
        .service
        .sign_up(&sign_up("ZACH", "other@example.com", "correct horse"))
        .await;

    // Assert
    assert!(matches!(short_password, Err(DomainError::Validation(_))));
    assert!(matches!(taken, Err(DomainError::Conflict(_))));
}

#[tokio::test]
async fn test_log_in_checks_credentials() {
    let h = StoryHarness::new(Arc::new(RecordingEmailGateway::default()));
    let user = h
        .service
        .sign_up(&sign_up("zach", "zach@example.com", "correct horse"))
        .await
        .unwrap();

    let ok = h.service.log_in("Zach", "correct horse").await;
    let wrong = h.service.log_in("zach", "battery staple").await;

    assert_eq!(ok.map(|u| u.id), Ok(user.id));
    assert_eq!(
        wrong,
        Err(DomainError::Validation("Invalid username or password".to_owned()))
    );
}
