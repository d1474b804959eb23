//! Integration tests for the story routes.

mod common;

use axum::http::StatusCode;
use common::TestApp;
use scribly_stories::domain::user::User;
use serde_json::{Value, json};

async fn start(app: &TestApp, author: &User) -> String {
    let (status, story) = app
        .post(
            "/api/v1/stories",
            Some(author.id),
            &json!({ "title": "The Lighthouse", "body": "Once upon a time" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    story["id"].as_str().unwrap().to_owned()
}

async fn seat(app: &TestApp, author: &User, story_id: &str, usernames: &[&str]) -> Value {
    let (status, story) = app
        .post(
            &format!("/api/v1/stories/{story_id}/cowriters"),
            Some(author.id),
            &json!({ "usernames": usernames }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    story
}

#[tokio::test]
async fn test_story_round_trip() {
    // Arrange
    let app = TestApp::new();
    let alice = app.harness.store.seed_verified_user("alice").await;
    let bob = app.harness.store.seed_verified_user("bob").await;
    let story_id = start(&app, &alice).await;

    // Act
    let seated = seat(&app, &alice, &story_id, &["bob"]).await;
    let (view_status, view) = app
        .get(&format!("/api/v1/stories/{story_id}"), Some(bob.id))
        .await;
    let (turn_status, after_turn) = app
        .post(
            &format!("/api/v1/stories/{story_id}/turns"),
            Some(bob.id),
            &json!({ "action": "write", "text": "A storm rolled in." }),
        )
        .await;

    // Assert
    assert_eq!(seated["state"], "in_progress");
    assert_eq!(seated["cowriters"].as_array().unwrap().len(), 2);
    assert_eq!(view_status, StatusCode::OK);
    assert_eq!(view["is_your_turn"], true);
    assert_eq!(view["current_writer"]["username"], "bob");
    assert_eq!(turn_status, StatusCode::OK);
    assert_eq!(after_turn["turns"].as_array().unwrap().len(), 2);
    assert_eq!(after_turn["turns"][1]["text"], "A storm rolled in.");
}

#[tokio::test]
async fn test_turn_errors_map_to_status_codes() {
    // Arrange
    let app = TestApp::new();
    let alice = app.harness.store.seed_verified_user("alice").await;
    let bob = app.harness.store.seed_verified_user("bob").await;
    let story_id = start(&app, &alice).await;
    let turns = format!("/api/v1/stories/{story_id}/turns");

    // Act
    let (draft, draft_body) = app
        .post(&turns, Some(alice.id), &json!({ "action": "pass" }))
        .await;
    seat(&app, &alice, &story_id, &["bob"]).await;
    let (out_of_turn, out_of_turn_body) = app
        .post(&turns, Some(alice.id), &json!({ "action": "pass" }))
        .await;
    let (unknown, unknown_body) = app
        .post(&turns, Some(bob.id), &json!({ "action": "scribble" }))
        .await;
    let (empty, _) = app
        .post(&turns, Some(bob.id), &json!({ "action": "write", "text": "  " }))
        .await;

    // Assert
    assert_eq!(draft, StatusCode::CONFLICT);
    assert_eq!(draft_body["error"], "invalid_state");
    assert_eq!(out_of_turn, StatusCode::CONFLICT);
    assert_eq!(out_of_turn_body["error"], "conflict");
    assert_eq!(unknown, StatusCode::BAD_REQUEST);
    assert_eq!(unknown_body["error"], "validation_error");
    assert_eq!(empty, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_outsiders_get_404_for_a_story() {
    let app = TestApp::new();
    let alice = app.harness.store.seed_verified_user("alice").await;
    let mallory = app.harness.store.seed_verified_user("mallory").await;
    let story_id = start(&app, &alice).await;

    let (status, json) = app
        .get(&format!("/api/v1/stories/{story_id}"), Some(mallory.id))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn test_missing_cowriters_are_listed() {
    let app = TestApp::new();
    let alice = app.harness.store.seed_verified_user("alice").await;
    let story_id = start(&app, &alice).await;

    let (status, json) = app
        .post(
            &format!("/api/v1/stories/{story_id}/cowriters"),
            Some(alice.id),
            &json!({ "usernames": ["ghost"] }),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(
        json["message"]
            .as_str()
            .unwrap()
            .contains("Could not find users: ghost")
    );
}

#[tokio::test]
async fn test_hide_and_unhide() {
    let app = TestApp::new();
    let alice = app.harness.store.seed_verified_user("alice").await;
    let story_id = start(&app, &alice).await;

    let (hidden_status, hidden) = app
        .post(
            &format!("/api/v1/stories/{story_id}/hide"),
            Some(alice.id),
            &json!({}),
        )
        .await;
    let (_, me) = app.get("/api/v1/users/me", Some(alice.id)).await;
    let (unhidden_status, unhidden) = app
        .post(
            &format!("/api/v1/stories/{story_id}/unhide"),
            Some(alice.id),
            &json!({}),
        )
        .await;

    assert_eq!(hidden_status, StatusCode::OK);
    assert_eq!(hidden["hidden_status"], "hidden");
    assert_eq!(me["hidden"][0]["story_id"], story_id.as_str());
    assert_eq!(unhidden_status, StatusCode::OK);
    assert_eq!(unhidden["hidden_status"], "unhidden");
}

#[tokio::test]
async fn test_nudge_emails_the_current_writer() {
    // Arrange
    let mut app = TestApp::new();
    let alice = app.harness.store.seed_verified_user("alice").await;
    let bob = app.harness.store.seed_verified_user("bob").await;
    let story_id = start(&app, &alice).await;
    seat(&app, &alice, &story_id, &["bob"]).await;
    app.harness.settle().await;
    app.emails.clear();

    // Act
    let (status, json) = app
        .post(
            &format!("/api/v1/stories/{story_id}/nudge/{}", bob.id),
            Some(alice.id),
            &json!({}),
        )
        .await;
    let (wrong_status, _) = app
        .post(
            &format!("/api/v1/stories/{story_id}/nudge/{}", alice.id),
            Some(bob.id),
            &json!({}),
        )
        .await;

    // Assert
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "sent");
    assert_eq!(
        app.emails.subjects_for(bob.id),
        vec!["alice nudged you to take your turn on The Lighthouse".to_owned()]
    );
    assert_eq!(wrong_status, StatusCode::CONFLICT);
}
