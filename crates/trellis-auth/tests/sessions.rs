//! Session lifecycle against a live Neo4j instance.
//!
//! Run with: cargo test --package trellis-auth --test sessions -- --ignored
//!
//! Skipped automatically if Neo4j is not available.

use std::sync::Arc;

use chrono::Utc;
use trellis_auth::{generate_session_token, hash_session_token, SessionManager};
use trellis_core::{ErrorKind, Label, NodeKey, Property};
use trellis_graph::{GraphClient, GraphConfig, GraphStore, NodeRepository, Properties};
use uuid::Uuid;

struct Fixture {
    sessions: SessionManager,
    nodes: NodeRepository,
}

async fn connect_or_skip() -> Option<Fixture> {
    let config = GraphConfig::default();
    match GraphClient::connect(&config).await {
        Ok(client) => {
            let store: Arc<dyn GraphStore> = Arc::new(client);
            Some(Fixture {
                sessions: SessionManager::new(Arc::clone(&store), &config.database),
                nodes: NodeRepository::new(store, &config.database),
            })
        }
        Err(e) => {
            eprintln!("Skipping integration test (Neo4j not available): {e}");
            None
        }
    }
}

async fn create_user(fixture: &Fixture) -> (String, NodeKey) {
    let email = format!("{}@example.com", Uuid::new_v4());
    let props = Properties::new(Label::User)
        .generated_id(Property::Id)
        .unwrap()
        .with(Property::Email, email.as_str())
        .unwrap()
        .with(Property::Auth, "member")
        .unwrap();
    fixture.nodes.create_node(&props).await.unwrap();
    let key = NodeKey::new(Label::User, email.as_str());
    (email, key)
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_create_then_validate() {
    let Some(fixture) = connect_or_skip().await else {
        return;
    };
    let (email, user) = create_user(&fixture).await;
    let token = generate_session_token();

    let created = fixture.sessions.create_session(&token, &email).await.unwrap();
    assert_eq!(created.id, hash_session_token(&token));
    assert!(!created.is_expired(Utc::now()));

    let validation = fixture
        .sessions
        .validate_session_token(Some(&token))
        .await
        .unwrap();
    assert_eq!(validation.session, Some(created.clone()));
    let authorized = validation.user.unwrap();
    assert_eq!(authorized.email, email);
    assert_eq!(authorized.auth, "member");
    assert_eq!(authorized.id.as_deref(), Some(created.user_id.as_str()));

    fixture.sessions.invalidate_session(&created.id).await.unwrap();
    let _ = fixture.nodes.delete_node(&user).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_validate_unknown_or_missing_token() {
    let Some(fixture) = connect_or_skip().await else {
        return;
    };

    let garbage = fixture
        .sessions
        .validate_session_token(Some("not-a-token"))
        .await
        .unwrap();
    assert!(!garbage.is_valid());

    let missing = fixture.sessions.validate_session_token(None).await.unwrap();
    assert!(missing.session.is_none() && missing.user.is_none());
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_session_for_unknown_user_fails() {
    let Some(fixture) = connect_or_skip().await else {
        return;
    };

    let err = fixture
        .sessions
        .create_session(&generate_session_token(), "nobody@example.invalid")
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::CannotCreateSession));
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_invalidate_is_idempotent() {
    let Some(fixture) = connect_or_skip().await else {
        return;
    };
    let (email, user) = create_user(&fixture).await;
    let token = generate_session_token();
    let session = fixture.sessions.create_session(&token, &email).await.unwrap();

    fixture.sessions.invalidate_session(&session.id).await.unwrap();
    fixture.sessions.invalidate_session(&session.id).await.unwrap();

    let validation = fixture
        .sessions
        .validate_session_token(Some(&token))
        .await
        .unwrap();
    assert!(!validation.is_valid());

    let _ = fixture.nodes.delete_node(&user).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_invalidate_all_sessions_of_user() {
    let Some(fixture) = connect_or_skip().await else {
        return;
    };
    let (email, user) = create_user(&fixture).await;
    let tokens: Vec<String> = (0..3).map(|_| generate_session_token()).collect();
    for token in &tokens {
        fixture.sessions.create_session(token, &email).await.unwrap();
    }

    let removed = fixture.sessions.invalidate_all_sessions(&email).await.unwrap();
    assert_eq!(removed, 3);

    for token in &tokens {
        let validation = fixture
            .sessions
            .validate_session_token(Some(token))
            .await
            .unwrap();
        assert!(!validation.is_valid());
    }
    assert_eq!(fixture.sessions.invalidate_all_sessions(&email).await.unwrap(), 0);

    let _ = fixture.nodes.delete_node(&user).await;
}
