//! Handshake admission.

use test_case::test_case;

use crate::common::{token_for, TestHub};
use chat_realtime::application::realtime::Handshake;
use chat_realtime::shared::error::AuthError;

fn with_token(token: &str) -> Handshake {
    Handshake {
        auth_token: Some(token.to_string()),
        cookie_token: None,
    }
}

#[tokio::test]
async fn test_valid_token_admits() {
    let t = TestHub::new();
    let alice = t.store.add_user();

    let identity = t
        .hub
        .authenticate(&with_token(&token_for(alice.user_id)))
        .await
        .unwrap();
    assert_eq!(identity, alice);
}

#[tokio::test]
async fn test_cookie_is_used_without_token() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let handshake = Handshake {
        auth_token: None,
        cookie_token: Some(token_for(alice.user_id)),
    };

    assert_eq!(t.hub.authenticate(&handshake).await, Ok(alice));
}

#[test_case(Handshake::default(), AuthError::MissingCredential ; "missing")]
#[test_case(with_token("forged"), AuthError::InvalidCredential ; "invalid")]
#[test_case(with_token("expired"), AuthError::ExpiredCredential ; "expired")]
#[tokio::test]
async fn test_rejection_reasons(handshake: Handshake, expected: AuthError) {
    let t = TestHub::new();
    assert_eq!(t.hub.authenticate(&handshake).await, Err(expected));
}

#[tokio::test]
async fn test_deleted_user_is_rejected() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    t.store.remove_user(alice.user_id);

    let result = t
        .hub
        .authenticate(&with_token(&token_for(alice.user_id)))
        .await;
    assert_eq!(result, Err(AuthError::UnknownUser));
}

#[tokio::test]
async fn test_store_outage_is_distinct_from_bad_credential() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    t.store.set_users_down(true);

    let result = t
        .hub
        .authenticate(&with_token(&token_for(alice.user_id)))
        .await;
    assert!(matches!(result, Err(AuthError::Unavailable(_))));
    assert_eq!(result.unwrap_err().reason(), "auth_unavailable");
}
