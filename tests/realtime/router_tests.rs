//! Failure isolation at the event boundary.

use serde_json::json;

use crate::common::TestHub;
use chat_realtime::application::realtime::events;

#[tokio::test]
async fn test_bad_payload_only_reaches_sender() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    let conversation = t.store.add_conversation(&[alice.user_id, bob.user_id]);

    let mut sender = t.connect(&alice).await;
    let mut other = t.connect(&bob).await;
    sender.drain();
    other.drain();

    let result = sender
        .send(&t.hub, events::MESSAGE_SEND, json!({ "conversationId": "nope" }))
        .await;
    assert!(result.is_err());

    let error = sender.expect(events::ERROR).await;
    assert_eq!(error["event"], json!(events::MESSAGE_SEND));
    assert_eq!(error["code"], json!("validation_error"));
    assert!(other.drain().is_empty());

    // The connection keeps working after a rejected event.
    sender
        .send(
            &t.hub,
            events::TYPING_START,
            json!({ "conversationId": conversation }),
        )
        .await
        .unwrap();
    other.expect(events::TYPING_START).await;
}

#[tokio::test]
async fn test_unknown_event_is_reported() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let mut client = t.connect(&alice).await;
    client.drain();

    let result = client.send(&t.hub, "message:shout", json!({})).await;
    assert!(result.is_err());

    let error = client.expect(events::ERROR).await;
    assert_eq!(error["event"], json!("message:shout"));
}

#[tokio::test]
async fn test_stale_signal_is_dropped_silently() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let mut client = t.connect(&alice).await;
    client.drain();

    let result = client
        .send(
            &t.hub,
            events::CALL_ICE_CANDIDATE,
            json!({
                "callId": "gone",
                "targetConnectionId": uuid::Uuid::new_v4(),
                "payload": {},
            }),
        )
        .await;

    assert!(result.is_err());
    assert!(client.drain().is_empty());
}

#[tokio::test]
async fn test_join_chat_requires_participation() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    let mallory = t.store.add_user();
    let conversation = t.store.add_conversation(&[alice.user_id, bob.user_id]);

    let mut outsider = t.connect(&mallory).await;
    outsider.drain();

    let result = outsider
        .send(&t.hub, events::JOIN_CHAT, json!({ "conversationId": conversation }))
        .await;

    assert!(result.is_err());
    assert_eq!(outsider.expect(events::ERROR).await["code"], json!("forbidden"));
    assert!(!outsider
        .conn
        .is_in_room(&chat_realtime::application::realtime::RoomKey::Conversation(
            conversation
        )));
}
