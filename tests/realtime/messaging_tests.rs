//! Message relay, receipts and typing indicators.

use pretty_assertions::assert_eq;
use serde_json::json;
use uuid::Uuid;

use crate::common::{eventually, TestHub, TYPING_IDLE};
use chat_realtime::application::realtime::events;
use chat_realtime::domain::MessageStatus;

#[tokio::test]
async fn test_each_device_receives_one_copy() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    let conversation = t.store.add_conversation(&[alice.user_id, bob.user_id]);

    let mut phone = t.connect(&alice).await;
    let mut laptop = t.connect(&alice).await;
    let mut sender = t.connect(&bob).await;
    phone.drain();
    laptop.drain();
    sender.drain();

    sender
        .send(
            &t.hub,
            events::MESSAGE_SEND,
            json!({
                "conversationId": conversation,
                "message": { "id": Uuid::new_v4().to_string(), "content": "hi" },
            }),
        )
        .await
        .unwrap();

    assert_eq!(phone.drain_names(), vec![events::MESSAGE_NEW]);
    assert_eq!(laptop.drain_names(), vec![events::MESSAGE_NEW]);
    assert!(sender.drain().is_empty());
}

#[tokio::test]
async fn test_relayed_message_carries_sender() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    let conversation = t.store.add_conversation(&[alice.user_id, bob.user_id]);

    let mut receiver = t.connect(&alice).await;
    let sender = t.connect(&bob).await;

    sender
        .send(
            &t.hub,
            events::MESSAGE_SEND,
            json!({
                "conversationId": conversation,
                "message": { "id": "m-1", "content": "hello" },
            }),
        )
        .await
        .unwrap();

    let data = receiver.expect(events::MESSAGE_NEW).await;
    assert_eq!(data["conversationId"], json!(conversation));
    assert_eq!(data["message"]["senderId"], json!(bob.user_id));
    assert_eq!(data["message"]["content"], json!("hello"));
}

#[tokio::test]
async fn test_events_arrive_in_send_order() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    let conversation = t.store.add_conversation(&[alice.user_id, bob.user_id]);

    let mut receiver = t.connect(&alice).await;
    let sender = t.connect(&bob).await;
    receiver.drain();

    for id in ["e1", "e2", "e3"] {
        sender
            .send(
                &t.hub,
                events::MESSAGE_SEND,
                json!({ "conversationId": conversation, "message": { "id": id } }),
            )
            .await
            .unwrap();
    }

    let ids: Vec<_> = receiver
        .drain()
        .iter()
        .map(|e| e.data["message"]["id"].clone())
        .collect();
    assert_eq!(ids, vec![json!("e1"), json!("e2"), json!("e3")]);
}

#[tokio::test]
async fn test_delivery_receipt_is_persisted_and_broadcast() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    let conversation = t.store.add_conversation(&[alice.user_id, bob.user_id]);

    let mut author = t.connect(&alice).await;
    let reader = t.connect(&bob).await;
    let message_id = Uuid::new_v4();

    reader
        .send(
            &t.hub,
            events::MESSAGE_RECEIVED,
            json!({ "conversationId": conversation, "messageId": message_id }),
        )
        .await
        .unwrap();

    let status = author.expect(events::MESSAGE_STATUS).await;
    assert_eq!(status["status"], json!("delivered"));

    let store = t.store.clone();
    eventually(move || {
        store
            .statuses()
            .contains(&(message_id, bob.user_id, MessageStatus::Delivered))
    })
    .await;
}

#[tokio::test]
async fn test_typing_stops_after_idle_window() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    let conversation = t.store.add_conversation(&[alice.user_id, bob.user_id]);

    let typist = t.connect(&alice).await;
    let mut watcher = t.connect(&bob).await;

    typist
        .send(
            &t.hub,
            events::TYPING_START,
            json!({ "conversationId": conversation }),
        )
        .await
        .unwrap();
    let start = watcher.expect(events::TYPING_START).await;
    assert_eq!(start["userId"], json!(alice.user_id));

    tokio::time::sleep(TYPING_IDLE * 3).await;

    let stop = watcher.expect(events::TYPING_STOP).await;
    assert_eq!(stop["userId"], json!(alice.user_id));
    assert!(!t.hub.delivery().is_typing(conversation, alice.user_id));
}

#[tokio::test]
async fn test_send_outside_room_is_rejected() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    let mallory = t.store.add_user();
    let conversation = t.store.add_conversation(&[alice.user_id, bob.user_id]);

    let mut member = t.connect(&alice).await;
    let mut outsider = t.connect(&mallory).await;
    member.drain();
    outsider.drain();

    let result = outsider
        .send(
            &t.hub,
            events::MESSAGE_SEND,
            json!({ "conversationId": conversation, "message": { "id": "x" } }),
        )
        .await;

    assert!(result.is_err());
    assert!(member.drain().is_empty());
    assert_eq!(outsider.drain_names(), vec![events::ERROR]);
}
