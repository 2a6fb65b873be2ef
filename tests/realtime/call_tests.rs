//! Call signaling flows.

use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::{eventually, TestHub};
use chat_realtime::application::realtime::{events, RoomKey};
use chat_realtime::domain::{CallOutcome, CallState};

#[tokio::test]
async fn test_call_to_offline_user_is_missed() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    let conversation = t.store.add_conversation(&[alice.user_id, bob.user_id]);

    let mut caller = t.connect(&alice).await;
    caller.drain();

    caller
        .send(
            &t.hub,
            events::CALL_START,
            json!({ "conversationId": conversation, "isVideo": true }),
        )
        .await
        .unwrap();

    let unavailable = caller.expect(events::CALL_UNAVAILABLE).await;
    assert_eq!(unavailable["targetUserId"], json!(bob.user_id));
    assert_eq!(t.hub.calls().active_calls(), 0);

    let store = t.store.clone();
    eventually(move || !store.history().is_empty()).await;
    let history = t.store.history();
    assert_eq!(history.len(), 1);
    let summary = history[0].call.clone().unwrap();
    assert_eq!(summary.outcome, CallOutcome::Missed);
    assert_eq!(history[0].conversation_id, conversation);

    // Bob connecting afterwards must not find a ringing call.
    let mut callee = t.connect(&bob).await;
    assert!(!callee
        .drain_names()
        .contains(&events::CALL_INCOMING.to_string()));
}

#[tokio::test]
async fn test_group_join_notifies_existing_participants_only() {
    let t = TestHub::new();
    let a = t.store.add_user();
    let b = t.store.add_user();
    let c = t.store.add_user();
    let conversation = t.store.add_conversation(&[a.user_id, b.user_id, c.user_id]);
    let call_id = conversation.to_string();

    let mut a_client = t.connect(&a).await;
    let mut b_client = t.connect(&b).await;
    let mut c_client = t.connect(&c).await;

    a_client
        .send(
            &t.hub,
            events::CALL_START,
            json!({ "conversationId": conversation, "isGroup": true }),
        )
        .await
        .unwrap();
    b_client.expect(events::CALL_INCOMING).await;
    c_client.expect(events::CALL_INCOMING).await;
    a_client.drain();

    b_client
        .send(&t.hub, events::CALL_JOIN, json!({ "callId": call_id }))
        .await
        .unwrap();
    let joined = a_client.drain();
    assert_eq!(joined.len(), 1);
    assert_eq!(joined[0].data["userId"], json!(b.user_id));
    assert!(b_client.drain().is_empty());

    c_client
        .send(&t.hub, events::CALL_JOIN, json!({ "callId": call_id }))
        .await
        .unwrap();
    for client in [&mut a_client, &mut b_client] {
        let received = client.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].event, events::CALL_PARTICIPANT_JOINED);
        assert_eq!(received[0].data["userId"], json!(c.user_id));
    }
    assert!(c_client.drain().is_empty());

    assert_eq!(t.hub.calls().participants(&call_id).len(), 3);
    assert_eq!(t.hub.calls().state(&call_id), Some(CallState::Active));
}

#[tokio::test]
async fn test_signal_reaches_only_its_target() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    let conversation = t.store.add_conversation(&[alice.user_id, bob.user_id]);
    let call_id = conversation.to_string();

    let mut caller = t.connect(&alice).await;
    let mut phone = t.connect(&bob).await;
    let mut laptop = t.connect(&bob).await;

    caller
        .send(&t.hub, events::CALL_START, json!({ "conversationId": conversation }))
        .await
        .unwrap();
    phone
        .send(&t.hub, events::CALL_JOIN, json!({ "callId": call_id }))
        .await
        .unwrap();
    caller.drain();
    phone.drain();
    laptop.drain();

    caller
        .send(
            &t.hub,
            events::CALL_OFFER,
            json!({
                "callId": call_id,
                "targetConnectionId": phone.conn.id(),
                "payload": { "sdp": "v=0" },
            }),
        )
        .await
        .unwrap();

    let offer = phone.expect(events::CALL_OFFER).await;
    assert_eq!(offer["fromConnectionId"], json!(caller.conn.id()));
    assert_eq!(offer["payload"]["sdp"], json!("v=0"));
    assert!(laptop.drain().is_empty());
}

#[tokio::test]
async fn test_disconnect_leaves_rooms_and_call() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    let carol = t.store.add_user();
    let first = t.store.add_conversation(&[alice.user_id, bob.user_id]);
    let second = t.store.add_conversation(&[alice.user_id, carol.user_id]);
    let call_id = first.to_string();

    let caller = t.connect(&alice).await;
    let mut callee = t.connect(&bob).await;

    caller
        .send(&t.hub, events::CALL_START, json!({ "conversationId": first }))
        .await
        .unwrap();
    callee
        .send(&t.hub, events::CALL_JOIN, json!({ "callId": call_id }))
        .await
        .unwrap();
    assert_eq!(caller.conn.rooms().len(), 4);
    callee.drain();

    t.hub.disconnect(&caller.conn).await;

    assert!(caller.conn.rooms().is_empty());
    for room in [first, second] {
        assert!(!t
            .hub
            .rooms()
            .members(&RoomKey::Conversation(room))
            .contains(&caller.conn.id()));
    }
    assert_eq!(t.hub.calls().state(&call_id), None);
    assert_eq!(t.hub.calls().active_calls(), 0);

    let names = callee.drain_names();
    assert!(names.contains(&events::CALL_ENDED.to_string()));
}

#[tokio::test]
async fn test_decline_ends_ringing_call() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    let conversation = t.store.add_conversation(&[alice.user_id, bob.user_id]);
    let call_id = conversation.to_string();

    let mut caller = t.connect(&alice).await;
    let mut callee = t.connect(&bob).await;

    caller
        .send(&t.hub, events::CALL_START, json!({ "conversationId": conversation }))
        .await
        .unwrap();
    callee.expect(events::CALL_INCOMING).await;
    assert_eq!(t.hub.calls().state(&call_id), Some(CallState::Ringing));

    callee
        .send(&t.hub, events::CALL_DECLINE, json!({ "callId": call_id }))
        .await
        .unwrap();

    let declined = caller.expect(events::CALL_DECLINED).await;
    assert_eq!(declined["userId"], json!(bob.user_id));
    assert_eq!(t.hub.calls().state(&call_id), None);

    let store = t.store.clone();
    eventually(move || {
        store
            .history()
            .iter()
            .any(|m| m.call.as_ref().is_some_and(|c| c.outcome == CallOutcome::Declined))
    })
    .await;
}

#[tokio::test]
async fn test_outsider_join_of_group_call_is_refused() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    let mallory = t.store.add_user();
    let conversation = t.store.add_conversation(&[alice.user_id, bob.user_id]);
    let call_id = conversation.to_string();

    let mut caller = t.connect(&alice).await;
    let mut outsider = t.connect(&mallory).await;
    caller
        .send(
            &t.hub,
            events::CALL_START,
            json!({ "conversationId": conversation, "isGroup": true }),
        )
        .await
        .unwrap();
    caller.drain();
    outsider.drain();

    let err = outsider
        .send(&t.hub, events::CALL_JOIN, json!({ "callId": call_id }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "forbidden");
    assert_eq!(t.hub.calls().participants(&call_id), vec![caller.conn.id()]);
    assert!(caller.drain().is_empty());
}

#[tokio::test]
async fn test_group_end_leaves_the_others_connected() {
    let t = TestHub::new();
    let a = t.store.add_user();
    let b = t.store.add_user();
    let c = t.store.add_user();
    let conversation = t.store.add_conversation(&[a.user_id, b.user_id, c.user_id]);
    let call_id = conversation.to_string();

    let mut a_client = t.connect(&a).await;
    let mut b_client = t.connect(&b).await;
    let mut c_client = t.connect(&c).await;
    a_client
        .send(
            &t.hub,
            events::CALL_START,
            json!({ "conversationId": conversation, "isGroup": true }),
        )
        .await
        .unwrap();
    for client in [&b_client, &c_client] {
        client
            .send(&t.hub, events::CALL_JOIN, json!({ "callId": call_id }))
            .await
            .unwrap();
    }
    a_client.drain();
    b_client.drain();
    c_client.drain();

    a_client
        .send(&t.hub, events::CALL_END, json!({ "callId": call_id }))
        .await
        .unwrap();

    assert_eq!(t.hub.calls().participants(&call_id).len(), 2);
    assert_eq!(t.hub.calls().state(&call_id), Some(CallState::Active));
    let names = c_client.drain_names();
    assert_eq!(names, vec![events::CALL_PARTICIPANT_LEFT.to_string()]);
    assert!(!b_client
        .drain_names()
        .contains(&events::CALL_ENDED.to_string()));
}
