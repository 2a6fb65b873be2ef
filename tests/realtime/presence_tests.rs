//! Multi-device presence.

use serde_json::json;

use crate::common::{eventually, TestHub};
use chat_realtime::application::realtime::events;

#[tokio::test]
async fn test_online_tracks_connection_count() {
    let t = TestHub::new();
    let alice = t.store.add_user();

    let phone = t.connect(&alice).await;
    let laptop = t.connect(&alice).await;
    assert!(t.hub.registry().is_online(alice.user_id));
    assert_eq!(t.hub.registry().get_connections(alice.user_id).len(), 2);

    t.hub.disconnect(&phone.conn).await;
    assert!(t.hub.registry().is_online(alice.user_id));

    t.hub.disconnect(&laptop.conn).await;
    assert!(!t.hub.registry().is_online(alice.user_id));
    assert!(t.hub.registry().get_connections(alice.user_id).is_empty());
}

#[tokio::test]
async fn test_last_disconnect_publishes_offline_once_per_room() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    let carol = t.store.add_user();
    let with_bob = t.store.add_conversation(&[alice.user_id, bob.user_id]);
    let with_carol = t.store.add_conversation(&[alice.user_id, carol.user_id]);

    let phone = t.connect(&alice).await;
    let laptop = t.connect(&alice).await;
    let mut bob_client = t.connect(&bob).await;
    let mut carol_client = t.connect(&carol).await;

    let store = t.store.clone();
    let online_at = {
        let user = alice.user_id;
        eventually(move || store.presence_of(user).is_some_and(|p| p.is_online)).await;
        t.store.presence_of(alice.user_id).unwrap().last_active_at
    };
    bob_client.drain();
    carol_client.drain();

    // Not the last device: nobody hears about it.
    t.hub.disconnect(&phone.conn).await;
    assert!(bob_client.drain().is_empty());

    t.hub.disconnect(&laptop.conn).await;

    let to_bob = bob_client.drain();
    assert_eq!(to_bob.len(), 1);
    assert_eq!(to_bob[0].event, events::PRESENCE_UPDATE);
    assert_eq!(to_bob[0].data["isOnline"], json!(false));
    assert_eq!(to_bob[0].data["conversationId"], json!(with_bob));

    let to_carol = carol_client.drain();
    assert_eq!(to_carol.len(), 1);
    assert_eq!(to_carol[0].data["conversationId"], json!(with_carol));

    let store = t.store.clone();
    let user = alice.user_id;
    eventually(move || {
        store
            .presence_of(user)
            .is_some_and(|p| !p.is_online && p.last_active_at >= online_at)
    })
    .await;
}

#[tokio::test]
async fn test_second_device_does_not_republish_online() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    t.store.add_conversation(&[alice.user_id, bob.user_id]);

    let mut watcher = t.connect(&bob).await;
    watcher.drain();
    let _phone = t.connect(&alice).await;
    assert_eq!(watcher.drain_names(), vec![events::PRESENCE_UPDATE]);

    let _laptop = t.connect(&alice).await;
    assert!(watcher.drain().is_empty());
}

#[tokio::test]
async fn test_disconnect_twice_is_harmless() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    t.store.add_conversation(&[alice.user_id, bob.user_id]);

    let client = t.connect(&alice).await;
    let mut watcher = t.connect(&bob).await;
    watcher.drain();

    t.hub.disconnect(&client.conn).await;
    t.hub.disconnect(&client.conn).await;

    assert_eq!(watcher.drain_names(), vec![events::PRESENCE_UPDATE]);
}

#[tokio::test]
async fn test_manual_override_fans_out() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let bob = t.store.add_user();
    t.store.add_conversation(&[alice.user_id, bob.user_id]);

    let client = t.connect(&alice).await;
    let mut watcher = t.connect(&bob).await;
    watcher.drain();

    client
        .send(&t.hub, events::PRESENCE_UPDATE, json!({ "isOnline": false }))
        .await
        .unwrap();

    let delta = watcher.expect(events::PRESENCE_UPDATE).await;
    assert_eq!(delta["userId"], json!(alice.user_id));
    assert_eq!(delta["isOnline"], json!(false));
}

#[tokio::test]
async fn test_startup_recovery_clears_stale_rows() {
    let t = TestHub::new();
    let alice = t.store.add_user();

    let _client = t.connect(&alice).await;
    let store = t.store.clone();
    let user = alice.user_id;
    eventually(move || store.presence_of(user).is_some_and(|p| p.is_online)).await;

    tokio_test::assert_ok!(t.hub.recover_presence().await);
    assert!(!t.store.presence_of(alice.user_id).unwrap().is_online);
}
