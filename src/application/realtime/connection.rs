//! Live connection handle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::OutboundEvent;
use super::rooms::RoomKey;
use crate::domain::{ConnectionId, IdentitySnapshot, UserId};

/// Outbound queue feeding a connection's writer task
pub type OutboundSender = mpsc::UnboundedSender<Arc<OutboundEvent>>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<Arc<OutboundEvent>>;

/// One authenticated transport session.
///
/// The identity is fixed at admission. Room keys are tracked here so a
/// disconnect can cascade without scanning every room.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    identity: IdentitySnapshot,
    created_at: DateTime<Utc>,
    rooms: Mutex<HashSet<RoomKey>>,
    closed: AtomicBool,
    sender: OutboundSender,
}

impl Connection {
    /// Create a connection together with the receiving end of its queue.
    pub fn open(identity: IdentitySnapshot) -> (Arc<Self>, OutboundReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection = Arc::new(Self {
            id: Uuid::new_v4(),
            identity,
            created_at: Utc::now(),
            rooms: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
            sender,
        });
        (connection, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    pub fn identity(&self) -> &IdentitySnapshot {
        &self.identity
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Queue a prepared frame. Returns false once the connection is closed.
    pub fn deliver(&self, event: Arc<OutboundEvent>) -> bool {
        if self.is_closed() {
            return false;
        }
        self.sender.send(event).is_ok()
    }

    /// Queue an event addressed to this connection only.
    pub fn emit(&self, event: &str, data: Value) -> bool {
        self.deliver(Arc::new(OutboundEvent::new(event, data)))
    }

    /// Hide the connection from every room and lookup. Irreversible.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Room keys this connection currently belongs to.
    pub fn rooms(&self) -> Vec<RoomKey> {
        self.rooms.lock().iter().cloned().collect()
    }

    pub fn is_in_room(&self, key: &RoomKey) -> bool {
        self.rooms.lock().contains(key)
    }

    pub(crate) fn track_room(&self, key: RoomKey) -> bool {
        self.rooms.lock().insert(key)
    }

    pub(crate) fn untrack_room(&self, key: &RoomKey) -> bool {
        self.rooms.lock().remove(key)
    }

    pub(crate) fn take_rooms(&self) -> Vec<RoomKey> {
        self.rooms.lock().drain().collect()
    }
}
