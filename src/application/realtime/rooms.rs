//! Room Membership Manager
//!
//! Rooms are live broadcast scopes keyed by [`RoomKey`]. Each room has its own
//! lock; a broadcast holds it for the whole fan-out, so all members observe
//! broadcasts to one room in the same order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;

use super::connection::Connection;
use super::events::OutboundEvent;
use crate::domain::{CallId, ConnectionId, ConversationId, UserId};

/// Broadcast scope key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomKey {
    /// Personal notification room of a user, shared by all their devices
    User(UserId),
    /// Conversation room
    Conversation(ConversationId),
    /// Call room
    Call(CallId),
}

impl RoomKey {
    pub fn as_call(&self) -> Option<&CallId> {
        match self {
            RoomKey::Call(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomKey::User(id) => write!(f, "user:{}", id),
            RoomKey::Conversation(id) => write!(f, "conversation:{}", id),
            RoomKey::Call(id) => write!(f, "call:{}", id),
        }
    }
}

#[derive(Default)]
struct Room {
    members: HashMap<ConnectionId, Arc<Connection>>,
}

/// Owner of all rooms and their memberships.
pub struct RoomManager {
    rooms: DashMap<RoomKey, Arc<Mutex<Room>>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Add a connection to a room. Idempotent; returns true if newly joined.
    ///
    /// Closed connections are refused.
    pub fn join(&self, connection: &Arc<Connection>, key: RoomKey) -> bool {
        if connection.is_closed() {
            return false;
        }

        // The shard lock is held while inserting so a concurrent `leave`
        // cannot drop the room between lookup and insert.
        let inserted = {
            let room = self.rooms.entry(key.clone()).or_default();
            let mut room = room.lock();
            room.members
                .insert(connection.id(), Arc::clone(connection))
                .is_none()
        };

        connection.track_room(key);
        inserted
    }

    /// Remove a connection from a room. Returns true if it was a member.
    pub fn leave(&self, connection: &Connection, key: &RoomKey) -> bool {
        connection.untrack_room(key);
        self.remove_member(key, connection.id())
    }

    /// Remove a connection from every room it belongs to.
    ///
    /// Callers close the connection first, which already hides it from
    /// [`members`](Self::members) and [`broadcast`](Self::broadcast).
    pub fn remove_connection(&self, connection: &Connection) -> Vec<RoomKey> {
        let keys = connection.take_rooms();
        for key in &keys {
            self.remove_member(key, connection.id());
        }
        keys
    }

    /// Send an event to every live member, optionally skipping one connection.
    ///
    /// Returns the number of connections the event was queued for.
    pub fn broadcast(
        &self,
        key: &RoomKey,
        event: &str,
        payload: Value,
        exclude: Option<ConnectionId>,
    ) -> usize {
        let Some(room) = self.rooms.get(key).map(|r| Arc::clone(r.value())) else {
            return 0;
        };

        let frame = Arc::new(OutboundEvent::new(event, payload));
        let room = room.lock();
        let mut delivered = 0;
        for conn in room.members.values() {
            if Some(conn.id()) == exclude {
                continue;
            }
            if conn.deliver(Arc::clone(&frame)) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Live members of a room
    pub fn members(&self, key: &RoomKey) -> Vec<ConnectionId> {
        match self.rooms.get(key).map(|r| Arc::clone(r.value())) {
            Some(room) => room
                .lock()
                .members
                .values()
                .filter(|conn| !conn.is_closed())
                .map(|conn| conn.id())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn remove_member(&self, key: &RoomKey, connection_id: ConnectionId) -> bool {
        let removed = match self.rooms.get(key).map(|r| Arc::clone(r.value())) {
            Some(room) => room.lock().members.remove(&connection_id).is_some(),
            None => false,
        };
        self.rooms.remove_if(key, |_, room| room.lock().members.is_empty());
        removed
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}
