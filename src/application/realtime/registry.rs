//! Connection Registry
//!
//! Owns the live mapping of user -> active connections.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::connection::Connection;
use crate::domain::{ConnectionId, UserId};
use crate::infrastructure::metrics;

/// Registry of every admitted connection.
///
/// `by_user` is only ever mutated under its per-user shard lock, so the
/// first/last transition for a user is decided exactly once even when several
/// devices connect or drop at the same time.
pub struct ConnectionRegistry {
    /// Active connections by connection ID
    connections: DashMap<ConnectionId, Arc<Connection>>,
    /// User ID to connection IDs (one user can hold many devices)
    by_user: DashMap<UserId, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            by_user: DashMap::new(),
        }
    }

    /// Register a connection. Returns true when it is the user's first.
    pub fn register(&self, connection: Arc<Connection>) -> bool {
        let id = connection.id();
        let user_id = connection.user_id();

        // Insert the handle before publishing the ID under the user so that
        // every ID in `by_user` always resolves.
        self.connections.insert(id, connection);

        let first = {
            let mut ids = self.by_user.entry(user_id).or_default();
            let was_empty = ids.is_empty();
            ids.insert(id);
            was_empty
        };

        self.update_gauges();
        tracing::info!(
            user_id = %user_id,
            connection_id = %id,
            first_for_user = first,
            "Connection registered"
        );

        first
    }

    /// Unregister a connection. Returns true when it was the user's last.
    ///
    /// Unknown or already removed IDs return false.
    pub fn unregister(&self, connection_id: ConnectionId) -> bool {
        let Some(user_id) = self.connections.get(&connection_id).map(|c| c.user_id()) else {
            return false;
        };

        let (removed, last) = match self.by_user.entry(user_id) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(&connection_id);
                let last = removed && entry.get().is_empty();
                if entry.get().is_empty() {
                    entry.remove();
                }
                (removed, last)
            }
            Entry::Vacant(_) => (false, false),
        };

        if !removed {
            return false;
        }

        self.connections.remove(&connection_id);
        self.update_gauges();
        tracing::info!(
            user_id = %user_id,
            connection_id = %connection_id,
            last_for_user = last,
            "Connection unregistered"
        );

        last
    }

    /// Live connections of a user
    pub fn get_connections(&self, user_id: UserId) -> Vec<Arc<Connection>> {
        let ids: Vec<ConnectionId> = match self.by_user.get(&user_id) {
            Some(ids) => ids.iter().copied().collect(),
            None => return Vec::new(),
        };

        ids.into_iter()
            .filter_map(|id| self.connections.get(&id).map(|c| Arc::clone(c.value())))
            .collect()
    }

    /// Check if user is online (has at least one connection)
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.by_user
            .get(&user_id)
            .map(|ids| !ids.is_empty())
            .unwrap_or(false)
    }

    /// Look up a connection by ID, skipping closed ones.
    pub fn get(&self, connection_id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections
            .get(&connection_id)
            .map(|c| Arc::clone(c.value()))
            .filter(|c| !c.is_closed())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn online_user_count(&self) -> usize {
        self.by_user.len()
    }

    fn update_gauges(&self) {
        metrics::set_realtime_connections(
            self.connection_count() as i64,
            self.online_user_count() as i64,
        );
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
