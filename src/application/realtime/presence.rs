//! Presence Coordinator
//!
//! Turns registry first/last transitions into persisted presence and
//! `presence:update` fan-out to every conversation the user belongs to.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::detach;
use super::events;
use super::rooms::{RoomKey, RoomManager};
use crate::domain::{ConversationRepository, PresenceRepository, UserId};
use crate::shared::error::AppError;

pub struct PresenceCoordinator {
    store: Arc<dyn PresenceRepository>,
    conversations: Arc<dyn ConversationRepository>,
    rooms: Arc<RoomManager>,
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

/// Exclusive right to change one user's presence.
///
/// Held across the registry mutation and the fan-out that follows it, so two
/// transitions of the same user can never interleave.
pub struct PresenceLock<'a> {
    coordinator: &'a PresenceCoordinator,
    user_id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PresenceLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // The shard lock blocks new clones while the count is checked.
        self.coordinator
            .locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl PresenceCoordinator {
    pub fn new(
        store: Arc<dyn PresenceRepository>,
        conversations: Arc<dyn ConversationRepository>,
        rooms: Arc<RoomManager>,
    ) -> Self {
        Self {
            store,
            conversations,
            rooms,
            locks: DashMap::new(),
        }
    }

    pub async fn lock_user(&self, user_id: UserId) -> PresenceLock<'_> {
        let lock = Arc::clone(self.locks.entry(user_id).or_default().value());
        let guard = lock.lock_owned().await;
        PresenceLock {
            coordinator: self,
            user_id,
            guard: Some(guard),
        }
    }

    /// Persist and announce a transition. Call with the user's lock held.
    pub async fn publish(&self, user_id: UserId, is_online: bool) -> usize {
        let at = Utc::now();

        let store = Arc::clone(&self.store);
        detach("set_user_presence", async move {
            store.set_user_presence(user_id, is_online, at).await
        });

        self.fan_out(user_id, is_online, at).await
    }

    /// Client-requested presence change (`presence:update`).
    pub async fn override_presence(&self, user_id: UserId, is_online: bool) -> usize {
        let _lock = self.lock_user(user_id).await;
        self.publish(user_id, is_online).await
    }

    /// Mark every persisted user offline. Runs before the listener binds.
    pub async fn recover_on_startup(&self) -> Result<u64, AppError> {
        let reset = self.store.reset_all_presence(Utc::now()).await?;
        tracing::info!(users_reset = reset, "Stale presence cleared");
        Ok(reset)
    }

    async fn fan_out(&self, user_id: UserId, is_online: bool, at: DateTime<Utc>) -> usize {
        let conversations = match self.conversations.list_user_conversations(user_id).await {
            Ok(conversations) => conversations,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Presence fan-out skipped, conversation lookup failed"
                );
                return 0;
            }
        };

        let mut delivered = 0;
        for conversation_id in conversations {
            delivered += self.rooms.broadcast(
                &RoomKey::Conversation(conversation_id),
                events::PRESENCE_UPDATE,
                json!({
                    "userId": user_id,
                    "isOnline": is_online,
                    "lastActiveAt": at,
                    "conversationId": conversation_id,
                }),
                None,
            );
        }

        tracing::debug!(user_id = %user_id, is_online, delivered, "Presence published");
        delivered
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.len()
    }
}
