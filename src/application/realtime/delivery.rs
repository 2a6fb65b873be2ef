//! Delivery/Typing Tracker
//!
//! Typing indicators with idle auto-stop, and the delivered/read status path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::json;
use tokio::task::JoinHandle;

use super::connection::Connection;
use super::detach;
use super::events;
use super::rooms::{RoomKey, RoomManager};
use crate::domain::{
    ConnectionId, ConversationId, MessageId, MessageRepository, MessageStatus, UserId,
};

type TypingKey = (ConversationId, UserId);

struct TypingTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct DeliveryTracker {
    rooms: Arc<RoomManager>,
    messages: Arc<dyn MessageRepository>,
    typing: Arc<DashMap<TypingKey, TypingTimer>>,
    generation: AtomicU64,
    idle: Duration,
}

impl DeliveryTracker {
    pub fn new(rooms: Arc<RoomManager>, messages: Arc<dyn MessageRepository>, idle: Duration) -> Self {
        Self {
            rooms,
            messages,
            typing: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
            idle,
        }
    }

    /// `typing:start`. Re-arms the idle timer when already typing.
    pub fn typing_start(&self, conn: &Connection, conversation_id: ConversationId) {
        let user_id = conn.user_id();
        self.rooms.broadcast(
            &RoomKey::Conversation(conversation_id),
            events::TYPING_START,
            json!({
                "conversationId": conversation_id,
                "userId": user_id,
                "username": conn.identity().username,
            }),
            Some(conn.id()),
        );

        let key = (conversation_id, user_id);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        // The entry stays locked until the new timer is stored, so the timer
        // task can never look for itself before it is there.
        let entry = self.typing.entry(key);
        let handle = tokio::spawn(expire_typing(
            Arc::clone(&self.typing),
            Arc::clone(&self.rooms),
            key,
            generation,
            conn.id(),
            self.idle,
        ));
        let timer = TypingTimer { generation, handle };
        match entry {
            Entry::Occupied(mut occupied) => occupied.insert(timer).handle.abort(),
            Entry::Vacant(vacant) => {
                vacant.insert(timer);
            }
        }
    }

    /// `typing:stop`
    pub fn typing_stop(&self, conn: &Connection, conversation_id: ConversationId) {
        let user_id = conn.user_id();
        if let Some((_, timer)) = self.typing.remove(&(conversation_id, user_id)) {
            timer.handle.abort();
        }
        self.rooms.broadcast(
            &RoomKey::Conversation(conversation_id),
            events::TYPING_STOP,
            json!({ "conversationId": conversation_id, "userId": user_id }),
            Some(conn.id()),
        );
    }

    pub fn is_typing(&self, conversation_id: ConversationId, user_id: UserId) -> bool {
        self.typing.contains_key(&(conversation_id, user_id))
    }

    /// `message:received`
    pub fn mark_delivered(
        &self,
        conn: &Connection,
        conversation_id: ConversationId,
        message_id: MessageId,
    ) {
        self.single_status(conn, conversation_id, message_id, MessageStatus::Delivered);
    }

    /// `message:read`. Without a message ID, every unread message in the
    /// conversation is marked and the reader's watermark advances.
    pub async fn mark_read(
        &self,
        conn: &Connection,
        conversation_id: ConversationId,
        message_id: Option<MessageId>,
    ) -> usize {
        if let Some(message_id) = message_id {
            return self.single_status(conn, conversation_id, message_id, MessageStatus::Read);
        }

        let reader = conn.user_id();
        let changed = match self
            .messages
            .mark_conversation_read(conversation_id, reader)
            .await
        {
            Ok(changed) => changed,
            Err(e) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    user_id = %reader,
                    error = %e,
                    "Bulk read failed"
                );
                return 0;
            }
        };

        let delivered = if changed.is_empty() {
            0
        } else {
            self.rooms.broadcast(
                &RoomKey::Conversation(conversation_id),
                events::MESSAGE_STATUS,
                json!({
                    "conversationId": conversation_id,
                    "messageIds": changed,
                    "status": MessageStatus::Read,
                    "userId": reader,
                }),
                Some(conn.id()),
            )
        };

        let messages = Arc::clone(&self.messages);
        let at = Utc::now();
        detach("update_read_watermark", async move {
            messages.update_read_watermark(conversation_id, reader, at).await
        });

        delivered
    }

    fn single_status(
        &self,
        conn: &Connection,
        conversation_id: ConversationId,
        message_id: MessageId,
        status: MessageStatus,
    ) -> usize {
        let user_id = conn.user_id();
        let delivered = self.rooms.broadcast(
            &RoomKey::Conversation(conversation_id),
            events::MESSAGE_STATUS,
            json!({
                "conversationId": conversation_id,
                "messageId": message_id,
                "status": status,
                "userId": user_id,
            }),
            Some(conn.id()),
        );

        let messages = Arc::clone(&self.messages);
        detach("update_message_status", async move {
            messages
                .update_message_status(message_id, user_id, status)
                .await
        });

        delivered
    }
}

impl Drop for DeliveryTracker {
    fn drop(&mut self) {
        for timer in self.typing.iter() {
            timer.handle.abort();
        }
    }
}

async fn expire_typing(
    typing: Arc<DashMap<TypingKey, TypingTimer>>,
    rooms: Arc<RoomManager>,
    key: TypingKey,
    generation: u64,
    origin: ConnectionId,
    idle: Duration,
) {
    tokio::time::sleep(idle).await;

    // A newer start or an explicit stop has replaced this timer.
    if typing
        .remove_if(&key, |_, timer| timer.generation == generation)
        .is_none()
    {
        return;
    }

    let (conversation_id, user_id) = key;
    rooms.broadcast(
        &RoomKey::Conversation(conversation_id),
        events::TYPING_STOP,
        json!({
            "conversationId": conversation_id,
            "userId": user_id,
            "expired": true,
        }),
        Some(origin),
    );
    tracing::debug!(conversation_id = %conversation_id, user_id = %user_id, "Typing expired");
}
