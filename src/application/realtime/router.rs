//! Event Router
//!
//! Explicit dispatch table from inbound event name to handler. Each handler
//! parses its own payload; a failing or panicking handler only ever affects
//! the connection that sent the event.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};

use super::connection::Connection;
use super::events;
use super::hub::RealtimeHub;
use super::payloads::{
    CallJoinPayload, CallRefPayload, CallStartPayload, ConversationPayload, MessageBodyPayload,
    MessageRefPayload, PresencePayload, ReactPayload, ReadPayload, SignalPayload,
};
use super::rooms::RoomKey;
use crate::domain::ConversationId;
use crate::infrastructure::metrics;
use crate::shared::error::{AppError, ErrorEvent};
use crate::shared::validation::parse_payload;

/// Handler signature stored in the dispatch table
pub type EventHandler = for<'a> fn(
    &'a RealtimeHub,
    &'a Arc<Connection>,
    Value,
) -> BoxFuture<'a, Result<(), AppError>>;

pub struct EventRouter {
    handlers: HashMap<&'static str, EventHandler>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Router with a handler for every inbound event.
    pub fn with_default_handlers() -> Self {
        let mut router = Self::new();
        router
            .register(events::JOIN_CHAT, join_chat)
            .register(events::LEAVE_CHAT, leave_chat)
            .register(events::MESSAGE_SEND, message_send)
            .register(events::MESSAGE_EDIT, message_edit)
            .register(events::MESSAGE_DELETE, message_delete)
            .register(events::MESSAGE_REACT, message_react)
            .register(events::MESSAGE_PIN, message_pin)
            .register(events::MESSAGE_UNPIN, message_unpin)
            .register(events::MESSAGE_RECEIVED, message_received)
            .register(events::MESSAGE_READ, message_read)
            .register(events::TYPING_START, typing_start)
            .register(events::TYPING_STOP, typing_stop)
            .register(events::PRESENCE_UPDATE, presence_update)
            .register(events::CALL_START, call_start)
            .register(events::CALL_JOIN, call_join)
            .register(events::CALL_OFFER, call_offer)
            .register(events::CALL_ANSWER, call_answer)
            .register(events::CALL_ICE_CANDIDATE, call_ice_candidate)
            .register(events::CALL_LEAVE, call_leave)
            .register(events::CALL_END, call_end)
            .register(events::CALL_DECLINE, call_decline);
        router
    }

    pub fn register(&mut self, event: &'static str, handler: EventHandler) -> &mut Self {
        self.handlers.insert(event, handler);
        self
    }

    pub fn handles(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Run the handler for `event`.
    ///
    /// Failures are reported to `conn` as an `error` event (unless silent) and
    /// also returned to the caller.
    pub async fn dispatch(
        &self,
        hub: &RealtimeHub,
        conn: &Arc<Connection>,
        event: &str,
        data: Value,
    ) -> Result<(), AppError> {
        let Some((name, handler)) = self.handlers.get_key_value(event) else {
            metrics::record_event("unknown", "rejected");
            let error = AppError::Validation(format!("Unknown event: {}", event));
            report(conn, event, &error);
            return Err(error);
        };

        tracing::debug!(
            event = name,
            connection_id = %conn.id(),
            user_id = %conn.user_id(),
            "Dispatching event"
        );

        let result = match AssertUnwindSafe(handler(hub, conn, data))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(event = name, connection_id = %conn.id(), "Event handler panicked");
                Err(AppError::Internal(format!("handler for {} panicked", name)))
            }
        };

        match &result {
            Ok(()) => metrics::record_event(name, "ok"),
            Err(e) if !e.is_reportable() => {
                metrics::record_event(name, "dropped");
                tracing::debug!(event = name, connection_id = %conn.id(), error = %e, "Event dropped");
            }
            Err(e) => {
                metrics::record_event(name, "error");
                if e.is_persistence() {
                    tracing::warn!(event = name, connection_id = %conn.id(), error = %e, "Event failed");
                } else {
                    tracing::info!(event = name, connection_id = %conn.id(), error = %e, "Event rejected");
                }
                report(conn, name, e);
            }
        }

        result
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::with_default_handlers()
    }
}

fn report(conn: &Connection, event: &str, error: &AppError) {
    match serde_json::to_value(ErrorEvent::new(event, error)) {
        Ok(body) => {
            conn.emit(events::ERROR, body);
        }
        Err(e) => tracing::error!(error = %e, "Failed to encode error event"),
    }
}

/// Sending into a conversation requires having joined its room.
fn require_member(conn: &Connection, conversation_id: ConversationId) -> Result<RoomKey, AppError> {
    let key = RoomKey::Conversation(conversation_id);
    if conn.is_in_room(&key) {
        Ok(key)
    } else {
        Err(AppError::Validation(format!(
            "not_in_room: join conversation {} first",
            conversation_id
        )))
    }
}

fn join_chat<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: ConversationPayload = parse_payload(data)?;
        let participants = hub.conversations().list_participants(p.conversation_id).await?;
        if !participants.contains(&conn.user_id()) {
            return Err(AppError::Forbidden(
                "not a participant of this conversation".into(),
            ));
        }

        let key = RoomKey::Conversation(p.conversation_id);
        if hub.rooms().join(conn, key.clone()) {
            hub.rooms().broadcast(
                &key,
                events::CHAT_USER_JOINED,
                json!({
                    "conversationId": p.conversation_id,
                    "userId": conn.user_id(),
                    "user": conn.identity(),
                }),
                Some(conn.id()),
            );
        }
        Ok(())
    }
    .boxed()
}

fn leave_chat<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: ConversationPayload = parse_payload(data)?;
        let key = RoomKey::Conversation(p.conversation_id);
        if hub.rooms().leave(conn, &key) {
            hub.rooms().broadcast(
                &key,
                events::CHAT_USER_LEFT,
                json!({ "conversationId": p.conversation_id, "userId": conn.user_id() }),
                None,
            );
        }
        Ok(())
    }
    .boxed()
}

fn message_send<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: MessageBodyPayload = parse_payload(data)?;
        let key = require_member(conn, p.conversation_id)?;

        // Whatever the client claims, the sender is the connection's identity.
        let mut message = p.message;
        message.insert("senderId".into(), json!(conn.user_id()));
        message.insert("sender".into(), serde_json::to_value(conn.identity())?);

        hub.rooms().broadcast(
            &key,
            events::MESSAGE_NEW,
            json!({ "conversationId": p.conversation_id, "message": message }),
            Some(conn.id()),
        );
        Ok(())
    }
    .boxed()
}

fn message_edit<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: MessageBodyPayload = parse_payload(data)?;
        let key = require_member(conn, p.conversation_id)?;
        hub.rooms().broadcast(
            &key,
            events::MESSAGE_EDITED,
            json!({ "conversationId": p.conversation_id, "message": p.message }),
            Some(conn.id()),
        );
        Ok(())
    }
    .boxed()
}

fn message_delete<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: MessageRefPayload = parse_payload(data)?;
        let key = require_member(conn, p.conversation_id)?;
        hub.rooms().broadcast(
            &key,
            events::MESSAGE_DELETED,
            json!({ "conversationId": p.conversation_id, "messageId": p.message_id }),
            Some(conn.id()),
        );
        Ok(())
    }
    .boxed()
}

fn message_react<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: ReactPayload = parse_payload(data)?;
        let key = require_member(conn, p.conversation_id)?;
        let state = hub
            .messages()
            .set_reaction(p.conversation_id, p.message_id, conn.user_id(), p.emoji)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("message {}", p.message_id)))?;

        hub.rooms()
            .broadcast(&key, events::MESSAGE_REACTION, serde_json::to_value(state)?, None);
        Ok(())
    }
    .boxed()
}

async fn set_pinned(
    hub: &RealtimeHub,
    conn: &Connection,
    data: Value,
    pinned: bool,
) -> Result<(), AppError> {
    let p: MessageRefPayload = parse_payload(data)?;
    let key = require_member(conn, p.conversation_id)?;
    let state = hub
        .messages()
        .set_pinned(p.conversation_id, p.message_id, conn.user_id(), pinned)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("message {}", p.message_id)))?;

    let event = if pinned {
        events::MESSAGE_PINNED
    } else {
        events::MESSAGE_UNPINNED
    };
    hub.rooms()
        .broadcast(&key, event, serde_json::to_value(state)?, None);
    Ok(())
}

fn message_pin<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    set_pinned(hub, conn, data, true).boxed()
}

fn message_unpin<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    set_pinned(hub, conn, data, false).boxed()
}

fn message_received<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: MessageRefPayload = parse_payload(data)?;
        require_member(conn, p.conversation_id)?;
        hub.delivery()
            .mark_delivered(conn, p.conversation_id, p.message_id);
        Ok(())
    }
    .boxed()
}

fn message_read<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: ReadPayload = parse_payload(data)?;
        require_member(conn, p.conversation_id)?;
        hub.delivery()
            .mark_read(conn, p.conversation_id, p.message_id)
            .await;
        Ok(())
    }
    .boxed()
}

fn typing_start<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: ConversationPayload = parse_payload(data)?;
        require_member(conn, p.conversation_id)?;
        hub.delivery().typing_start(conn, p.conversation_id);
        Ok(())
    }
    .boxed()
}

fn typing_stop<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: ConversationPayload = parse_payload(data)?;
        require_member(conn, p.conversation_id)?;
        hub.delivery().typing_stop(conn, p.conversation_id);
        Ok(())
    }
    .boxed()
}

fn presence_update<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: PresencePayload = parse_payload(data)?;
        hub.presence()
            .override_presence(conn.user_id(), p.is_online)
            .await;
        Ok(())
    }
    .boxed()
}

fn call_start<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: CallStartPayload = parse_payload(data)?;
        hub.calls().start(conn, p).await
    }
    .boxed()
}

fn call_join<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: CallJoinPayload = parse_payload(data)?;
        hub.calls().join(conn, &p.call_id, p.is_video).await
    }
    .boxed()
}

async fn relay(
    hub: &RealtimeHub,
    conn: &Connection,
    data: Value,
    event: &'static str,
) -> Result<(), AppError> {
    let p: SignalPayload = parse_payload(data)?;
    hub.calls().relay_signal(conn, event, p)
}

fn call_offer<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    relay(hub, conn, data, events::CALL_OFFER).boxed()
}

fn call_answer<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    relay(hub, conn, data, events::CALL_ANSWER).boxed()
}

fn call_ice_candidate<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    relay(hub, conn, data, events::CALL_ICE_CANDIDATE).boxed()
}

fn call_leave<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: CallRefPayload = parse_payload(data)?;
        hub.calls().leave(conn, &p.call_id);
        Ok(())
    }
    .boxed()
}

fn call_end<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: CallRefPayload = parse_payload(data)?;
        hub.calls().end(conn, &p.call_id)
    }
    .boxed()
}

fn call_decline<'a>(
    hub: &'a RealtimeHub,
    conn: &'a Arc<Connection>,
    data: Value,
) -> BoxFuture<'a, Result<(), AppError>> {
    async move {
        let p: CallRefPayload = parse_payload(data)?;
        hub.calls().decline(conn, &p.call_id)
    }
    .boxed()
}
