//! Event names and the outbound event envelope.
//!
//! Inbound names are the keys of the router's dispatch table; outbound names
//! are what clients subscribe to.

use serde::Serialize;
use serde_json::Value;

// Inbound (client -> server)
pub const JOIN_CHAT: &str = "join:chat";
pub const LEAVE_CHAT: &str = "leave:chat";
pub const MESSAGE_SEND: &str = "message:send";
pub const MESSAGE_EDIT: &str = "message:edit";
pub const MESSAGE_DELETE: &str = "message:delete";
pub const MESSAGE_REACT: &str = "message:react";
pub const MESSAGE_PIN: &str = "message:pin";
pub const MESSAGE_UNPIN: &str = "message:unpin";
pub const MESSAGE_RECEIVED: &str = "message:received";
pub const MESSAGE_READ: &str = "message:read";
pub const TYPING_START: &str = "typing:start";
pub const TYPING_STOP: &str = "typing:stop";
pub const PRESENCE_UPDATE: &str = "presence:update";
pub const CALL_START: &str = "call:start";
pub const CALL_JOIN: &str = "call:join";
pub const CALL_OFFER: &str = "call:offer";
pub const CALL_ANSWER: &str = "call:answer";
pub const CALL_ICE_CANDIDATE: &str = "call:ice-candidate";
pub const CALL_LEAVE: &str = "call:leave";
pub const CALL_END: &str = "call:end";
pub const CALL_DECLINE: &str = "call:decline";

// Outbound (server -> clients)
pub const SESSION_READY: &str = "session:ready";
pub const CONNECT_ERROR: &str = "connect_error";
pub const ERROR: &str = "error";
pub const CHAT_USER_JOINED: &str = "chat:user-joined";
pub const CHAT_USER_LEFT: &str = "chat:user-left";
pub const CONVERSATION_ADDED: &str = "conversation:added";
pub const MESSAGE_NEW: &str = "message:new";
pub const MESSAGE_EDITED: &str = "message:edited";
pub const MESSAGE_DELETED: &str = "message:deleted";
pub const MESSAGE_REACTION: &str = "message:reaction";
pub const MESSAGE_PINNED: &str = "message:pinned";
pub const MESSAGE_UNPINNED: &str = "message:unpinned";
pub const MESSAGE_STATUS: &str = "message:status";
pub const CALL_INCOMING: &str = "call:incoming";
pub const CALL_UNAVAILABLE: &str = "call:unavailable";
pub const CALL_PARTICIPANT_JOINED: &str = "call:participant-joined";
pub const CALL_PARTICIPANT_LEFT: &str = "call:participant-left";
pub const CALL_DECLINED: &str = "call:declined";
pub const CALL_ENDED: &str = "call:ended";

/// One frame queued for delivery to a connection.
///
/// Shared behind an `Arc` so a room broadcast serializes the payload once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEvent {
    pub event: String,
    pub data: Value,
}

impl OutboundEvent {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}
