//! Inbound event payloads.
//!
//! One struct per input contract. Field names are camelCase on the wire.

use serde::Deserialize;
use serde_json::{Map, Value};
use validator::{Validate, ValidationError};

use crate::domain::{CallId, ConnectionId, ConversationId, MessageId, UserId};

/// `join:chat`, `leave:chat`, `typing:start`, `typing:stop`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPayload {
    pub conversation_id: ConversationId,
}

/// `message:send`, `message:edit`
///
/// `message` is the record the REST layer already stored; it is relayed, not
/// interpreted, apart from its `id` and the sender fields.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MessageBodyPayload {
    pub conversation_id: ConversationId,
    #[validate(custom(function = "validate_message_object"))]
    pub message: Map<String, Value>,
}

fn validate_message_object(message: &Map<String, Value>) -> Result<(), ValidationError> {
    match message.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(()),
        _ => Err(ValidationError::new("message_id_required")),
    }
}

/// `message:delete`, `message:pin`, `message:unpin`, `message:received`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MessageRefPayload {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
}

/// `message:react`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReactPayload {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    #[validate(length(min = 1, max = 64))]
    pub emoji: String,
}

/// `message:read`; without a message id every unread message is marked.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReadPayload {
    pub conversation_id: ConversationId,
    #[serde(default)]
    pub message_id: Option<MessageId>,
}

/// `presence:update`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub is_online: bool,
}

/// `call:start`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_call_start"))]
pub struct CallStartPayload {
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub call_id: Option<CallId>,
    #[serde(default)]
    pub target_user_id: Option<UserId>,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub is_group: bool,
}

fn validate_call_start(payload: &CallStartPayload) -> Result<(), ValidationError> {
    let scoped = if payload.is_group {
        payload.conversation_id.is_some() || payload.call_id.is_some()
    } else {
        payload.conversation_id.is_some() || payload.target_user_id.is_some()
    };
    if scoped {
        Ok(())
    } else {
        Err(ValidationError::new("call_target_required"))
    }
}

/// `call:join`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CallJoinPayload {
    #[validate(length(min = 1, max = 128))]
    pub call_id: CallId,
    #[serde(default)]
    pub is_video: bool,
}

/// `call:leave`, `call:end`, `call:decline`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CallRefPayload {
    #[validate(length(min = 1, max = 128))]
    pub call_id: CallId,
}

/// `call:offer`, `call:answer`, `call:ice-candidate`
///
/// `payload` is opaque WebRTC data (SDP or ICE candidate).
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignalPayload {
    #[validate(length(min = 1, max = 128))]
    pub call_id: CallId,
    pub target_connection_id: ConnectionId,
    #[serde(default)]
    pub payload: Value,
}
