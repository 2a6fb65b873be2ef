//! Message status, reaction and pin state, and the message persistence contract.
//!
//! Messages are created by the REST layer; the realtime core only writes
//! status transitions, reactions, pins and call history entries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::call::CallSummary;
use crate::domain::{ConversationId, MessageId, UserId};
use crate::shared::error::AppError;

/// Delivery status of a message as seen by its recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Message types the core writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// A regular user message
    #[default]
    Default,
    /// A call history entry
    Call,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Default => "default",
            MessageType::Call => "call",
        }
    }
}

/// A history message authored by the core on a user's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub message_type: MessageType,
    pub content: String,
    pub call: Option<CallSummary>,
}

impl NewMessage {
    /// Build a call history entry.
    pub fn call_history(
        conversation_id: ConversationId,
        sender_id: UserId,
        summary: CallSummary,
    ) -> Self {
        Self {
            conversation_id,
            sender_id,
            message_type: MessageType::Call,
            content: summary.describe(),
            call: Some(summary),
        }
    }
}

/// The single reaction a message carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub user_id: UserId,
    pub emoji: String,
}

/// Reaction state of a message after a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionState {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub reaction: Option<Reaction>,
}

/// Pin state of a message after a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinState {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub is_pinned: bool,
    pub pinned_by: Option<UserId>,
    pub pinned_at: Option<DateTime<Utc>>,
}

/// Message writes performed by the realtime core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Append a history message, returning its ID.
    async fn create_message(&self, message: NewMessage) -> Result<MessageId, AppError>;

    /// Move one message to `status` on behalf of `user_id`.
    async fn update_message_status(
        &self,
        message_id: MessageId,
        user_id: UserId,
        status: MessageStatus,
    ) -> Result<(), AppError>;

    /// Mark every message in the conversation not sent by `reader` and not
    /// yet read as read. Returns the IDs that changed.
    async fn mark_conversation_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
    ) -> Result<Vec<MessageId>, AppError>;

    /// Advance the reader's watermark in the conversation.
    async fn update_read_watermark(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Overwrite the message's reaction. `None` if the message does not exist
    /// in the conversation.
    async fn set_reaction(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        user_id: UserId,
        emoji: String,
    ) -> Result<Option<ReactionState>, AppError>;

    /// Pin or unpin a message. `None` if the message does not exist in the
    /// conversation.
    async fn set_pinned(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        actor: UserId,
        pinned: bool,
    ) -> Result<Option<PinState>, AppError>;
}
