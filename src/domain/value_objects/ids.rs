//! Identifier types shared by the realtime core and its collaborators.

use uuid::Uuid;

/// User account ID
pub type UserId = Uuid;

/// Conversation (direct or group chat) ID
pub type ConversationId = Uuid;

/// Persisted message ID
pub type MessageId = Uuid;

/// One live transport session
pub type ConnectionId = Uuid;

/// Call session key: a conversation id rendered as text, or an ad-hoc id.
pub type CallId = String;
