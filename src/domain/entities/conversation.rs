//! Conversation membership lookups.

use async_trait::async_trait;

use crate::domain::{ConversationId, UserId};
use crate::shared::error::AppError;

/// Read-only view of conversation participation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Conversations the user currently participates in.
    async fn list_user_conversations(&self, user_id: UserId)
        -> Result<Vec<ConversationId>, AppError>;

    /// Users participating in a conversation.
    async fn list_participants(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<UserId>, AppError>;
}
