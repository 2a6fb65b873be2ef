//! Conversation Repository Implementation
//!
//! Participation lookups against `conversation_participants`. A participant
//! who left keeps their row with `left_at` set and is no longer listed.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{ConversationId, ConversationRepository, UserId};
use crate::shared::error::AppError;

#[derive(Clone)]
pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn list_user_conversations(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationId>, AppError> {
        let ids = sqlx::query_scalar::<_, ConversationId>(
            r#"
            SELECT conversation_id
            FROM conversation_participants
            WHERE user_id = $1 AND left_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn list_participants(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<UserId>, AppError> {
        let ids = sqlx::query_scalar::<_, UserId>(
            r#"
            SELECT user_id
            FROM conversation_participants
            WHERE conversation_id = $1 AND left_at IS NULL
            ORDER BY joined_at ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}
