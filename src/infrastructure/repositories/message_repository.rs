//! Message Repository Implementation
//!
//! PostgreSQL implementation of the message writes the realtime core performs:
//! status transitions, bulk reads, reactions, pins and call history entries.
//! Every read-modify-write is a single statement, so concurrent writers to the
//! same message never lose an update half-way.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    ConversationId, MessageId, MessageRepository, MessageStatus, NewMessage, PinState, Reaction,
    ReactionState, UserId,
};
use crate::shared::error::AppError;

pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReactionRow {
    id: Uuid,
    conversation_id: Uuid,
    reaction_user_id: Option<Uuid>,
    reaction_emoji: Option<String>,
}

impl ReactionRow {
    fn into_state(self) -> ReactionState {
        let reaction = match (self.reaction_user_id, self.reaction_emoji) {
            (Some(user_id), Some(emoji)) => Some(Reaction { user_id, emoji }),
            _ => None,
        };
        ReactionState {
            message_id: self.id,
            conversation_id: self.conversation_id,
            reaction,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PinRow {
    id: Uuid,
    conversation_id: Uuid,
    is_pinned: bool,
    pinned_by: Option<Uuid>,
    pinned_at: Option<DateTime<Utc>>,
}

impl From<PinRow> for PinState {
    fn from(row: PinRow) -> Self {
        Self {
            message_id: row.id,
            conversation_id: row.conversation_id,
            is_pinned: row.is_pinned,
            pinned_by: row.pinned_by,
            pinned_at: row.pinned_at,
        }
    }
}

/// Rank used to keep status monotonic (sent < delivered < read).
fn status_rank(status: MessageStatus) -> i16 {
    match status {
        MessageStatus::Sent => 0,
        MessageStatus::Delivered => 1,
        MessageStatus::Read => 2,
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create_message(&self, message: NewMessage) -> Result<MessageId, AppError> {
        let id = Uuid::now_v7();
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, message_type, content,
                                  call_metadata, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'sent', NOW())
            "#,
        )
        .bind(id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(message.message_type.as_str())
        .bind(&message.content)
        .bind(message.call.map(Json))
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn update_message_status(
        &self,
        message_id: MessageId,
        user_id: UserId,
        status: MessageStatus,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE messages
            SET status = $2
            WHERE id = $1
              AND sender_id <> $3
              AND deleted_at IS NULL
              AND CASE status WHEN 'sent' THEN 0 WHEN 'delivered' THEN 1 ELSE 2 END < $4
            "#,
        )
        .bind(message_id)
        .bind(status.as_str())
        .bind(user_id)
        .bind(status_rank(status))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: ConversationId,
        reader: UserId,
    ) -> Result<Vec<MessageId>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE messages
            SET status = 'read'
            WHERE conversation_id = $1
              AND sender_id <> $2
              AND status <> 'read'
              AND deleted_at IS NULL
            RETURNING id
            "#,
        )
        .bind(conversation_id)
        .bind(reader)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn update_read_watermark(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE conversation_participants
            SET last_read_at = GREATEST(COALESCE(last_read_at, $3), $3)
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_reaction(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        user_id: UserId,
        emoji: String,
    ) -> Result<Option<ReactionState>, AppError> {
        let row = sqlx::query_as::<_, ReactionRow>(
            r#"
            UPDATE messages
            SET reaction_user_id = $3, reaction_emoji = $4
            WHERE id = $2 AND conversation_id = $1 AND deleted_at IS NULL
            RETURNING id, conversation_id, reaction_user_id, reaction_emoji
            "#,
        )
        .bind(conversation_id)
        .bind(message_id)
        .bind(user_id)
        .bind(emoji)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ReactionRow::into_state))
    }

    async fn set_pinned(
        &self,
        conversation_id: ConversationId,
        message_id: MessageId,
        actor: UserId,
        pinned: bool,
    ) -> Result<Option<PinState>, AppError> {
        let row = sqlx::query_as::<_, PinRow>(
            r#"
            UPDATE messages
            SET is_pinned = $4,
                pinned_by = CASE WHEN $4 THEN $3 ELSE NULL END,
                pinned_at = CASE WHEN $4 THEN NOW() ELSE NULL END
            WHERE id = $2 AND conversation_id = $1 AND deleted_at IS NULL
            RETURNING id, conversation_id, is_pinned, pinned_by, pinned_at
            "#,
        )
        .bind(conversation_id)
        .bind(message_id)
        .bind(actor)
        .bind(pinned)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PinState::from))
    }
}
