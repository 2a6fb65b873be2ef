//! Presence Repository Implementation
//!
//! Presence lives on the `users` row (`is_online`, `last_active_at`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{PresenceRepository, UserId};
use crate::shared::error::AppError;

#[derive(Clone)]
pub struct PgPresenceRepository {
    pool: PgPool,
}

impl PgPresenceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PresenceRepository for PgPresenceRepository {
    async fn set_user_presence(
        &self,
        user_id: UserId,
        is_online: bool,
        at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        // Writes that arrive out of order must not roll presence back.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_online = $2, last_active_at = $3
            WHERE id = $1
              AND (last_active_at IS NULL OR last_active_at <= $3)
            "#,
        )
        .bind(user_id)
        .bind(is_online)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(user_id = %user_id, is_online, "Stale presence write skipped");
        }
        Ok(())
    }

    async fn reset_all_presence(&self, at: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_online = FALSE, last_active_at = GREATEST(COALESCE(last_active_at, $1), $1)
            WHERE is_online = TRUE
            "#,
        )
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
