//! User Repository Implementation
//!
//! PostgreSQL lookup of the identity snapshot taken at admission.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{IdentitySnapshot, UserId, UserRepository};
use crate::shared::error::AppError;

/// Database row for the columns the realtime core needs from `users`.
#[derive(Debug, sqlx::FromRow)]
struct IdentityRow {
    id: Uuid,
    username: String,
    avatar_url: Option<String>,
}

impl From<IdentityRow> for IdentitySnapshot {
    fn from(row: IdentityRow) -> Self {
        Self {
            user_id: row.id,
            username: row.username,
            avatar_url: row.avatar_url,
        }
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn get_user(&self, user_id: UserId) -> Result<Option<IdentitySnapshot>, AppError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT id, username, avatar_url
            FROM users
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(IdentitySnapshot::from))
    }
}
