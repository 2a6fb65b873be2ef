//! Presence record and its persistence contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::UserId;
use crate::shared::error::AppError;

/// Persisted online/offline state of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub is_online: bool,
    pub last_active_at: DateTime<Utc>,
}

impl PresenceRecord {
    pub fn new(user_id: UserId, is_online: bool, last_active_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            is_online,
            last_active_at,
        }
    }
}

/// Presence storage owned by the REST layer's database.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresenceRepository: Send + Sync {
    /// Record a presence transition. Implementations must ignore writes older
    /// than the stored `last_active_at`.
    async fn set_user_presence(
        &self,
        user_id: UserId,
        is_online: bool,
        at: DateTime<Utc>,
    ) -> Result<(), AppError>;

    /// Mark every user offline. Returns the number of records changed.
    async fn reset_all_presence(&self, at: DateTime<Utc>) -> Result<u64, AppError>;
}
