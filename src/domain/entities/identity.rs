//! Identity snapshot and user lookup contract.
//!
//! Backed by the `users` table owned by the REST layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::UserId;
use crate::shared::error::AppError;

/// Who a connection belongs to, captured once at admission.
///
/// Never refreshed for the lifetime of the connection; a profile change is
/// picked up on the next connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySnapshot {
    pub user_id: UserId,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// User lookup used by the session authenticator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Load the identity snapshot for a user, `None` if the account is gone.
    async fn get_user(&self, user_id: UserId) -> Result<Option<IdentitySnapshot>, AppError>;
}
