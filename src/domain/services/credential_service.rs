//! Credential verification contract.

use async_trait::async_trait;

use crate::domain::UserId;
use crate::shared::error::AuthError;

/// Verifies a bearer credential issued by the account service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Resolve the credential to the user it was issued for.
    async fn verify_credential(&self, token: &str) -> Result<UserId, AuthError>;
}
