//! Session Authenticator
//!
//! Decides whether a new socket is admitted. Nothing else about the socket is
//! processed until this returns an identity.

use std::sync::Arc;

use crate::domain::{CredentialVerifier, IdentitySnapshot, UserRepository};
use crate::shared::error::AuthError;

/// Credential material found on the upgrade request.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    /// Explicit auth field (the `token` query parameter)
    pub auth_token: Option<String>,
    /// Value of the auth cookie
    pub cookie_token: Option<String>,
}

impl Handshake {
    /// The credential to verify: the explicit field wins over the cookie.
    pub fn credential(&self) -> Option<&str> {
        non_blank(self.auth_token.as_deref()).or_else(|| non_blank(self.cookie_token.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value
        .map(|v| v.trim())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v))
        .filter(|v| !v.is_empty())
}

/// Admits connections by verifying their credential and loading the user.
pub struct SessionAuthenticator {
    verifier: Arc<dyn CredentialVerifier>,
    users: Arc<dyn UserRepository>,
}

impl SessionAuthenticator {
    pub fn new(verifier: Arc<dyn CredentialVerifier>, users: Arc<dyn UserRepository>) -> Self {
        Self { verifier, users }
    }

    /// Resolve a handshake to the identity snapshot of its user.
    pub async fn authenticate(&self, handshake: &Handshake) -> Result<IdentitySnapshot, AuthError> {
        let token = handshake.credential().ok_or(AuthError::MissingCredential)?;

        let user_id = self.verifier.verify_credential(token).await?;

        self.users
            .get_user(user_id)
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?
            .ok_or(AuthError::UnknownUser)
    }
}
