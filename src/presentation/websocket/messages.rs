//! WebSocket Message Types
//!
//! Every frame in both directions is a JSON text message
//! `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::realtime::OutboundEvent;
use crate::domain::{ConnectionId, IdentitySnapshot};
use crate::shared::error::AuthError;

/// Incoming frame
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Query parameters of the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    /// Explicit credential; takes precedence over the auth cookie
    pub token: Option<String>,
}

/// `session:ready` payload, sent once after admission
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReadyPayload<'a> {
    pub connection_id: ConnectionId,
    pub user: &'a IdentitySnapshot,
}

/// `connect_error` payload, sent right before a rejected socket is closed
#[derive(Debug, Serialize)]
pub struct ConnectErrorPayload {
    pub reason: &'static str,
    pub message: String,
}

impl From<&AuthError> for ConnectErrorPayload {
    fn from(error: &AuthError) -> Self {
        let message = match error {
            // Collaborator details stay in the logs.
            AuthError::Unavailable(_) => "Authentication is temporarily unavailable".into(),
            other => other.to_string(),
        };
        Self {
            reason: error.reason(),
            message,
        }
    }
}

/// Encode an outbound event as a text frame body.
pub fn encode(event: &OutboundEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}
