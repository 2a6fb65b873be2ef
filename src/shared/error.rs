//! Application Error Types
//!
//! Centralized error handling for the realtime core. Admission failures use
//! [`AuthError`]; everything that can go wrong after a connection is admitted
//! uses [`AppError`] and is surfaced to the originating connection only.

use serde::Serialize;

/// Reasons a connection is refused before admission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("No credential supplied")]
    MissingCredential,

    #[error("Credential is invalid")]
    InvalidCredential,

    #[error("Credential has expired")]
    ExpiredCredential,

    #[error("User not found")]
    UnknownUser,

    #[error("Authentication unavailable: {0}")]
    Unavailable(String),
}

impl AuthError {
    /// Machine-readable rejection reason sent to the client.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "missing_credential",
            AuthError::InvalidCredential => "invalid_credential",
            AuthError::ExpiredCredential => "credential_expired",
            AuthError::UnknownUser => "unknown_user",
            AuthError::Unavailable(_) => "auth_unavailable",
        }
    }

    /// WebSocket close code used when rejecting the socket.
    pub fn close_code(&self) -> u16 {
        match self {
            AuthError::Unavailable(_) => 1011,
            _ => 4401,
        }
    }
}

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Signaling target not found: {0}")]
    TargetNotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Machine-readable code carried by the connection-scoped `error` event.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::TargetNotFound(_) => "target_not_found",
            AppError::Persistence(_) | AppError::Database(_) => "persistence_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Whether the failure came from a persistence collaborator.
    pub fn is_persistence(&self) -> bool {
        matches!(self, AppError::Persistence(_) | AppError::Database(_))
    }

    /// Whether the originating connection should hear about this failure.
    ///
    /// Vanished signaling targets are dropped without telling anyone.
    pub fn is_reportable(&self) -> bool {
        !matches!(self, AppError::TargetNotFound(_))
    }

    /// Message safe to show a client. Storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Persistence(_) | AppError::Database(_) => "Storage unavailable".into(),
            AppError::Internal(_) => "Internal server error".into(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::Validation(format!("Malformed payload: {}", error))
    }
}

/// Error body of the connection-scoped `error` event
#[derive(Debug, Serialize)]
pub struct ErrorEvent {
    pub event: String,
    pub code: &'static str,
    pub message: String,
}

impl ErrorEvent {
    pub fn new(event: &str, error: &AppError) -> Self {
        Self {
            event: event.to_string(),
            code: error.code(),
            message: error.public_message(),
        }
    }
}
