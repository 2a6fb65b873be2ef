//! Realtime core
//!
//! Connection registry, rooms, presence, call signaling and the event router
//! behind the WebSocket endpoint. [`RealtimeHub`] is the entry point.

pub mod authenticator;
pub mod calls;
pub mod connection;
pub mod delivery;
pub mod events;
pub mod hub;
pub mod payloads;
pub mod presence;
pub mod registry;
pub mod rooms;
pub mod router;

use std::future::Future;

pub use authenticator::{Handshake, SessionAuthenticator};
pub use connection::{Connection, OutboundReceiver};
pub use events::OutboundEvent;
pub use hub::{Collaborators, HubConfig, RealtimeBroadcaster, RealtimeHub};
pub use rooms::RoomKey;

use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Run a persistence write in the background. Failures are logged, never
/// surfaced to a client.
pub(crate) fn detach<F, T>(operation: &'static str, write: F)
where
    F: Future<Output = Result<T, AppError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = write.await {
            metrics::record_persistence_failure(operation);
            tracing::warn!(operation, error = %e, "Background write failed");
        }
    });
}
