//! Realtime hub
//!
//! Wires the registry, rooms and the per-concern coordinators together and is
//! the single entry point used by the transport layer.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use super::authenticator::{Handshake, SessionAuthenticator};
use super::calls::CallRelay;
use super::connection::{Connection, OutboundReceiver};
use super::delivery::DeliveryTracker;
use super::events;
use super::presence::PresenceCoordinator;
use super::registry::ConnectionRegistry;
use super::rooms::{RoomKey, RoomManager};
use super::router::EventRouter;
use crate::domain::{
    ConversationId, ConversationRepository, CredentialVerifier, IdentitySnapshot,
    MessageRepository, PresenceRepository, UserId, UserRepository,
};
use crate::infrastructure::metrics;
use crate::shared::error::{AppError, AuthError};

/// Outbound side channel for the REST layer.
///
/// Lets code outside the socket path push events to live clients without
/// knowing anything about connections.
pub trait RealtimeBroadcaster: Send + Sync {
    /// Send an event to every live member of a room.
    fn broadcast(&self, room: &RoomKey, event: &str, payload: Value) -> usize;

    /// Send an event to every device of a user.
    fn notify_user(&self, user_id: UserId, event: &str, payload: Value) -> usize;

    /// Tell a user about a conversation created after they connected.
    fn notify_conversation_added(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
        conversation: Value,
    ) -> usize;
}

/// Storage and credential collaborators the hub depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub credentials: Arc<dyn CredentialVerifier>,
    pub users: Arc<dyn UserRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub presence: Arc<dyn PresenceRepository>,
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Idle window after which a typing indicator stops on its own
    pub typing_idle: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            typing_idle: Duration::from_millis(3000),
        }
    }
}

pub struct RealtimeHub {
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomManager>,
    authenticator: SessionAuthenticator,
    presence: PresenceCoordinator,
    calls: CallRelay,
    delivery: DeliveryTracker,
    router: EventRouter,
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
}

impl RealtimeHub {
    pub fn new(collaborators: Collaborators, config: HubConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomManager::new());

        Self {
            authenticator: SessionAuthenticator::new(
                collaborators.credentials,
                collaborators.users,
            ),
            presence: PresenceCoordinator::new(
                collaborators.presence,
                Arc::clone(&collaborators.conversations),
                Arc::clone(&rooms),
            ),
            calls: CallRelay::new(
                Arc::clone(&registry),
                Arc::clone(&rooms),
                Arc::clone(&collaborators.conversations),
                Arc::clone(&collaborators.messages),
            ),
            delivery: DeliveryTracker::new(
                Arc::clone(&rooms),
                Arc::clone(&collaborators.messages),
                config.typing_idle,
            ),
            router: EventRouter::with_default_handlers(),
            conversations: collaborators.conversations,
            messages: collaborators.messages,
            registry,
            rooms,
        }
    }

    /// Admission check for a new socket.
    pub async fn authenticate(&self, handshake: &Handshake) -> Result<IdentitySnapshot, AuthError> {
        let result = self.authenticator.authenticate(handshake).await;
        match &result {
            Ok(identity) => {
                tracing::debug!(user_id = %identity.user_id, "Handshake accepted");
            }
            Err(AuthError::Unavailable(detail)) => {
                metrics::record_auth_rejection("auth_unavailable");
                tracing::error!(error = %detail, "Authentication collaborator failed");
            }
            Err(e) => {
                metrics::record_auth_rejection(e.reason());
                tracing::info!(reason = e.reason(), "Handshake rejected");
            }
        }
        result
    }

    /// Bring an admitted connection online.
    ///
    /// Joins the personal room and one room per conversation the user is in
    /// right now, then registers it. The first device of a user announces
    /// the user as online.
    pub async fn connect(&self, identity: IdentitySnapshot) -> (Arc<Connection>, OutboundReceiver) {
        let (conn, rx) = Connection::open(identity);
        let user_id = conn.user_id();

        self.rooms.join(&conn, RoomKey::User(user_id));
        match self.conversations.list_user_conversations(user_id).await {
            Ok(conversations) => {
                for conversation_id in conversations {
                    self.rooms.join(&conn, RoomKey::Conversation(conversation_id));
                }
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Conversation snapshot failed, only the personal room was joined"
                );
            }
        }

        let _presence = self.presence.lock_user(user_id).await;
        if self.registry.register(Arc::clone(&conn)) {
            self.presence.publish(user_id, true).await;
        }

        (conn, rx)
    }

    /// Take a connection down. Idempotent.
    ///
    /// The connection is closed before anything else, which hides it from
    /// every room at once; room and call membership is then removed before
    /// this returns.
    pub async fn disconnect(&self, conn: &Arc<Connection>) {
        if !conn.close() {
            return;
        }
        let user_id = conn.user_id();

        self.calls.remove_connection(conn);
        let rooms = self.rooms.remove_connection(conn);

        let _presence = self.presence.lock_user(user_id).await;
        let last = self.registry.unregister(conn.id());
        if last {
            self.presence.publish(user_id, false).await;
        }

        tracing::info!(
            user_id = %user_id,
            connection_id = %conn.id(),
            rooms_left = rooms.len(),
            last_for_user = last,
            connected_secs = (chrono::Utc::now() - conn.created_at()).num_seconds(),
            "Connection closed"
        );
    }

    /// Route one inbound event from `conn`.
    pub async fn dispatch(
        &self,
        conn: &Arc<Connection>,
        event: &str,
        data: Value,
    ) -> Result<(), AppError> {
        self.router.dispatch(self, conn, event, data).await
    }

    /// Mark all persisted presence offline. Run once before accepting sockets.
    pub async fn recover_presence(&self) -> Result<u64, AppError> {
        self.presence.recover_on_startup().await
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    pub fn presence(&self) -> &PresenceCoordinator {
        &self.presence
    }

    pub fn calls(&self) -> &CallRelay {
        &self.calls
    }

    pub fn delivery(&self) -> &DeliveryTracker {
        &self.delivery
    }

    pub fn conversations(&self) -> &dyn ConversationRepository {
        self.conversations.as_ref()
    }

    pub fn messages(&self) -> &dyn MessageRepository {
        self.messages.as_ref()
    }
}

impl RealtimeBroadcaster for RealtimeHub {
    fn broadcast(&self, room: &RoomKey, event: &str, payload: Value) -> usize {
        self.rooms.broadcast(room, event, payload, None)
    }

    fn notify_user(&self, user_id: UserId, event: &str, payload: Value) -> usize {
        self.rooms
            .broadcast(&RoomKey::User(user_id), event, payload, None)
    }

    fn notify_conversation_added(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
        conversation: Value,
    ) -> usize {
        self.notify_user(
            user_id,
            events::CONVERSATION_ADDED,
            json!({ "conversationId": conversation_id, "conversation": conversation }),
        )
    }
}
