//! Repository Implementations
//!
//! PostgreSQL implementations of the domain collaborator traits.
//!
//! The schema belongs to the REST layer; the realtime core only reads
//! participation and identity, and writes the columns listed below.
//!
//! ## Available Repositories
//!
//! - **UserRepository** - identity snapshot (`users`)
//! - **ConversationRepository** - participation (`conversation_participants`)
//! - **MessageRepository** - status, reaction, pin and call history (`messages`),
//!   read watermark (`conversation_participants.last_read_at`)
//! - **PresenceRepository** - `users.is_online`, `users.last_active_at`
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use sqlx::PgPool;
//! use crate::infrastructure::repositories::{PgUserRepository, PgPresenceRepository};
//!
//! async fn setup_repositories(pool: PgPool) {
//!     let users = PgUserRepository::new(pool.clone());
//!     let presence = PgPresenceRepository::new(pool.clone());
//! }
//! ```

pub mod conversation_repository;
pub mod message_repository;
pub mod presence_repository;
pub mod user_repository;

pub use conversation_repository::PgConversationRepository;
pub use message_repository::PgMessageRepository;
pub use presence_repository::PgPresenceRepository;
pub use user_repository::PgUserRepository;
