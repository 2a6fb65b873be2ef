//! # Domain Entities
//!
//! Business objects the realtime core reads and writes, and the collaborator
//! contracts used to reach their storage.
//!
//! ## Entities
//!
//! - **IdentitySnapshot**: who a connection belongs to
//! - **Message state**: delivery status, reaction, pin, call history entries
//! - **PresenceRecord**: persisted online/offline state
//! - **Call types**: call lifecycle state and outcome summary
//!
//! ## Repository Traits
//!
//! Each storage concern has a narrow trait implemented in the infrastructure
//! layer. The core never touches storage except through these.

mod call;
mod conversation;
mod identity;
mod message;
mod presence;

pub use call::{CallOutcome, CallState, CallSummary};
pub use conversation::ConversationRepository;
pub use identity::{IdentitySnapshot, UserRepository};
pub use message::{
    MessageRepository, MessageStatus, MessageType, NewMessage, PinState, Reaction, ReactionState,
};
pub use presence::{PresenceRecord, PresenceRepository};

#[cfg(test)]
pub use conversation::MockConversationRepository;
#[cfg(test)]
pub use identity::MockUserRepository;
#[cfg(test)]
pub use message::MockMessageRepository;
#[cfg(test)]
pub use presence::MockPresenceRepository;
