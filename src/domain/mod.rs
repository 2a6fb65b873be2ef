//! # Domain Layer
//!
//! Types and collaborator contracts of the realtime core. Independent of the
//! transport and of any storage engine.
//!
//! ## Structure
//!
//! - **entities**: identity, message state, presence, call lifecycle
//! - **value_objects**: identifier types
//! - **services**: external domain logic contracts (credential verification)

pub mod entities;
pub mod services;
pub mod value_objects;

// Re-export commonly used types
pub use entities::*;
pub use services::*;
pub use value_objects::*;
