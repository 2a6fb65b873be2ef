//! # Domain Value Objects
//!
//! Immutable value types that represent domain concepts without identity.

mod ids;

pub use ids::*;
