//! Application Layer
//!
//! The realtime core: everything that happens between an admitted socket and
//! the rooms, calls and presence it affects. Storage is only reached through
//! the domain collaborator traits.

pub mod realtime;
