//! # Domain Services
//!
//! Contracts for domain logic that lives outside this crate.
//!
//! - **CredentialVerifier**: bearer credential validation

mod credential_service;

pub use credential_service::*;
