//! Credential verification backed by signed JWTs.

pub mod jwt;

pub use jwt::{Claims, JwtCredentialVerifier};
