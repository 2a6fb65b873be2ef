//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - Credential verification (JWT)
//! - Database pool and repositories (PostgreSQL)
//! - Prometheus metrics

pub mod auth;
pub mod database;
pub mod metrics;
pub mod repositories;
