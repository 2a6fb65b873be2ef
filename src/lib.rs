//! # Chat Realtime Library
//!
//! The real-time core of a chat application:
//! - WebSocket admission with token/cookie authentication
//! - Per-conversation, per-user and per-call rooms with fan-out
//! - Multi-device presence with ordered online/offline transitions
//! - Typing indicators and delivery/read receipts
//! - WebRTC call signaling relay with missed/declined/ended history
//!
//! ## Architecture
//!
//! - **Domain Layer**: Identifiers, entities and collaborator traits
//! - **Application Layer**: The realtime hub and its coordinators
//! - **Infrastructure Layer**: PostgreSQL repositories, JWT verification, metrics
//! - **Presentation Layer**: WebSocket endpoint, health and metrics routes
//!
//! ## Module Structure
//!
//! ```text
//! chat_realtime/
//! +-- config/         Configuration management
//! +-- domain/         Identifiers, entities, and collaborator traits
//! +-- application/    Realtime hub, rooms, presence, calls, delivery
//! +-- infrastructure/ Database, auth, and metrics implementations
//! +-- presentation/   HTTP routes and WebSocket handler
//! +-- shared/         Errors and payload validation
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
