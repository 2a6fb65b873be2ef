//! WebSocket Endpoint
//!
//! Real-time communication via WebSocket connections.

pub mod handler;
pub mod heartbeat;
pub mod messages;

pub use handler::ws_handler;
pub use messages::{ClientFrame, HandshakeQuery};
