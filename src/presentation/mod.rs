//! Presentation Layer
//!
//! HTTP routes and the WebSocket endpoint.

pub mod http;
pub mod middleware;
pub mod websocket;
