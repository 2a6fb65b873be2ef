//! HTTP Surface
//!
//! Routing and the operational handlers.

pub mod handlers;
pub mod routes;

pub use routes::create_router;
