//! # Chat Realtime Server
//!
//! Entry point for the real-time chat core. Initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Database connection pool and presence recovery
//! - HTTP/WebSocket server

use anyhow::Result;
use tracing::info;

use chat_realtime::config::Settings;
use chat_realtime::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    chat_realtime::telemetry::init_tracing();

    info!("Starting realtime server...");

    // Load configuration from environment and config files
    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        "Configuration loaded"
    );

    // Build and run the application
    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    Ok(())
}
