//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;

use crate::application::realtime::{Collaborators, HubConfig, RealtimeHub};
use crate::config::Settings;
use crate::infrastructure::auth::JwtCredentialVerifier;
use crate::infrastructure::database;
use crate::infrastructure::repositories::{
    PgConversationRepository, PgMessageRepository, PgPresenceRepository, PgUserRepository,
};
use crate::presentation::http::routes;
use crate::presentation::http::handlers::health;
use crate::presentation::middleware::{cors, logging};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub hub: Arc<RealtimeHub>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Wire the Postgres-backed collaborators into a fresh hub.
    pub fn new(db: PgPool, settings: Settings) -> Self {
        let collaborators = Collaborators {
            credentials: Arc::new(JwtCredentialVerifier::new(&settings.jwt.secret)),
            users: Arc::new(PgUserRepository::new(db.clone())),
            conversations: Arc::new(PgConversationRepository::new(db.clone())),
            messages: Arc::new(PgMessageRepository::new(db.clone())),
            presence: Arc::new(PgPresenceRepository::new(db.clone())),
        };
        let hub = RealtimeHub::new(
            collaborators,
            HubConfig {
                typing_idle: settings.websocket.typing_idle(),
            },
        );

        Self {
            db,
            hub: Arc::new(hub),
            settings: Arc::new(settings),
        }
    }
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        health::init_server_start();

        // Create database pool
        let db = database::create_pool(&settings.database).await?;
        tracing::info!("Database connection pool created");

        let cors_layer = cors::create_cors_layer(&settings.cors);
        let addr = settings.server_addr();
        let state = AppState::new(db, settings);

        // Presence rows left online by a previous process are stale; clear
        // them before any client can connect.
        state.hub.recover_presence().await?;

        // Build router with middleware
        let router = routes::create_router(state)
            .layer(logging::create_trace_layer())
            .layer(cors_layer);

        // Bind to address
        let listener = TcpListener::bind(addr.as_str()).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self { listener, router })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
