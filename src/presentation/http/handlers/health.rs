//! Health Check Handlers
//!
//! # Endpoints
//! - `GET /health` - Basic health check
//! - `GET /health/live` - Liveness check (is the process serving?)
//! - `GET /health/ready` - Readiness check (database reachable, hub counters)

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::infrastructure::metrics;
use crate::startup::AppState;

/// A ping slower than this marks the database as degraded.
const DB_DEGRADED_AFTER: Duration = Duration::from_millis(100);

static SERVER_START: Lazy<Instant> = Lazy::new(Instant::now);
static SERVER_START_TIME: Lazy<DateTime<Utc>> = Lazy::new(Utc::now);

/// Initialize the server start time (call during startup)
pub fn init_server_start() {
    Lazy::force(&SERVER_START);
    Lazy::force(&SERVER_START_TIME);
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

/// Readiness body
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub database: DatabaseHealth,
    pub realtime: RealtimeHealth,
}

#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Live counters from the realtime hub. Always healthy while the process runs.
#[derive(Debug, Serialize)]
pub struct RealtimeHealth {
    pub active_connections: usize,
    pub online_users: usize,
    pub rooms: usize,
    pub active_calls: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    fn status_code(self) -> StatusCode {
        match self {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "alive" })
}

/// Returns 503 when the database cannot be reached. Realtime delivery is
/// in-memory, but history and receipts would be silently lost without it.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let database = ping_database(&state).await;
    report_pool_stats(&state);

    let registry = state.hub.registry();
    let realtime = RealtimeHealth {
        active_connections: registry.connection_count(),
        online_users: registry.online_user_count(),
        rooms: state.hub.rooms().room_count(),
        active_calls: state.hub.calls().active_calls(),
    };

    let status = database.status;
    let body = ReadinessResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: SERVER_START.elapsed().as_secs(),
        started_at: *SERVER_START_TIME,
        checks: HealthChecks { database, realtime },
    };

    (status.status_code(), Json(body))
}

async fn ping_database(state: &AppState) -> DatabaseHealth {
    let start = Instant::now();
    match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => {
            let latency = start.elapsed();
            DatabaseHealth {
                status: classify_latency(latency),
                latency_ms: Some(latency.as_millis() as u64),
                message: None,
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Readiness database ping failed");
            DatabaseHealth {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                message: Some("Database unreachable".into()),
            }
        }
    }
}

fn classify_latency(latency: Duration) -> HealthStatus {
    if latency < DB_DEGRADED_AFTER {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}

fn report_pool_stats(state: &AppState) {
    let size = state.db.size();
    let idle = state.db.num_idle() as u32;
    metrics::update_db_pool_stats(
        idle,
        size.saturating_sub(idle),
        state.settings.database.max_connections,
    );
}
