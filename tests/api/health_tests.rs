//! Health Check API Tests
//!
//! The router runs against a lazily connected pool pointed at a closed port,
//! so the database check always fails while the realtime side stays up.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;

use crate::common::{test_settings, TestHub};
use chat_realtime::presentation::http::create_router;
use chat_realtime::startup::AppState;

fn server(t: &TestHub) -> TestServer {
    let settings = test_settings();
    let db = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(300))
        .connect_lazy(&settings.database.url)
        .unwrap();
    let state = AppState {
        db,
        hub: Arc::clone(&t.hub),
        settings: Arc::new(settings),
    };
    TestServer::new(create_router(state)).unwrap()
}

#[tokio::test]
async fn test_health_check_returns_ok() {
    let t = TestHub::new();
    let response = server(&t).get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_liveness_endpoint() {
    let t = TestHub::new();
    let response = server(&t).get("/health/live").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "alive");
}

#[tokio::test]
async fn test_readiness_reports_database_outage_and_live_counters() {
    let t = TestHub::new();
    let alice = t.store.add_user();
    let _phone = t.connect(&alice).await;
    let _laptop = t.connect(&alice).await;

    let response = server(&t).get("/health/ready").await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["checks"]["database"]["status"], "unhealthy");
    assert_eq!(body["checks"]["realtime"]["active_connections"], 2);
    assert_eq!(body["checks"]["realtime"]["online_users"], 1);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_namespace() {
    let t = TestHub::new();
    let srv = server(&t);

    // Touch a counter so the family is present.
    srv.get("/health").await;
    let response = srv.get("/metrics").await;

    response.assert_status_ok();
    assert!(response.text().contains("chat_realtime_http_requests_total"));
}
