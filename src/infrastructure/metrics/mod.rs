//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - HTTP request counts and latency
//! - Live realtime connections and online users
//! - Inbound events by name and outcome
//! - Handshake rejections by reason
//! - Active call sessions
//! - Failed background persistence writes
//! - Database connection pool stats

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

const NAMESPACE: &str = "chat_realtime";

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// HTTP request counter - tracks total requests by method, path, and status code
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests").namespace(NAMESPACE),
        &["method", "path", "status"],
    )
    .expect("Failed to create HTTP_REQUESTS_TOTAL metric")
});

/// HTTP request latency histogram - tracks request duration in seconds
pub static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
    HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency in seconds",
        )
        .namespace(NAMESPACE)
        .buckets(buckets),
        &["method", "path"],
    )
    .expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric")
});

/// Registered connections and distinct online users
pub static REALTIME_CONNECTIONS: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        Opts::new(
            "realtime_connections",
            "Registered realtime connections and online users",
        )
        .namespace(NAMESPACE),
        &["kind"], // "connections", "online_users"
    )
    .expect("Failed to create REALTIME_CONNECTIONS metric")
});

/// Inbound events by name and outcome
pub static REALTIME_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("realtime_events_total", "Inbound realtime events handled").namespace(NAMESPACE),
        &["event", "outcome"], // outcome: "ok", "error", "dropped", "rejected"
    )
    .expect("Failed to create REALTIME_EVENTS_TOTAL metric")
});

/// Rejected handshakes by reason
pub static AUTH_REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("auth_rejections_total", "Rejected WebSocket handshakes").namespace(NAMESPACE),
        &["reason"],
    )
    .expect("Failed to create AUTH_REJECTIONS_TOTAL metric")
});

pub static ACTIVE_CALLS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(Opts::new("active_calls", "Live call sessions").namespace(NAMESPACE))
        .expect("Failed to create ACTIVE_CALLS metric")
});

/// Fire-and-forget writes that failed
pub static PERSISTENCE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "persistence_failures_total",
            "Background persistence writes that failed",
        )
        .namespace(NAMESPACE),
        &["operation"],
    )
    .expect("Failed to create PERSISTENCE_FAILURES_TOTAL metric")
});

/// Database connection pool stats
pub static DB_POOL_CONNECTIONS: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        Opts::new("db_pool_connections", "Database connection pool statistics").namespace(NAMESPACE),
        &["state"], // "idle", "active", "max"
    )
    .expect("Failed to create DB_POOL_CONNECTIONS metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("Failed to register HTTP_REQUESTS_TOTAL");
    registry
        .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
        .expect("Failed to register HTTP_REQUEST_DURATION_SECONDS");
    registry
        .register(Box::new(REALTIME_CONNECTIONS.clone()))
        .expect("Failed to register REALTIME_CONNECTIONS");
    registry
        .register(Box::new(REALTIME_EVENTS_TOTAL.clone()))
        .expect("Failed to register REALTIME_EVENTS_TOTAL");
    registry
        .register(Box::new(AUTH_REJECTIONS_TOTAL.clone()))
        .expect("Failed to register AUTH_REJECTIONS_TOTAL");
    registry
        .register(Box::new(ACTIVE_CALLS.clone()))
        .expect("Failed to register ACTIVE_CALLS");
    registry
        .register(Box::new(PERSISTENCE_FAILURES_TOTAL.clone()))
        .expect("Failed to register PERSISTENCE_FAILURES_TOTAL");
    registry
        .register(Box::new(DB_POOL_CONNECTIONS.clone()))
        .expect("Failed to register DB_POOL_CONNECTIONS");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Helper to record HTTP request metrics
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration_secs);
}

/// Helper to update the registry gauges
pub fn set_realtime_connections(connections: i64, online_users: i64) {
    REALTIME_CONNECTIONS
        .with_label_values(&["connections"])
        .set(connections as f64);
    REALTIME_CONNECTIONS
        .with_label_values(&["online_users"])
        .set(online_users as f64);
}

pub fn record_event(event: &str, outcome: &str) {
    REALTIME_EVENTS_TOTAL
        .with_label_values(&[event, outcome])
        .inc();
}

pub fn record_auth_rejection(reason: &str) {
    AUTH_REJECTIONS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn set_active_calls(count: i64) {
    ACTIVE_CALLS.set(count);
}

pub fn record_persistence_failure(operation: &str) {
    PERSISTENCE_FAILURES_TOTAL
        .with_label_values(&[operation])
        .inc();
}

/// Helper to update database pool stats
pub fn update_db_pool_stats(idle: u32, active: u32, max: u32) {
    DB_POOL_CONNECTIONS
        .with_label_values(&["idle"])
        .set(idle as f64);
    DB_POOL_CONNECTIONS
        .with_label_values(&["active"])
        .set(active as f64);
    DB_POOL_CONNECTIONS
        .with_label_values(&["max"])
        .set(max as f64);
}
