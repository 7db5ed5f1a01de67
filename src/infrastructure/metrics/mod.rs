//! Prometheus Metrics Module
//!
//! Process-wide metrics exposed on `/metrics` by the gateway and the archiver.
//!
//! # Metrics Collected
//! - Bus publishes by routing key and result
//! - Bus deliveries by routing key and handler outcome
//! - Active WebSocket connections
//! - Fan-out writes that failed because the client was gone
//! - Bot quote lookups by outcome
//! - HTTP request counts and latency

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

const NAMESPACE: &str = "stock_chat";

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

pub static BUS_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bus_published_total", "Events published to the message bus")
            .namespace(NAMESPACE),
        &["routing_key", "result"],
    )
    .expect("Failed to create BUS_PUBLISHED_TOTAL metric")
});

/// Outcome is one of "accept", "retry", "dropped" (undecodable) or "dead"
/// (retries exhausted).
pub static BUS_DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bus_deliveries_total", "Bus deliveries handled by consumers")
            .namespace(NAMESPACE),
        &["routing_key", "outcome"],
    )
    .expect("Failed to create BUS_DELIVERIES_TOTAL metric")
});

pub static WEBSOCKET_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new(
            "websocket_connections_active",
            "Number of registered WebSocket connections",
        )
        .namespace(NAMESPACE),
    )
    .expect("Failed to create WEBSOCKET_CONNECTIONS_ACTIVE metric")
});

pub static FANOUT_WRITE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new(
            "fanout_write_failures_total",
            "Frames that could not be handed to a client connection",
        )
        .namespace(NAMESPACE),
    )
    .expect("Failed to create FANOUT_WRITE_FAILURES_TOTAL metric")
});

pub static BOT_QUOTES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bot_quotes_total", "Stock quote lookups by outcome").namespace(NAMESPACE),
        &["outcome"],
    )
    .expect("Failed to create BOT_QUOTES_TOTAL metric")
});

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests").namespace(NAMESPACE),
        &["method", "path", "status"],
    )
    .expect("Failed to create HTTP_REQUESTS_TOTAL metric")
});

pub static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];
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

fn register_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(BUS_PUBLISHED_TOTAL.clone()),
        Box::new(BUS_DELIVERIES_TOTAL.clone()),
        Box::new(WEBSOCKET_CONNECTIONS_ACTIVE.clone()),
        Box::new(FANOUT_WRITE_FAILURES_TOTAL.clone()),
        Box::new(BOT_QUOTES_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            tracing::error!(error = %e, "Failed to register metric");
        }
    }
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

pub fn record_bus_publish(routing_key: &str, result: &str) {
    BUS_PUBLISHED_TOTAL
        .with_label_values(&[routing_key, result])
        .inc();
}

pub fn record_bus_delivery(routing_key: &str, outcome: &str) {
    BUS_DELIVERIES_TOTAL
        .with_label_values(&[routing_key, outcome])
        .inc();
}

pub fn set_websocket_connections(count: usize) {
    WEBSOCKET_CONNECTIONS_ACTIVE.set(count as i64);
}

pub fn record_fanout_failures(count: usize) {
    FANOUT_WRITE_FAILURES_TOTAL.inc_by(count as u64);
}

pub fn record_bot_quote(outcome: &str) {
    BOT_QUOTES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Helper to record HTTP request metrics
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let status = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, status.as_str()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration_secs);
}
