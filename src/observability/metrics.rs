//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define framework metrics (requests, latency, sessions, routes)
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `web_requests_total` (counter): requests by method, status
//! - `web_request_duration_seconds` (histogram): dispatch latency
//! - `web_sessions_created_total` (counter): new session ids by store
//! - `web_sessions_evicted_total` (counter): sweeper evictions by store
//! - `web_routes_rejected_total` (counter): routes dropped at registration
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - The exporter is optional and bound to its own address

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "web_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("web_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_session_created(store: &'static str) {
    counter!("web_sessions_created_total", "store" => store).increment(1);
}

pub fn record_sessions_evicted(store: &'static str, evicted: usize) {
    counter!("web_sessions_evicted_total", "store" => store).increment(evicted as u64);
}

pub fn record_route_rejected() {
    counter!("web_routes_rejected_total").increment(1);
}
