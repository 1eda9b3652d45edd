//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gallery metrics (requests, throttling, auth failures)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gallery_requests_total` (counter): requests by operation and status
//! - `gallery_request_duration_seconds` (histogram): latency by operation
//! - `gallery_rate_limited_total` (counter): 429 responses by operation
//! - `gallery_rate_limit_degraded_total` (counter): checks served by the local fallback
//! - `gallery_auth_failures_total` (counter): 401 responses by operation
//! - `gallery_login_total` (counter): login attempts by outcome
//!
//! # Design Decisions
//! - Labels are bounded: operation class names and status codes only
//! - Client addresses and usernames stay out of labels

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

pub mod names {
    pub const REQUESTS_TOTAL: &str = "gallery_requests_total";
    pub const REQUEST_DURATION_SECONDS: &str = "gallery_request_duration_seconds";
    pub const RATE_LIMITED_TOTAL: &str = "gallery_rate_limited_total";
    pub const RATE_LIMIT_DEGRADED_TOTAL: &str = "gallery_rate_limit_degraded_total";
    pub const AUTH_FAILURES_TOTAL: &str = "gallery_auth_failures_total";
    pub const LOGIN_TOTAL: &str = "gallery_login_total";
}

/// Install the Prometheus recorder and its scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus recorder"),
    }
}

pub fn record_request(op: &'static str, status: u16, start: Instant) {
    counter!(names::REQUESTS_TOTAL, "op" => op, "status" => status.to_string()).increment(1);
    histogram!(names::REQUEST_DURATION_SECONDS, "op" => op).record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(op: &'static str) {
    counter!(names::RATE_LIMITED_TOTAL, "op" => op).increment(1);
}

pub fn record_rate_limit_degraded() {
    counter!(names::RATE_LIMIT_DEGRADED_TOTAL).increment(1);
}

pub fn record_auth_failure(op: &'static str) {
    counter!(names::AUTH_FAILURES_TOTAL, "op" => op).increment(1);
}

pub fn record_login(outcome: &'static str) {
    counter!(names::LOGIN_TOTAL, "outcome" => outcome).increment(1);
}
