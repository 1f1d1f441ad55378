//! Metrics collection and exposition.
//!
//! # Metrics
//! - `imgcache_requests_total` (counter): inbound requests by method, status
//! - `imgcache_request_duration_seconds` (histogram): inbound latency
//! - `imgcache_retrievals_total` (counter): retrievals by outcome
//! - `imgcache_origin_fetch_duration_seconds` (histogram): origin latency
//! - `imgcache_cache_entries` (gauge): entries held by the store
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Prometheus exporter served on its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record a completed inbound request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "imgcache_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("imgcache_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record the outcome of one retrieval.
pub fn record_retrieval(outcome: &'static str) {
    counter!("imgcache_retrievals_total", "outcome" => outcome).increment(1);
}

/// Record an origin or fallback fetch.
pub fn record_origin_fetch(result: &'static str, start: Instant) {
    histogram!("imgcache_origin_fetch_duration_seconds", "result" => result)
        .record(start.elapsed().as_secs_f64());
}

/// Publish the current cache size.
pub fn record_cache_size(entries: usize) {
    gauge!("imgcache_cache_entries").set(entries as f64);
}
