//! Metrics collection and exposition.
//!
//! # Metrics
//! - `build_units_total` (counter): compiled units by `outcome` (succeeded, failed, conflict, rejected)
//! - `build_unit_duration_seconds` (histogram): per-unit compile time
//! - `dispatch_requests_total` (counter): dispatches by `route`, `outcome`
//! - `dispatch_duration_seconds` (histogram): spawn to response, by `route`
//! - `dispatch_in_flight` (gauge): route processes currently alive
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Route labels are logical paths, which are bounded by the source tree

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_build_unit(outcome: &'static str, duration: Duration) {
    metrics::counter!("build_units_total", "outcome" => outcome).increment(1);
    metrics::histogram!("build_unit_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_dispatch(route: &str, outcome: &'static str, started: Instant) {
    let route = route.to_string();
    metrics::counter!("dispatch_requests_total", "route" => route.clone(), "outcome" => outcome).increment(1);
    metrics::histogram!("dispatch_duration_seconds", "route" => route).record(started.elapsed().as_secs_f64());
}

/// Holds `dispatch_in_flight` up for as long as it lives.
pub struct InFlightGuard(());

impl InFlightGuard {
    pub fn new() -> Self {
        metrics::gauge!("dispatch_in_flight").increment(1.0);
        Self(())
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        metrics::gauge!("dispatch_in_flight").decrement(1.0);
    }
}
