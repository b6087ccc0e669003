//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! build, dispatch, http
//!     → logging.rs (tracing events, pretty or JSON on stdout)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Operator terminal or log shipper
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Route diagnostics (stderr, raw stdout) only ever reach the log
//! - Metrics calls are no-ops until an exporter is installed, so the
//!   build CLI and tests pay nothing for them

pub mod logging;
pub mod metrics;
