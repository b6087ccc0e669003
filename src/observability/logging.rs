//! Structured logging.
//!
//! # Responsibilities
//! - Install the global tracing subscriber once per process
//! - Honour `RUST_LOG` over the configured filter
//! - Pick pretty or JSON output
//!
//! # Design Decisions
//! - JSON format for production, pretty format for development
//! - A second `init` (tests, embedding) is ignored rather than fatal

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Filter directive used when neither `RUST_LOG` nor the config parse.
const FALLBACK_FILTER: &str = "proc_router=info";

/// Install the global subscriber. `verbose` raises the crate's own level to debug.
pub fn init(config: &ObservabilityConfig, verbose: bool) {
    let filter = filter(config, verbose);
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn filter(config: &ObservabilityConfig, verbose: bool) -> EnvFilter {
    let base = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_FILTER));
    if !verbose {
        return base;
    }
    match "proc_router=debug".parse() {
        Ok(directive) => base.add_directive(directive),
        Err(_) => base,
    }
}
