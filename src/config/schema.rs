//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the site
//! engine. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the site engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SiteConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Source tree and build output locations.
    pub paths: PathsConfig,

    /// Toolchain used to turn route sources into executables.
    pub compiler: CompilerConfig,

    /// Per-request process settings.
    pub dispatch: DispatchConfig,

    /// Registry reload and rebuild behaviour.
    pub reload: ReloadConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Where route sources live and where artifacts are written.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the route source tree.
    pub source_dir: PathBuf,

    /// Root of the build output (binaries, markers, scratch space).
    pub build_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("routes"),
            build_dir: PathBuf::from(".build"),
        }
    }
}

/// Build mode for a compiled route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    #[default]
    Debug,
    Release,
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildMode::Debug => write!(f, "debug"),
            BuildMode::Release => write!(f, "release"),
        }
    }
}

/// Toolchain configuration.
///
/// `{source}` and `{output}` are substituted in every argument.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Toolchain executable.
    pub program: String,

    /// Arguments common to every build mode.
    pub args: Vec<String>,

    /// Extra arguments for debug builds.
    pub debug_args: Vec<String>,

    /// Extra arguments for release builds.
    pub release_args: Vec<String>,

    /// File extension identifying route source units (without the dot).
    pub source_extension: String,

    /// Unit name that stands for its directory.
    pub index_name: String,

    /// Upper bound on one toolchain invocation in seconds.
    pub timeout_secs: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: "rustc".to_string(),
            args: vec![
                "--edition=2021".to_string(),
                "{source}".to_string(),
                "-o".to_string(),
                "{output}".to_string(),
            ],
            debug_args: Vec::new(),
            release_args: vec!["-C".to_string(), "opt-level=3".to_string()],
            source_extension: "rs".to_string(),
            index_name: "index".to_string(),
            timeout_secs: 300,
        }
    }
}

impl CompilerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Per-request process settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Wall-clock limit for one route process, from spawn.
    pub timeout_ms: u64,

    /// Maximum bytes read from a route's standard output.
    pub max_output_bytes: usize,

    /// Maximum bytes of standard error kept for diagnostics.
    pub max_stderr_bytes: usize,

    /// Maximum request body size accepted by the HTTP layer.
    pub max_body_bytes: usize,

    /// Maximum number of route processes alive at once.
    pub max_concurrent: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_output_bytes: 8 * 1024 * 1024,
            max_stderr_bytes: 64 * 1024,
            max_body_bytes: 2 * 1024 * 1024,
            max_concurrent: 256,
        }
    }
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Deployment mode; only development may rebuild on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Development,
    #[default]
    Production,
}

/// Registry reload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReloadConfig {
    pub mode: RunMode,

    /// Rebuild a route before dispatch when its source is newer than its binary.
    pub rebuild_on_stale: bool,

    /// Reload the registry when markers change on disk.
    pub watch_registry: bool,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Production,
            rebuild_on_stale: false,
            watch_registry: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "proc_router=info,tower_http=info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
