//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, anchor relative paths)
//!     → validation.rs (semantic checks)
//!     → SiteConfig (validated, immutable)
//!     → shared by value/Arc with the build and serve paths
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BuildMode, CompilerConfig, DispatchConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    PathsConfig, ReloadConfig, RunMode, SiteConfig,
};
pub use validation::{validate_config, ValidationError};
