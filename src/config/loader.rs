//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::SiteConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// Relative `paths` entries are resolved against the config file's directory.
pub fn load_config(path: &Path) -> Result<SiteConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: SiteConfig = toml::from_str(&content)?;

    if let Some(base) = path.parent() {
        if config.paths.source_dir.is_relative() {
            config.paths.source_dir = base.join(&config.paths.source_dir);
        }
        if config.paths.build_dir.is_relative() {
            config.paths.build_dir = base.join(&config.paths.build_dir);
        }
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
