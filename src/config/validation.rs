//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0, addresses parse)
//! - Keep development-only behaviour out of production configs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SiteConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{RunMode, SiteConfig};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: must not be empty")]
    Empty { field: &'static str },

    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field}: '{value}' is not a socket address")]
    BadAddress { field: &'static str, value: String },

    #[error("compiler.index_name: '{0}' must be a single path segment")]
    BadIndexName(String),

    #[error("compiler.source_extension: '{0}' must not contain '.' or '/'")]
    BadExtension(String),

    #[error("paths: source_dir and build_dir must differ")]
    SameDirectories,

    #[error("reload.rebuild_on_stale is only allowed in development mode")]
    RebuildInProduction,
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &SiteConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.paths.source_dir.as_os_str().is_empty() {
        errors.push(ValidationError::Empty { field: "paths.source_dir" });
    }
    if config.paths.build_dir.as_os_str().is_empty() {
        errors.push(ValidationError::Empty { field: "paths.build_dir" });
    }
    if config.paths.source_dir == config.paths.build_dir {
        errors.push(ValidationError::SameDirectories);
    }

    let compiler = &config.compiler;
    if compiler.program.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "compiler.program" });
    }
    if compiler.timeout_secs == 0 {
        errors.push(ValidationError::Zero { field: "compiler.timeout_secs" });
    }
    if compiler.index_name.is_empty()
        || compiler.index_name.contains('/')
        || compiler.index_name.starts_with('.')
    {
        errors.push(ValidationError::BadIndexName(compiler.index_name.clone()));
    }
    if compiler.source_extension.is_empty()
        || compiler.source_extension.contains('.')
        || compiler.source_extension.contains('/')
    {
        errors.push(ValidationError::BadExtension(compiler.source_extension.clone()));
    }

    let dispatch = &config.dispatch;
    for (field, value) in [
        ("dispatch.timeout_ms", dispatch.timeout_ms as usize),
        ("dispatch.max_output_bytes", dispatch.max_output_bytes),
        ("dispatch.max_stderr_bytes", dispatch.max_stderr_bytes),
        ("dispatch.max_body_bytes", dispatch.max_body_bytes),
        ("dispatch.max_concurrent", dispatch.max_concurrent),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if config.reload.rebuild_on_stale && config.reload.mode != RunMode::Development {
        errors.push(ValidationError::RebuildInProduction);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BadAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&SiteConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = SiteConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.dispatch.timeout_ms = 0;
        config.dispatch.max_concurrent = 0;
        config.compiler.index_name = "a/b".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::Zero { field: "dispatch.timeout_ms" }));
        assert!(errors.contains(&ValidationError::BadIndexName("a/b".into())));
    }

    #[test]
    fn rebuild_on_stale_requires_development() {
        let mut config = SiteConfig::default();
        config.reload.rebuild_on_stale = true;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::RebuildInProduction])
        );

        config.reload.mode = RunMode::Development;
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn source_and_build_dirs_must_differ() {
        let mut config = SiteConfig::default();
        config.paths.build_dir = PathBuf::from("routes");
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::SameDirectories])
        );
    }
}
