//! Build results.

use std::path::PathBuf;
use std::time::Duration;

use crate::registry::ArtifactRecord;

/// One unit that did not produce a dispatchable artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    pub route: String,
    pub key: String,
    pub source: PathBuf,
    /// One-line reason.
    pub reason: String,
    /// Captured toolchain output, possibly empty.
    pub diagnostics: String,
}

impl std::fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.route, self.source.display(), self.reason)
    }
}

/// Aggregate outcome of a build run.
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub built: Vec<ArtifactRecord>,
    pub failures: Vec<BuildFailure>,
    pub elapsed: Duration,
}

impl BuildSummary {
    pub(crate) fn record_success(&mut self, record: ArtifactRecord) {
        self.total += 1;
        self.succeeded += 1;
        self.built.push(record);
    }

    pub(crate) fn record_failure(&mut self, failure: BuildFailure) {
        self.total += 1;
        self.failed += 1;
        self.failures.push(failure);
    }

    /// True iff no unit failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Process exit code for the CLI: non-zero iff any unit failed.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

impl std::fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} units: {} succeeded, {} failed in {:.2}s",
            self.total,
            self.succeeded,
            self.failed,
            self.elapsed.as_secs_f64()
        )
    }
}
