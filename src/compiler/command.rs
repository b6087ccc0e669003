//! Command-line toolchain adapter.
//!
//! The toolchain runs under tokio on a private current-thread runtime, so
//! `compile` keeps its blocking signature and stays callable from the
//! blocking pool, plain threads, and tests alike.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::{sleep_until, Instant};

use crate::build::source::RouteSourceUnit;
use crate::compiler::{CompileError, Compiler};
use crate::config::{BuildMode, CompilerConfig};
use crate::registry::{now_millis, ArtifactLayout, ArtifactRecord};

/// Output still arriving after the toolchain exits is read for this long.
const OUTPUT_GRACE: Duration = Duration::from_millis(200);

/// Runs a configured external toolchain once per unit.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    config: CompilerConfig,
    layout: ArtifactLayout,
}

impl CommandCompiler {
    pub fn new(config: CompilerConfig, layout: ArtifactLayout) -> Self {
        Self { config, layout }
    }

    /// Toolchain arguments for one invocation.
    pub fn arguments(&self, source: &Path, output: &Path, mode: BuildMode) -> Vec<String> {
        let extra = match mode {
            BuildMode::Debug => &self.config.debug_args,
            BuildMode::Release => &self.config.release_args,
        };
        let source = source.to_string_lossy();
        let output = output.to_string_lossy();
        self.config
            .args
            .iter()
            .chain(extra.iter())
            .map(|arg| arg.replace("{source}", &source).replace("{output}", &output))
            .collect()
    }

    /// Run the toolchain to completion or the deadline.
    ///
    /// Both pipes feed one buffer in arrival order. Once the toolchain has
    /// exited, pipes still held open by something it left running are read
    /// for at most `OUTPUT_GRACE` and then abandoned.
    async fn run_toolchain(&self, args: &[String]) -> Result<(ExitStatus, String), CompileError> {
        let timeout = self.config.timeout();
        let deadline = Instant::now() + timeout;

        let mut child = Command::new(&self.config.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CompileError::Toolchain {
                program: self.config.program.clone(),
                source,
            })?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut out_buf = [0u8; 4096];
        let mut err_buf = [0u8; 4096];
        let mut output = Vec::new();
        let mut status = None;
        let mut cutoff = deadline;

        while status.is_none() || stdout.is_some() || stderr.is_some() {
            tokio::select! {
                exited = child.wait(), if status.is_none() => {
                    status = Some(exited.map_err(|e| CompileError::io(&self.config.program, e))?);
                    cutoff = cutoff.min(Instant::now() + OUTPUT_GRACE);
                }
                read = read_chunk(&mut stdout, &mut out_buf) => match read {
                    Ok(n) if n > 0 => output.extend_from_slice(&out_buf[..n]),
                    _ => stdout = None,
                },
                read = read_chunk(&mut stderr, &mut err_buf) => match read {
                    Ok(n) if n > 0 => output.extend_from_slice(&err_buf[..n]),
                    _ => stderr = None,
                },
                _ = sleep_until(cutoff) => break,
            }
        }

        let Some(status) = status else {
            // Already gone if it exited between the deadline and here.
            if let Err(e) = child.kill().await {
                tracing::debug!(program = %self.config.program, error = %e, "Kill after deadline failed");
            }
            return Err(CompileError::TimedOut(timeout));
        };
        if stdout.is_some() || stderr.is_some() {
            tracing::debug!(
                program = %self.config.program,
                "Toolchain exited with its output still held open; not waiting for it"
            );
        }

        Ok((status, String::from_utf8_lossy(&output).trim_end().to_string()))
    }
}

/// Next chunk from an open pipe; a closed pipe never yields.
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize> {
    match reader {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Drive `future` on a fresh current-thread runtime owned by a scoped thread.
fn block_on<F>(future: F) -> std::io::Result<F::Output>
where
    F: Future + Send,
    F::Output: Send,
{
    std::thread::scope(|scope| {
        scope
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
                Ok(runtime.block_on(future))
            })
            .join()
            .unwrap_or_else(|_| Err(std::io::Error::other("toolchain runner panicked")))
    })
}

fn make_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(perms.mode() | 0o755);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Removes the scratch output unless disarmed.
struct ScratchGuard(Option<PathBuf>);

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = fs::remove_file(path);
        }
    }
}

impl Compiler for CommandCompiler {
    fn compile(&self, unit: &RouteSourceUnit, mode: BuildMode) -> Result<ArtifactRecord, CompileError> {
        let tmp_dir = self.layout.tmp_dir();
        fs::create_dir_all(&tmp_dir).map_err(|e| CompileError::io(&tmp_dir, e))?;

        let scratch = self.layout.temp_output(&unit.key);
        let mut guard = ScratchGuard(Some(scratch.clone()));
        let args = self.arguments(&unit.path, &scratch, mode);

        tracing::debug!(
            route = %unit.route,
            program = %self.config.program,
            args = ?args,
            "Invoking toolchain"
        );

        let (status, diagnostics) =
            block_on(self.run_toolchain(&args)).map_err(|e| CompileError::io(&self.config.program, e))??;
        if !status.success() {
            return Err(CompileError::Failed {
                status: status.to_string(),
                diagnostics,
            });
        }
        if !diagnostics.is_empty() {
            tracing::debug!(route = %unit.route, output = %diagnostics, "Toolchain output");
        }
        if !scratch.is_file() {
            return Err(CompileError::MissingArtifact(scratch));
        }
        make_executable(&scratch).map_err(|e| CompileError::io(&scratch, e))?;

        let binary = self.layout.binary_path(&unit.key);
        if let Some(parent) = binary.parent() {
            fs::create_dir_all(parent).map_err(|e| CompileError::io(parent, e))?;
        }
        fs::rename(&scratch, &binary).map_err(|e| CompileError::io(&binary, e))?;
        guard.0 = None;

        Ok(ArtifactRecord {
            route: unit.route.clone(),
            key: unit.key.clone(),
            binary,
            source: unit.path.clone(),
            built_at_ms: now_millis(),
            mode,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Instant, SystemTime};
    use tempfile::TempDir;

    fn sh_compiler(script: &str, layout: ArtifactLayout) -> CommandCompiler {
        CommandCompiler::new(
            CompilerConfig {
                program: "sh".into(),
                args: vec![
                    "-c".into(),
                    script.into(),
                    "toolchain".into(),
                    "{source}".into(),
                    "{output}".into(),
                ],
                debug_args: vec![],
                release_args: vec!["--release".into()],
                timeout_secs: 5,
                ..CompilerConfig::default()
            },
            layout,
        )
    }

    fn unit(dir: &Path, key: &str, body: &str) -> RouteSourceUnit {
        let path = dir.join(format!("{key}.sh"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, body).unwrap();
        RouteSourceUnit {
            key: key.into(),
            route: format!("/{key}"),
            path,
            modified: SystemTime::now(),
        }
    }

    #[test]
    fn placeholders_and_mode_args() {
        let compiler = CommandCompiler::new(CompilerConfig::default(), ArtifactLayout::new("/b"));
        let args = compiler.arguments(Path::new("/s/a.rs"), Path::new("/b/tmp/a"), BuildMode::Release);
        assert_eq!(
            args,
            vec!["--edition=2021", "/s/a.rs", "-o", "/b/tmp/a", "-C", "opt-level=3"]
        );
        let args = compiler.arguments(Path::new("/s/a.rs"), Path::new("/b/tmp/a"), BuildMode::Debug);
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn success_promotes_binary() {
        let src = TempDir::new().unwrap();
        let build = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(build.path());
        let compiler = sh_compiler("cp \"$1\" \"$2\"", layout.clone());

        let unit = unit(src.path(), "products/list", "#!/bin/sh\necho hi\n");
        let record = compiler.compile(&unit, BuildMode::Debug).unwrap();

        assert_eq!(record.binary, layout.binary_path("products/list"));
        assert_eq!(record.route, "/products/list");
        assert!(record.is_dispatchable());
        assert_eq!(fs::read_dir(layout.tmp_dir()).unwrap().count(), 0);
    }

    #[test]
    fn failure_carries_diagnostics_and_leaves_nothing() {
        let src = TempDir::new().unwrap();
        let build = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(build.path());
        let compiler = sh_compiler(
            "echo partial > \"$2\"; echo 'error: expected item' >&2; exit 1",
            layout.clone(),
        );

        let unit = unit(src.path(), "broken", "fn main( {");
        let err = compiler.compile(&unit, BuildMode::Debug).unwrap_err();
        assert!(matches!(err, CompileError::Failed { .. }));
        assert!(err.diagnostics().contains("error: expected item"));
        assert!(!layout.binary_path("broken").exists());
        assert_eq!(fs::read_dir(layout.tmp_dir()).unwrap().count(), 0);
    }

    #[test]
    fn zero_exit_without_output_is_missing_artifact() {
        let src = TempDir::new().unwrap();
        let build = TempDir::new().unwrap();
        let compiler = sh_compiler("true", ArtifactLayout::new(build.path()));

        let unit = unit(src.path(), "about", "");
        assert!(matches!(
            compiler.compile(&unit, BuildMode::Debug),
            Err(CompileError::MissingArtifact(_))
        ));
    }

    #[test]
    fn missing_toolchain_is_reported() {
        let build = TempDir::new().unwrap();
        let compiler = CommandCompiler::new(
            CompilerConfig {
                program: "definitely-not-a-toolchain-xyz".into(),
                ..CompilerConfig::default()
            },
            ArtifactLayout::new(build.path()),
        );
        let src = TempDir::new().unwrap();
        let unit = unit(src.path(), "about", "");
        assert!(matches!(
            compiler.compile(&unit, BuildMode::Debug),
            Err(CompileError::Toolchain { .. })
        ));
    }

    #[test]
    fn hung_toolchain_times_out() {
        let src = TempDir::new().unwrap();
        let build = TempDir::new().unwrap();
        let mut compiler = sh_compiler("sleep 30", ArtifactLayout::new(build.path()));
        compiler.config.timeout_secs = 1;

        let unit = unit(src.path(), "slow", "");
        let started = Instant::now();
        assert!(matches!(
            compiler.compile(&unit, BuildMode::Debug),
            Err(CompileError::TimedOut(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn background_work_does_not_outlive_the_deadline() {
        let src = TempDir::new().unwrap();
        let build = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(build.path());
        // The backgrounded sleep inherits both pipes and keeps them open.
        let mut compiler = sh_compiler("cp \"$1\" \"$2\"; sleep 8 &", layout.clone());
        compiler.config.timeout_secs = 1;

        let unit = unit(src.path(), "cached", "#!/bin/sh\necho hi\n");
        let started = Instant::now();
        let record = compiler.compile(&unit, BuildMode::Debug).unwrap();
        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
        assert_eq!(record.binary, layout.binary_path("cached"));
    }

    #[test]
    fn hung_toolchain_holding_pipes_times_out() {
        let src = TempDir::new().unwrap();
        let build = TempDir::new().unwrap();
        let mut compiler = sh_compiler("sleep 30 & wait", ArtifactLayout::new(build.path()));
        compiler.config.timeout_secs = 1;

        let unit = unit(src.path(), "stuck", "");
        let started = Instant::now();
        assert!(matches!(
            compiler.compile(&unit, BuildMode::Debug),
            Err(CompileError::TimedOut(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
    }

    #[test]
    fn diagnostics_keep_arrival_order() {
        let src = TempDir::new().unwrap();
        let build = TempDir::new().unwrap();
        let compiler = sh_compiler(
            "echo one; sleep 0.2; echo two >&2; sleep 0.2; echo three; exit 1",
            ArtifactLayout::new(build.path()),
        );

        let unit = unit(src.path(), "noisy", "");
        let err = compiler.compile(&unit, BuildMode::Debug).unwrap_err();
        assert_eq!(err.diagnostics(), "one\ntwo\nthree");
    }

    #[tokio::test]
    async fn compile_works_from_inside_a_runtime() {
        let src = TempDir::new().unwrap();
        let build = TempDir::new().unwrap();
        let compiler = sh_compiler("cp \"$1\" \"$2\"", ArtifactLayout::new(build.path()));

        let unit = unit(src.path(), "about", "#!/bin/sh\n");
        assert!(compiler.compile(&unit, BuildMode::Debug).is_ok());
    }
}
