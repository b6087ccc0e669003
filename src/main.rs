//! proc-router
//!
//! # Architecture Overview
//!
//! ```text
//!   build                                     serve
//!   ─────                                     ─────
//!   routes/**/*.rs                            Client Request
//!      │                                         │
//!      ▼                                         ▼
//!   build::SourceTree ──▶ compiler ──┐        http::server (request ID, limits)
//!                                    │           │
//!                                    ▼           ▼
//!                          .build/bin/<key>   routing::Resolver ◀── registry (ArcSwap)
//!                          .build/routes/<key>.route ──────────────────▲  (notify reload)
//!                                                │
//!                                                ▼
//!                                             dispatch::Dispatcher
//!                                                │ spawn, stdin ⇢ stdout
//!                                                ▼
//!                                             route process (one per request)
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use proc_router::build::{BuildOptions, BuildOrchestrator, BuildSummary, SourceTree};
use proc_router::compiler::CommandCompiler;
use proc_router::config::{load_config, validate_config, BuildMode, ConfigError, SiteConfig};
use proc_router::observability::{logging, metrics};
use proc_router::registry::{ArtifactLayout, Registry};
use proc_router::{HttpServer, Shutdown};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "proc-router.toml";

#[derive(Parser)]
#[command(name = "proc-router", version)]
#[command(about = "Serve a site where every route is its own compiled program", long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile route sources into executables
    Build {
        /// Build only this route (`/products/list`) or key (`products/list`)
        target: Option<String>,
        /// Compile with release settings
        #[arg(long)]
        release: bool,
        /// Remove existing artifacts first
        #[arg(long)]
        clean: bool,
        /// Show every built route and debug logs
        #[arg(short, long)]
        verbose: bool,
        /// Stop at the first failing unit
        #[arg(long)]
        fail_fast: bool,
    },
    /// Serve the built routes over HTTP
    Serve {
        /// Override `listener.bind_address`
        #[arg(long)]
        bind: Option<String>,
    },
    /// List the routes in the registry
    Routes,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match resolve_config(cli.config.as_deref()) {
        Ok(config) => anchor_paths(config)?,
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(ExitCode::from(2));
        }
    };

    match cli.command {
        Commands::Build {
            target,
            release,
            clean,
            verbose,
            fail_fast,
        } => {
            logging::init(&config.observability, verbose);
            let options = BuildOptions {
                target,
                mode: if release { BuildMode::Release } else { BuildMode::Debug },
                clean,
                fail_fast,
            };
            let summary = tokio::task::spawn_blocking(move || run_build(&config, &options)).await??;
            print_summary(&summary, verbose);
            Ok(ExitCode::from(summary.exit_code()))
        }
        Commands::Serve { bind } => {
            logging::init(&config.observability, false);
            serve(config, bind).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Routes => {
            let registry = Registry::load(ArtifactLayout::new(&config.paths.build_dir))?;
            print_routes(&registry);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Explicit file, else `proc-router.toml` if present, else defaults.
fn resolve_config(explicit: Option<&Path>) -> Result<SiteConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    let fallback = Path::new(DEFAULT_CONFIG_FILE);
    if fallback.is_file() {
        return load_config(fallback);
    }
    let config = SiteConfig::default();
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Route binaries are spawned from the source root, so every path must be absolute.
fn anchor_paths(mut config: SiteConfig) -> std::io::Result<SiteConfig> {
    let cwd = std::env::current_dir()?;
    for path in [&mut config.paths.source_dir, &mut config.paths.build_dir] {
        if path.is_relative() {
            *path = cwd.join(&*path);
        }
    }
    Ok(config)
}

fn run_build(config: &SiteConfig, options: &BuildOptions) -> Result<BuildSummary, proc_router::build::BuildError> {
    let layout = ArtifactLayout::new(&config.paths.build_dir);
    let orchestrator = BuildOrchestrator::new(
        CommandCompiler::new(config.compiler.clone(), layout.clone()),
        SourceTree::new(&config.paths.source_dir, &config.compiler),
        layout,
    );
    orchestrator.build_all(options)
}

fn print_summary(summary: &BuildSummary, verbose: bool) {
    if verbose {
        for record in &summary.built {
            println!("  built  {} -> {}", record.route, record.binary.display());
        }
    }
    for failure in &summary.failures {
        eprintln!("  FAILED {}", failure);
        let diagnostics = failure.diagnostics.trim_end();
        if !diagnostics.is_empty() {
            for line in diagnostics.lines() {
                eprintln!("         {}", line);
            }
        }
    }
    println!("{}", summary);
}

fn print_routes(registry: &Registry) {
    let table = registry.snapshot();
    if table.is_empty() {
        println!("no routes in {}", registry.layout().root().display());
        return;
    }
    println!("{:<32} {:<8} {:<6} BINARY", "ROUTE", "MODE", "READY");
    for record in table.iter() {
        println!(
            "{:<32} {:<8} {:<6} {}",
            record.route,
            record.mode.to_string(),
            if record.is_dispatchable() { "yes" } else { "no" },
            record.binary.display()
        );
    }
}

async fn serve(mut config: SiteConfig, bind: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(bind) = bind {
        config.listener.bind_address = bind;
    }
    tracing::info!("proc-router v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(Registry::load(ArtifactLayout::new(&config.paths.build_dir))?);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        source_dir = %config.paths.source_dir.display(),
        build_dir = %config.paths.build_dir.display(),
        timeout_ms = config.dispatch.timeout_ms,
        mode = ?config.reload.mode,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, registry);
    let receiver = shutdown.subscribe();
    shutdown.trigger_on_signal();
    server.run(listener, receiver).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
