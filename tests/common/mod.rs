//! Shared fixtures for integration tests.
//!
//! Route "sources" are shell scripts; the configured toolchain copies them
//! into place, refusing any source that contains `BROKEN`.

#![allow(dead_code)]

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use proc_router::build::{BuildOptions, BuildOrchestrator, BuildSummary, SourceTree};
use proc_router::compiler::CommandCompiler;
use proc_router::config::{CompilerConfig, SiteConfig};
use proc_router::dispatch::{wire, ResponseEnvelope};
use proc_router::registry::{ArtifactLayout, Registry};
use proc_router::{HttpServer, Shutdown};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Copies `$1` to `$2`, failing like a compiler on a `BROKEN` source.
const TOOLCHAIN: &str = r#"if grep -q BROKEN "$1"; then echo "error: cannot compile $1" >&2; exit 1; fi; cp "$1" "$2""#;

/// A throwaway site: a source tree, a build dir and a config pointing at both.
pub struct Site {
    dir: TempDir,
    pub config: SiteConfig,
}

impl Site {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = SiteConfig::default();
        config.paths.source_dir = dir.path().join("routes");
        config.paths.build_dir = dir.path().join("build");
        config.compiler = CompilerConfig {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                TOOLCHAIN.into(),
                "toolchain".into(),
                "{source}".into(),
                "{output}".into(),
            ],
            debug_args: vec![],
            release_args: vec![],
            timeout_secs: 10,
            ..CompilerConfig::default()
        };
        config.reload.watch_registry = false;
        fs::create_dir_all(&config.paths.source_dir).unwrap();
        Self { dir, config }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn source_dir(&self) -> &Path {
        &self.config.paths.source_dir
    }

    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(&self.config.paths.build_dir)
    }

    /// Write route source `<key>.rs`. The script has already consumed stdin when `body` runs.
    pub fn route(&self, key: &str, body: &str) -> PathBuf {
        let path = self.source_dir().join(format!("{key}.{}", self.config.compiler.source_extension));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("#!/bin/sh\ncat > /dev/null\n{body}\n")).unwrap();
        path
    }

    /// Write a route that does not read its input at all.
    pub fn raw_route(&self, key: &str, script: &str) -> PathBuf {
        let path = self.source_dir().join(format!("{key}.{}", self.config.compiler.source_extension));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        path
    }

    pub fn orchestrator(&self) -> BuildOrchestrator<CommandCompiler> {
        let layout = self.layout();
        BuildOrchestrator::new(
            CommandCompiler::new(self.config.compiler.clone(), layout.clone()),
            SourceTree::new(self.source_dir(), &self.config.compiler),
            layout,
        )
    }

    pub fn build(&self) -> BuildSummary {
        self.orchestrator().build_all(&BuildOptions::default()).unwrap()
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::new(Registry::load(self.layout()).unwrap())
    }

    /// Start `serve` on an ephemeral port.
    pub async fn serve(&self) -> RunningServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let server = HttpServer::new(self.config.clone(), self.registry());
        let receiver = shutdown.subscribe();
        tokio::spawn(async move {
            server.run(listener, receiver).await.unwrap();
        });
        RunningServer { addr, shutdown }
    }
}

pub struct RunningServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Send a request line verbatim, bypassing client-side path cleanup.
    pub async fn raw_status(&self, target: &str) -> u16 {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        let request = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        let text = String::from_utf8_lossy(&response);
        text.split_whitespace().nth(1).unwrap().parse().unwrap()
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Shell line printing a response in plain JSON.
pub fn json_reply(status: u16, content_type: &str, body: &str) -> String {
    let response = serde_json::json!({
        "status": status,
        "headers": { "Content-Type": content_type },
        "body": body,
    });
    format!("echo '{}'", response)
}

/// Shell line printing a response in the canonical Base64 form.
pub fn base64_reply(response: &ResponseEnvelope) -> String {
    format!("echo '{}'", wire::encode_response(response).unwrap())
}

/// Poll `check` until it holds or `limit` passes.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}
