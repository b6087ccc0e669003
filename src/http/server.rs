//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with a single catch-all handler
//! - Wire up middleware (request ID, body limit, tracing)
//! - Resolve each request and hand it to the dispatcher
//! - Keep the registry current while serving (marker watcher)
//! - Stop on the shutdown broadcast

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::build::{BuildOrchestrator, Rebuilder, SourceTree};
use crate::compiler::CommandCompiler;
use crate::config::{BuildMode, RunMode, SiteConfig};
use crate::dispatch::Dispatcher;
use crate::http::request::{request_id, to_envelope};
use crate::http::response::{error_response, from_dispatch_error, from_envelope, from_resolve_error};
use crate::registry::{Registry, RegistryWatcher};
use crate::routing::{normalize, Resolver};

/// Quiet period after a marker event before the registry is rescanned.
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(150);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Resolver,
    pub dispatcher: Dispatcher,
    pub rebuilder: Option<Arc<Rebuilder<CommandCompiler>>>,
    pub max_body_bytes: usize,
}

/// HTTP front end for the route registry.
pub struct HttpServer {
    router: Router,
    config: SiteConfig,
    registry: Arc<Registry>,
}

impl HttpServer {
    /// Create a new HTTP server serving the routes in `registry`.
    pub fn new(config: SiteConfig, registry: Arc<Registry>) -> Self {
        let rebuilder = rebuilder(&config, &registry);
        let working_dir = Some(config.paths.source_dir.clone()).filter(|dir| dir.is_dir());
        let state = AppState {
            resolver: Resolver::new(Arc::clone(&registry)),
            dispatcher: Dispatcher::new(&config.dispatch, working_dir),
            rebuilder,
            max_body_bytes: config.dispatch.max_body_bytes,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            registry,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &SiteConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(RequestBodyLimitLayer::new(config.dispatch.max_body_bytes)),
            )
    }

    /// The fully layered router, for serving or for driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.registry.snapshot().len(),
            "HTTP server starting"
        );

        if self.config.reload.watch_registry {
            spawn_registry_reloader(Arc::clone(&self.registry), shutdown.resubscribe());
        }

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Only development mode with `rebuild_on_stale` compiles on the request path.
fn rebuilder(config: &SiteConfig, registry: &Arc<Registry>) -> Option<Arc<Rebuilder<CommandCompiler>>> {
    if config.reload.mode != RunMode::Development || !config.reload.rebuild_on_stale {
        return None;
    }
    let layout = registry.layout().clone();
    let orchestrator = BuildOrchestrator::new(
        CommandCompiler::new(config.compiler.clone(), layout.clone()),
        SourceTree::new(&config.paths.source_dir, &config.compiler),
        layout,
    );
    tracing::info!("Rebuild-on-stale enabled");
    Some(Arc::new(Rebuilder::new(
        Arc::new(orchestrator),
        Arc::clone(registry),
        BuildMode::Debug,
    )))
}

fn spawn_registry_reloader(registry: Arc<Registry>, mut shutdown: broadcast::Receiver<()>) {
    let (watcher, mut changes) = RegistryWatcher::new(&registry.layout().markers_dir());
    let handle = match watcher.run() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::warn!(error = %e, "Registry watcher unavailable; routes will not reload");
            return;
        }
    };

    tokio::spawn(async move {
        // The notify handle stops watching when dropped.
        let _handle = handle;
        loop {
            tokio::select! {
                change = changes.recv() => {
                    if change.is_none() {
                        break;
                    }
                    // A build writes many markers; reload once it settles.
                    tokio::time::sleep(RELOAD_DEBOUNCE).await;
                    while changes.try_recv().is_ok() {}
                    if let Err(e) = registry.reload() {
                        tracing::error!(error = %e, "Registry reload failed; keeping previous routes");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!("Registry reloader stopped");
    });
}

/// Resolve, dispatch, answer.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let request_id = request_id(request.headers());
    let path = request.uri().path().to_string();

    tracing::debug!(
        request_id = ?request_id,
        method = %request.method(),
        path = %path,
        "Dispatching request"
    );

    if let Some(rebuilder) = &state.rebuilder {
        if let Ok(route) = normalize(&path) {
            if let Err(failure) = rebuilder.refresh(&route).await {
                tracing::error!(
                    route = %failure.route,
                    reason = %failure.reason,
                    diagnostics = %failure.diagnostics,
                    "Rebuild before dispatch failed"
                );
                return error_response(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    let artifact = match state.resolver.resolve(&path) {
        Ok(artifact) => artifact,
        Err(e) => return from_resolve_error(&e, request_id.as_deref()),
    };

    let envelope = match to_envelope(request, state.max_body_bytes).await {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(request_id = ?request_id, error = %e, "Refusing request body");
            return e.into_response();
        }
    };

    match state
        .dispatcher
        .dispatch_with_id(&artifact, &envelope, state.dispatcher.timeout(), request_id.as_deref())
        .await
    {
        Ok(response) => from_envelope(response),
        Err(e) => from_dispatch_error(&e, request_id.as_deref()),
    }
}
