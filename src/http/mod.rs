//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, body limit, tracing)
//!     → [dev only] build::Rebuilder refreshes a stale route
//!     → routing::Resolver (path → ArtifactRecord)
//!     → request.rs (axum request → RequestEnvelope)
//!     → dispatch::Dispatcher (one process, one request)
//!     → response.rs (ResponseEnvelope or error → axum response)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{request_id, to_envelope, EnvelopeError, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
