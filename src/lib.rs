//! Process-per-route site engine.
//!
//! Route sources under a source tree are compiled into standalone
//! executables; the HTTP front end maps each request path to one of them,
//! runs it once with the request on standard input, and relays the response
//! it prints.

pub mod build;
pub mod compiler;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod routing;

pub use config::schema::SiteConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
