//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → resolve wait_for_termination
//!
//! Shutdown (shutdown.rs):
//!     trigger → HTTP server stops accepting, drains
//!             → registry reloader exits
//!             → dropped dispatch futures kill their children
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_termination;
