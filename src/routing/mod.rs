//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → path.rs (normalize, reject traversal)
//!     → resolver.rs (registry snapshot lookup, executable check)
//!     → Return: ArtifactRecord or ResolveError
//!
//! Build time:
//!     source unit key (products/index)
//!     → path.rs logical_path (/products)
//! ```
//!
//! # Design Decisions
//! - Routes come from the registry, immutable per snapshot
//! - Exact match only; the index convention is applied when routes are named
//! - Deterministic: same input always matches same route

pub mod path;
pub mod resolver;

pub use path::{is_addressable, logical_path, normalize, PathError};
pub use resolver::{ResolveError, Resolver};
