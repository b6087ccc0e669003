//! URL path handling.
//!
//! # Responsibilities
//! - Normalize request paths into registry lookup keys
//! - Reject traversal segments before any lookup happens
//! - Derive a route's logical path from its position in the source tree
//! - Refuse route names a client could only send percent-encoded
//!
//! # Design Decisions
//! - Pure string functions, no filesystem access
//! - Percent-encoded dots and separators are rejected rather than decoded
//! - A single trailing slash is ignored; empty interior segments are not

use thiserror::Error;

/// Why a request path was refused before lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path must start with '/'")]
    NotAbsolute,

    #[error("empty path segment")]
    EmptySegment,

    #[error("forbidden path segment '{0}'")]
    Forbidden(String),
}

const ENCODED_FORBIDDEN: [&str; 3] = ["%2e", "%2f", "%5c"];

/// Normalize a request path into the logical form stored in the registry.
///
/// `/` stays `/`; `/about/` becomes `/about`.
pub fn normalize(url_path: &str) -> Result<String, PathError> {
    let rest = url_path.strip_prefix('/').ok_or(PathError::NotAbsolute)?;
    if rest.is_empty() {
        return Ok("/".to_string());
    }
    let rest = rest.strip_suffix('/').unwrap_or(rest);

    let mut normalized = String::with_capacity(url_path.len());
    for segment in rest.split('/') {
        check_segment(segment)?;
        normalized.push('/');
        normalized.push_str(segment);
    }
    Ok(normalized)
}

fn check_segment(segment: &str) -> Result<(), PathError> {
    if segment.is_empty() {
        return Err(PathError::EmptySegment);
    }
    if segment == "." || segment == ".." || segment.contains('\\') || segment.contains('\0') {
        return Err(PathError::Forbidden(segment.to_string()));
    }
    let lowered = segment.to_ascii_lowercase();
    if ENCODED_FORBIDDEN.iter().any(|encoded| lowered.contains(encoded)) {
        return Err(PathError::Forbidden(segment.to_string()));
    }
    Ok(())
}

/// Characters allowed unencoded in a path segment besides ASCII letters and digits.
const SEGMENT_PUNCTUATION: &str = "-._~!$&'()*+,;=:@";

/// Whether a logical route path can be requested without percent-encoding.
///
/// Request paths are matched as sent and never decoded, so a route named
/// with a space or similar could never be reached.
pub fn is_addressable(route: &str) -> bool {
    route
        .chars()
        .all(|c| c == '/' || c.is_ascii_alphanumeric() || SEGMENT_PUNCTUATION.contains(c))
}

/// Logical route path for a unit identified by its route key.
///
/// The key is the unit's source path relative to the source root, without
/// extension, `/`-separated. A last segment equal to `index_name` stands for
/// its directory.
pub fn logical_path(key: &str, index_name: &str) -> String {
    let mut segments: Vec<&str> = key.split('/').filter(|s| !s.is_empty()).collect();
    if segments.last() == Some(&index_name) {
        segments.pop();
    }
    format!("/{}", segments.join("/"))
}
