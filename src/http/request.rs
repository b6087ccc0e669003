//! Request handling and transformation.
//!
//! # Responsibilities
//! - Read the request ID set by the request-id layer
//! - Enforce the body limit while buffering
//! - Turn an axum request into the envelope a route process reads
//!
//! # Design Decisions
//! - Header names arrive lowercase; repeated headers are joined with ", "
//! - An empty body is sent as `null`, a non-UTF-8 body is refused (400)

use std::collections::BTreeMap;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::dispatch::RequestEnvelope;
use crate::http::response::error_response;

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Why a request could not be turned into an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("request body exceeds {0} bytes")]
    TooLarge(usize),

    #[error("request body is not UTF-8")]
    NotUtf8,
}

impl IntoResponse for EnvelopeError {
    fn into_response(self) -> Response {
        match self {
            EnvelopeError::TooLarge(_) => error_response(StatusCode::PAYLOAD_TOO_LARGE),
            EnvelopeError::NotUtf8 => error_response(StatusCode::BAD_REQUEST),
        }
    }
}

/// The request ID, if the layer (or client) provided a readable one.
pub fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Buffer the body and build the envelope.
pub async fn to_envelope(request: Request<Body>, max_body_bytes: usize) -> Result<RequestEnvelope, EnvelopeError> {
    let (parts, body) = request.into_parts();

    let mut envelope = RequestEnvelope::new(parts.method.as_str(), parts.uri.path());
    if let Some(query) = parts.uri.query() {
        envelope = envelope.with_query(query);
    }
    envelope.headers = flatten_headers(&parts.headers);

    // Streamed bodies are only measured here; declared lengths were already
    // refused by the body limit layer.
    let bytes = axum::body::to_bytes(body, max_body_bytes)
        .await
        .map_err(|_| EnvelopeError::TooLarge(max_body_bytes))?;
    if !bytes.is_empty() {
        let text = String::from_utf8(bytes.to_vec()).map_err(|_| EnvelopeError::NotUtf8)?;
        envelope.body = Some(text);
    }

    Ok(envelope)
}

fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    flat
}
