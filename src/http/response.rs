//! Response transformation.
//!
//! # Responsibilities
//! - Turn a route's ResponseEnvelope into an HTTP response
//! - Map resolution and dispatch errors to generic client responses
//!
//! # Design Decisions
//! - Clients only ever see the canonical reason phrase for an error
//! - Full diagnostics are logged where the error is classified
//! - Framing headers from a route are dropped; the server frames the body

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Response as HttpResponse, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::dispatch::{DispatchError, ResponseEnvelope};
use crate::routing::ResolveError;

/// A plain-text response whose body is the status' reason phrase.
pub fn error_response(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("Error");
    (status, reason).into_response()
}

/// Build the client response from a route's answer.
pub fn from_envelope(envelope: ResponseEnvelope) -> Response {
    let Ok(status) = StatusCode::from_u16(envelope.status) else {
        tracing::error!(status = envelope.status, "Route returned an unusable status");
        return error_response(StatusCode::BAD_GATEWAY);
    };

    let mut response = HttpResponse::new(Body::from(envelope.body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    for (name, value) in &envelope.headers {
        let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) else {
            tracing::warn!(header = %name, "Dropping invalid response header");
            continue;
        };
        if is_framing(&name) {
            continue;
        }
        headers.append(name, value);
    }
    response
}

fn is_framing(name: &HeaderName) -> bool {
    name == header::CONTENT_LENGTH || name == header::TRANSFER_ENCODING || name == header::CONNECTION
}

/// Client response for a path that did not resolve.
pub fn from_resolve_error(err: &ResolveError, request_id: Option<&str>) -> Response {
    let request_id = request_id.unwrap_or("-");
    match err {
        ResolveError::Rejected { path, reason } => {
            tracing::warn!(request_id = %request_id, path = %path, reason = %reason, "Rejected request path");
        }
        ResolveError::NotFound(route) => {
            tracing::debug!(request_id = %request_id, route = %route, "No route");
        }
        ResolveError::NotDispatchable { route, binary } => {
            tracing::error!(
                request_id = %request_id,
                route = %route,
                binary = %binary.display(),
                "Registered route has no runnable binary"
            );
        }
    }
    error_response(StatusCode::NOT_FOUND)
}

/// Client response for a failed dispatch. Diagnostics were logged by the dispatcher.
pub fn from_dispatch_error(err: &DispatchError, request_id: Option<&str>) -> Response {
    tracing::warn!(
        request_id = %request_id.unwrap_or("-"),
        outcome = err.outcome(),
        error = %err,
        stderr_bytes = err.stderr().len(),
        "Dispatch failed"
    );
    error_response(err.status_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn envelope_becomes_response() {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "text/html".to_string());
        headers.insert("Content-Length".to_string(), "999".to_string());
        let response = from_envelope(ResponseEnvelope {
            status: 201,
            headers,
            body: "<h1>ok</h1>".into(),
        });

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "text/html");
        assert!(response.headers().get("content-length").is_none());
        assert_eq!(body_text(response).await, "<h1>ok</h1>");
    }

    #[tokio::test]
    async fn errors_are_generic() {
        let response = from_resolve_error(&ResolveError::NotFound("/nope".into()), None);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, "Not Found");

        let err = DispatchError::Timeout {
            elapsed: Duration::from_secs(10),
            stderr: "secret internals".into(),
        };
        let response = from_dispatch_error(&err, Some("req-1"));
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_text(response).await, "Gateway Timeout");
    }
}
