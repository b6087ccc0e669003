//! Envelope wire format.
//!
//! Input to a route process is one JSON document followed by a newline.
//!
//! Output is read from the last non-empty line of standard output. The
//! canonical form is standard padded Base64 of the JSON response. A line
//! starting with `{` cannot be Base64, so it is parsed as plain JSON.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::dispatch::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::dispatch::error::ProtocolViolation;

/// Serialize a request for a route's standard input.
pub fn encode_request(request: &RequestEnvelope) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(request)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Canonical response line (without newline).
pub fn encode_response(response: &ResponseEnvelope) -> Result<String, serde_json::Error> {
    Ok(STANDARD.encode(serde_json::to_vec(response)?))
}

/// A decoded response and any output that preceded its line.
#[derive(Debug)]
pub struct DecodedOutput {
    pub response: ResponseEnvelope,
    pub stray_lines: usize,
}

/// Parse a route's captured standard output.
pub fn decode_response(stdout: &[u8]) -> Result<DecodedOutput, ProtocolViolation> {
    let text = std::str::from_utf8(stdout).map_err(|_| ProtocolViolation::NotUtf8)?;
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let line = lines.next_back().ok_or(ProtocolViolation::EmptyOutput)?;
    let stray_lines = lines.count();

    let response: ResponseEnvelope = if line.starts_with('{') {
        serde_json::from_str(line).map_err(|e| ProtocolViolation::Json(e.to_string()))?
    } else {
        let json = STANDARD
            .decode(line)
            .map_err(|e| ProtocolViolation::Base64(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| ProtocolViolation::Json(e.to_string()))?
    };

    // Informational statuses would be taken by the client as an interim reply.
    if !(200..=999).contains(&response.status) {
        return Err(ProtocolViolation::Status(response.status));
    }

    Ok(DecodedOutput {
        response,
        stray_lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn ok_response() -> ResponseEnvelope {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "text/html".to_string());
        ResponseEnvelope {
            status: 200,
            headers,
            body: "<h1>ok</h1>".into(),
        }
    }

    #[test]
    fn base64_line_is_canonical() {
        let line = encode_response(&ok_response()).unwrap();
        let decoded = decode_response(format!("{line}\n").as_bytes()).unwrap();
        assert_eq!(decoded.response, ok_response());
        assert_eq!(decoded.stray_lines, 0);
    }

    #[test]
    fn plain_json_is_sniffed() {
        let line = serde_json::to_string(&ok_response()).unwrap();
        let decoded = decode_response(line.as_bytes()).unwrap();
        assert_eq!(decoded.response, ok_response());
    }

    #[test]
    fn last_line_carries_the_response() {
        let line = encode_response(&ok_response()).unwrap();
        let output = format!("debug: starting\n\n{line}\n\n");
        let decoded = decode_response(output.as_bytes()).unwrap();
        assert_eq!(decoded.response.status, 200);
        assert_eq!(decoded.stray_lines, 1);
    }

    #[test]
    fn protocol_violations_are_classified() {
        assert_eq!(decode_response(b"").unwrap_err(), ProtocolViolation::EmptyOutput);
        assert_eq!(decode_response(b"\n  \n").unwrap_err(), ProtocolViolation::EmptyOutput);
        assert!(matches!(decode_response(b"not base64!"), Err(ProtocolViolation::Base64(_))));
        assert!(matches!(decode_response(b"{\"status\":"), Err(ProtocolViolation::Json(_))));
        assert!(matches!(decode_response(&[0xff, 0xfe]), Err(ProtocolViolation::NotUtf8)));

        let bad_status = STANDARD.encode(br#"{"status":42,"headers":{},"body":""}"#);
        assert_eq!(
            decode_response(bad_status.as_bytes()).unwrap_err(),
            ProtocolViolation::Status(42)
        );
        assert_eq!(
            decode_response(br#"{"status":101,"headers":{"Upgrade":"websocket"},"body":""}"#).unwrap_err(),
            ProtocolViolation::Status(101)
        );
        assert_eq!(decode_response(br#"{"status":200}"#).unwrap().response.status, 200);
    }

    #[test]
    fn request_is_one_json_line() {
        let bytes = encode_request(&RequestEnvelope::new("GET", "/")).unwrap();
        assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 1);
        assert_eq!(*bytes.last().unwrap(), b'\n');
    }
}
