//! Request and response envelopes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What a route process receives on standard input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query_parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl RequestEnvelope {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: BTreeMap::new(),
            query_parameters: BTreeMap::new(),
            body: None,
        }
    }

    /// Parse a raw query string; a repeated key keeps its last value.
    pub fn with_query(mut self, query: &str) -> Self {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            self.query_parameters.insert(key.into_owned(), value.into_owned());
        }
        self
    }
}

/// What a route process answers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_wire_field_names() {
        let envelope = RequestEnvelope::new("GET", "/about");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "method": "GET",
                "path": "/about",
                "headers": {},
                "queryParameters": {},
                "body": null
            })
        );
    }

    #[test]
    fn envelopes_survive_a_round_trip() {
        let mut request = RequestEnvelope::new("POST", "/products/list").with_query("page=2&sort=name");
        request.headers.insert("content-type".into(), "application/json".into());
        request.body = Some("{\"q\":\"ü\"}".into());
        let text = serde_json::to_string(&request).unwrap();
        assert_eq!(serde_json::from_str::<RequestEnvelope>(&text).unwrap(), request);

        let mut response = ResponseEnvelope {
            status: 201,
            headers: BTreeMap::new(),
            body: "<h1>ok</h1>\n".into(),
        };
        response.headers.insert("Content-Type".into(), "text/html".into());
        let text = serde_json::to_string(&response).unwrap();
        assert_eq!(serde_json::from_str::<ResponseEnvelope>(&text).unwrap(), response);
    }

    #[test]
    fn query_decoding_and_repeats() {
        let request = RequestEnvelope::new("GET", "/").with_query("q=a+b%21&tag=x&tag=y&flag");
        assert_eq!(request.query_parameters["q"], "a b!");
        assert_eq!(request.query_parameters["tag"], "y");
        assert_eq!(request.query_parameters["flag"], "");
    }

    #[test]
    fn response_fields_default() {
        let response: ResponseEnvelope = serde_json::from_str(r#"{"status":204}"#).unwrap();
        assert!(response.headers.is_empty());
        assert!(response.body.is_empty());
    }
}
