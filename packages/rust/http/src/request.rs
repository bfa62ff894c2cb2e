//! Request description and buffered response types.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use callsync_shared::{CallsyncError, Result};

/// An outbound request, reusable across retry attempts.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    bearer: Option<String>,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            bearer: None,
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Send `Authorization: Bearer <token>`.
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Attach a JSON body (sets `Content-Type: application/json`).
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn query_params(&self) -> &[(String, String)] {
        &self.query
    }

    pub(crate) fn bearer_token(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    pub(crate) fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }
}

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: String) -> Self {
        Self { status, body }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decode the body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| CallsyncError::parse(format!("invalid JSON body: {e}")))
    }

    /// Decode the body as untyped JSON; an empty body is `Null`.
    pub fn json_value(&self) -> Result<serde_json::Value> {
        if self.body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        self.json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_parts() {
        let request = ApiRequest::get("https://api.example.com/v1/meetings")
            .query("limit", 100)
            .query("organizer_email", "rep@vendor.com")
            .header("Content-Type", "application/json")
            .bearer("key");

        assert_eq!(*request.method(), Method::GET);
        assert_eq!(request.query_params().len(), 2);
        assert_eq!(request.query_params()[0], ("limit".into(), "100".into()));
        assert_eq!(request.bearer_token(), Some("key"));
        assert!(request.body().is_none());
    }

    #[test]
    fn empty_body_is_null() {
        let response = ApiResponse::new(StatusCode::NO_CONTENT, String::new());
        assert!(response.json_value().unwrap().is_null());
    }

    #[test]
    fn bad_json_is_parse_error() {
        let response = ApiResponse::new(StatusCode::OK, "<html>".into());
        let err = response.json_value().unwrap_err();
        assert!(matches!(err, CallsyncError::Parse { .. }));
    }
}
