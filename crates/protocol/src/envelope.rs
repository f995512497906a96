use std::time::Duration;

use serde::Deserialize;

use crate::constants::Endpoint;

/// HTTP method of a device request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Body of a device request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// `application/x-www-form-urlencoded` key/value pairs.
    Form(Vec<(String, String)>),
    /// Raw `application/octet-stream` bytes.
    Binary(Vec<u8>),
}

/// A single HTTP request to the device.
///
/// Transport implementations turn this into one round-trip and nothing
/// more: no retries, no redirects handled on the caller's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    /// Per-request timeout; `None` uses the transport default.
    pub timeout: Option<Duration>,
}

impl DeviceRequest {
    /// Creates a GET request for an endpoint.
    pub fn get(endpoint: Endpoint) -> Self {
        Self::new(Method::Get, endpoint)
    }

    /// Creates a POST request with an empty body.
    pub fn post(endpoint: Endpoint) -> Self {
        Self::new(Method::Post, endpoint)
    }

    fn new(method: Method, endpoint: Endpoint) -> Self {
        Self {
            method,
            path: endpoint.path().to_string(),
            query: Vec::new(),
            body: RequestBody::Empty,
            timeout: None,
        }
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Sets a form-encoded body.
    pub fn form(mut self, pairs: &[(&str, String)]) -> Self {
        self.body = RequestBody::Form(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        );
        self
    }

    /// Sets a raw binary body.
    pub fn binary(mut self, data: Vec<u8>) -> Self {
        self.body = RequestBody::Binary(data);
        self
    }

    /// Overrides the transport's default timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the value of a query parameter, if present.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The device's answer to a [`DeviceRequest`].
///
/// Any HTTP status is a valid response; only failures to complete the
/// round-trip are transport errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl DeviceResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// True for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8 (lossy) with surrounding whitespace removed.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).trim().to_string()
    }

    /// Deserializes the body as JSON.
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}
