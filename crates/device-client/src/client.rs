//! `reqwest` implementation of [`DeviceConnection`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use otapush_protocol::constants::CONTENT_TYPE_OCTET_STREAM;
use otapush_protocol::envelope::{DeviceRequest, DeviceResponse, Method, RequestBody};
use otapush_updater::{DeviceConnection, TransportError};
use reqwest::header::CONTENT_TYPE;
use tracing::trace;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors building a device client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid device URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A device reachable at a base URL such as `http://192.168.4.1`.
#[derive(Debug, Clone)]
pub struct HttpDevice {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDevice {
    /// Creates a client for `base_url`. A missing scheme defaults to `http://`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = normalize_base_url(base_url)?;
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl DeviceConnection for HttpDevice {
    fn send(
        &self,
        request: DeviceRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeviceResponse, TransportError>> + Send + '_>> {
        Box::pin(async move {
            let url = self.url(&request.path);
            let mut builder = match request.method {
                Method::Get => self.http.get(&url),
                Method::Post => self.http.post(&url),
            };
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            builder = match request.body {
                RequestBody::Empty => builder,
                RequestBody::Form(pairs) => builder.form(&pairs),
                RequestBody::Binary(data) => builder
                    .header(CONTENT_TYPE, CONTENT_TYPE_OCTET_STREAM)
                    .body(data),
            };
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }

            let resp = builder.send().await.map_err(transport_error)?;
            let status = resp.status().as_u16();
            let body = resp.bytes().await.map_err(transport_error)?;
            trace!(%url, status, bytes = body.len(), "device replied");

            Ok(DeviceResponse::new(status, body.to_vec()))
        })
    }

    fn device_id(&self) -> &str {
        &self.base_url
    }
}

/// Classifies a `reqwest` failure. Timeouts win over connect errors so a
/// slow connect reads as a timeout.
pub(crate) fn transport_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Io(e.to_string())
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ClientError> {
    let invalid = || ClientError::InvalidUrl(raw.to_string());

    let input = raw.trim();
    let (scheme, rest) = input.split_once("://").unwrap_or(("http", input));
    let rest = rest.trim_end_matches('/');
    if rest.is_empty() || rest.starts_with('/') {
        return Err(invalid());
    }

    let with_scheme = format!("{scheme}://{rest}");
    let parsed =
        reqwest::Url::parse(&with_scheme).map_err(|e| ClientError::InvalidUrl(format!("{raw}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https")
        || parsed.host_str().is_none_or(|h| h.is_empty())
    {
        return Err(invalid());
    }
    Ok(format!("{}://{rest}", parsed.scheme()))
}
