//! Device connection trait and cancellation-aware helpers.
//!
//! `DeviceConnection` is implemented by the HTTP client crate (and by test
//! doubles). Keeping it a trait leaves the update flow free of any HTTP
//! stack and testable with scripted devices.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use otapush_protocol::envelope::{DeviceRequest, DeviceResponse};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::{DeviceError, TransportError, UpdateError};

/// Abstract connection to a device.
pub trait DeviceConnection: Send + Sync {
    /// Performs one request/response round-trip.
    fn send(
        &self,
        request: DeviceRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeviceResponse, TransportError>> + Send + '_>>;

    /// Human-readable device identifier (usually its base URL).
    fn device_id(&self) -> &str;
}

/// Sends a request unless `cancel` fires first.
///
/// The outer `Result` is the cancellation; the inner one is the transport
/// outcome, left to the caller to interpret.
pub(crate) async fn send_or_cancel(
    conn: &dyn DeviceConnection,
    request: DeviceRequest,
    cancel: &CancellationToken,
) -> Result<Result<DeviceResponse, TransportError>, UpdateError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(UpdateError::Cancelled),
        result = conn.send(request) => Ok(result),
    }
}

/// Sleeps for `delay` unless `cancel` fires first.
pub(crate) async fn sleep_or_cancel(
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<(), UpdateError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(UpdateError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Sends a request and returns the body text of a 2xx reply.
pub(crate) async fn request_text(
    conn: &dyn DeviceConnection,
    request: DeviceRequest,
) -> Result<String, DeviceError> {
    let resp = conn.send(request).await?;
    if !resp.is_success() {
        return Err(DeviceError::Http {
            status: resp.status,
            body: resp.text(),
        });
    }
    Ok(resp.text())
}

/// Sends a request and decodes the JSON body of a 2xx reply.
pub(crate) async fn request_json<T: DeserializeOwned>(
    conn: &dyn DeviceConnection,
    request: DeviceRequest,
) -> Result<T, DeviceError> {
    let resp = conn.send(request).await?;
    if !resp.is_success() {
        return Err(DeviceError::Http {
            status: resp.status,
            body: resp.text(),
        });
    }
    Ok(resp.json()?)
}

pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<(), UpdateError> {
    if cancel.is_cancelled() {
        Err(UpdateError::Cancelled)
    } else {
        Ok(())
    }
}
