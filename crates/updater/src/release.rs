//! Release update: the device downloads and flashes a published release
//! on its own. The client only starts it and watches its progress.

use std::sync::Arc;
use std::time::Duration;

use otapush_protocol::constants::Endpoint;
use otapush_protocol::envelope::DeviceRequest;
use otapush_protocol::messages::{ReleaseCheckResponse, ReleaseProgress};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connection::{DeviceConnection, request_json, request_text};
use crate::error::DeviceError;

/// Latest release known to the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub tag: String,
    pub size: u64,
}

/// Asks the device which release it would install.
pub async fn check_release(
    conn: &dyn DeviceConnection,
    timeout: Duration,
) -> Result<ReleaseInfo, DeviceError> {
    let req = DeviceRequest::get(Endpoint::ReleaseCheck).timeout(timeout);
    let reply: ReleaseCheckResponse = request_json(conn, req).await?;
    if !reply.ok {
        return Err(DeviceError::Rejected(
            reply.msg.unwrap_or_else(|| "release check failed".into()),
        ));
    }
    Ok(ReleaseInfo {
        tag: reply.tag.unwrap_or_default(),
        size: reply.size,
    })
}

/// Tells the device to download and apply the release. Returns its reply text.
pub async fn start_release_update(
    conn: &dyn DeviceConnection,
    timeout: Duration,
) -> Result<String, DeviceError> {
    let req = DeviceRequest::post(Endpoint::ReleaseUpdate).timeout(timeout);
    let text = request_text(conn, req).await?;
    info!(device = %conn.device_id(), reply = %text, "release update started");
    Ok(text)
}

/// Reads one progress snapshot of a running release update.
pub async fn fetch_release_progress(
    conn: &dyn DeviceConnection,
    timeout: Duration,
) -> Result<ReleaseProgress, DeviceError> {
    let req = DeviceRequest::get(Endpoint::ReleaseProgress).timeout(timeout);
    request_json(conn, req).await
}

/// Owned handle to a background progress poll.
///
/// The poll ends by itself once the device reports a terminal phase. It
/// also ends on [`stop`](Self::stop) and when the handle is dropped.
pub struct ReleasePoller {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ReleasePoller {
    /// Starts polling every `interval`, each request bounded by `timeout`.
    /// Snapshots arrive on the returned receiver, which closes when polling
    /// ends.
    pub fn spawn(
        conn: Arc<dyn DeviceConnection>,
        interval: Duration,
        timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<ReleaseProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_release(conn, interval, timeout, tx, cancel.clone()));
        (
            Self {
                cancel,
                handle: Some(handle),
            },
            rx,
        )
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Waits for the poll task to end.
    pub async fn wait(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ReleasePoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_release(
    conn: Arc<dyn DeviceConnection>,
    interval: Duration,
    timeout: Duration,
    tx: mpsc::UnboundedSender<ReleaseProgress>,
    cancel: CancellationToken,
) {
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = fetch_release_progress(conn.as_ref(), timeout) => result,
        };

        match result {
            Ok(progress) => {
                let terminal = progress.is_terminal();
                if terminal {
                    info!(phase = %progress.phase, msg = %progress.msg, "release update finished");
                }
                if tx.send(progress).is_err() || terminal {
                    return;
                }
            }
            // The device drops off the network while it reboots.
            Err(e) => debug!(error = %e, "release progress poll failed"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
