//! Device status and the connection indicator derived from it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use otapush_protocol::constants::Endpoint;
use otapush_protocol::envelope::DeviceRequest;
use otapush_protocol::messages::DeviceStatus;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::{DeviceConnection, request_json};
use crate::error::DeviceError;

/// Reads `/api/status`.
pub async fn fetch_status(
    conn: &dyn DeviceConnection,
    timeout: Duration,
) -> Result<DeviceStatus, DeviceError> {
    let req = DeviceRequest::get(Endpoint::Status).timeout(timeout);
    request_json(conn, req).await
}

/// Coarse network state shown next to the device name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionIndicator {
    /// Joined a network and holds an address.
    Online,
    /// Serving its own access point.
    AccessPoint,
    Offline,
}

impl ConnectionIndicator {
    /// Derives the indicator; `None` (a failed fetch) is `Offline`.
    pub fn from_status(status: Option<&DeviceStatus>) -> Self {
        let Some(status) = status else {
            return ConnectionIndicator::Offline;
        };
        let ip = status.wifi.ip.trim();
        if !ip.is_empty() && ip != "0.0.0.0" {
            ConnectionIndicator::Online
        } else if status.wifi.mode.to_ascii_lowercase().contains("ap") {
            ConnectionIndicator::AccessPoint
        } else {
            ConnectionIndicator::Offline
        }
    }
}

impl fmt::Display for ConnectionIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionIndicator::Online => "online",
            ConnectionIndicator::AccessPoint => "ap",
            ConnectionIndicator::Offline => "offline",
        })
    }
}

/// Owned handle to a background status poll.
///
/// Publishes indicator changes over a `watch` channel that starts at
/// `Offline`. Polling ends on [`stop`](Self::stop), on drop, or once every
/// receiver is gone.
pub struct StatusPoller {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl StatusPoller {
    /// Starts polling every `interval`, each request bounded by `timeout`.
    pub fn spawn(
        conn: Arc<dyn DeviceConnection>,
        interval: Duration,
        timeout: Duration,
    ) -> (Self, watch::Receiver<ConnectionIndicator>) {
        let (tx, rx) = watch::channel(ConnectionIndicator::Offline);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_status(conn, interval, timeout, tx, cancel.clone()));
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

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_status(
    conn: Arc<dyn DeviceConnection>,
    interval: Duration,
    timeout: Duration,
    tx: watch::Sender<ConnectionIndicator>,
    cancel: CancellationToken,
) {
    loop {
        let status = tokio::select! {
            _ = cancel.cancelled() => return,
            result = fetch_status(conn.as_ref(), timeout) => result,
        };

        let status = match status {
            Ok(s) => Some(s),
            Err(e) => {
                debug!(error = %e, "status poll failed");
                None
            }
        };
        let indicator = ConnectionIndicator::from_status(status.as_ref());

        tx.send_if_modified(|current| {
            if *current == indicator {
                return false;
            }
            debug!(from = %current, to = %indicator, "connection indicator changed");
            *current = indicator;
            true
        });

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tx.closed() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
