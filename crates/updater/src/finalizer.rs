//! Finalize handshake and the follow-up session probe.

use std::fmt;
use std::time::Duration;

use otapush_protocol::constants::Endpoint;
use otapush_protocol::envelope::DeviceRequest;
use otapush_protocol::messages::SessionStatusResponse;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::{DeviceConnection, send_or_cancel};
use crate::error::UpdateError;

/// Result of a single finalize request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The device validated the container and started applying it.
    Accepted(String),
    /// Validation failed; the session is gone and the upload must restart.
    Rejected(String),
    /// The request failed in transit. The device may or may not have
    /// applied the image; finalize must not be blindly repeated.
    Indeterminate(String),
}

impl FinalizeOutcome {
    /// Maps the outcome onto the update result, keeping the diagnostic.
    pub fn into_result(self) -> Result<String, UpdateError> {
        match self {
            FinalizeOutcome::Accepted(msg) => Ok(msg),
            FinalizeOutcome::Rejected(msg) => Err(UpdateError::FinalizeRejected(msg)),
            FinalizeOutcome::Indeterminate(msg) => Err(UpdateError::FinalizeIndeterminate(msg)),
        }
    }
}

/// What a status query shows after an indeterminate finalize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionProbe {
    /// The session still exists; finalize most likely never ran.
    Open { have: u64, total: u64 },
    /// The device answered without a session; it was retired (applied or
    /// rejected) or the device rebooted.
    Gone,
    /// The device did not answer; it may be restarting.
    Unreachable(String),
}

impl fmt::Display for SessionProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionProbe::Open { have, total } => {
                write!(f, "session still open ({have}/{total} bytes)")
            }
            SessionProbe::Gone => f.write_str("session no longer present"),
            SessionProbe::Unreachable(reason) => write!(f, "device unreachable: {reason}"),
        }
    }
}

/// Issues the finalize request for a fully transferred session.
pub struct Finalizer<'a> {
    conn: &'a dyn DeviceConnection,
    timeout: Duration,
}

impl<'a> Finalizer<'a> {
    pub fn new(conn: &'a dyn DeviceConnection, timeout: Duration) -> Self {
        Self { conn, timeout }
    }

    /// Sends exactly one finalize request.
    ///
    /// 2xx is `Accepted`, any other status is `Rejected` with the device's
    /// text, and a transport failure (timeout included) is `Indeterminate`.
    pub async fn finalize(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<FinalizeOutcome, UpdateError> {
        let req = DeviceRequest::post(Endpoint::SessionFinalize)
            .query("id", session_id)
            .timeout(self.timeout);

        let outcome = match send_or_cancel(self.conn, req, cancel).await? {
            Ok(resp) if resp.is_success() => FinalizeOutcome::Accepted(resp.text()),
            Ok(resp) => {
                let text = resp.text();
                FinalizeOutcome::Rejected(if text.is_empty() {
                    format!("HTTP {}", resp.status)
                } else {
                    text
                })
            }
            Err(e) => FinalizeOutcome::Indeterminate(e.to_string()),
        };

        match &outcome {
            FinalizeOutcome::Indeterminate(reason) => {
                warn!(session = %session_id, error = %reason, "finalize outcome unknown")
            }
            other => debug!(session = %session_id, outcome = ?other, "finalize answered"),
        }
        Ok(outcome)
    }

    /// Looks at the device's session state once, without side effects.
    ///
    /// `total` is the size of the session being finalized; it is used when
    /// the status reply only carries `have`. A 404 means the session is
    /// gone, any other non-2xx answer says nothing about it.
    pub async fn probe(
        &self,
        total: u64,
        cancel: &CancellationToken,
    ) -> Result<SessionProbe, UpdateError> {
        let req = DeviceRequest::get(Endpoint::SessionStatus).timeout(self.timeout);
        let resp = match send_or_cancel(self.conn, req, cancel).await? {
            Ok(resp) => resp,
            Err(e) => return Ok(SessionProbe::Unreachable(e.to_string())),
        };

        if resp.status == 404 {
            return Ok(SessionProbe::Gone);
        }
        if !resp.is_success() {
            return Ok(SessionProbe::Unreachable(format!(
                "HTTP {}: {}",
                resp.status,
                resp.text()
            )));
        }

        let status: SessionStatusResponse = resp.json().unwrap_or_default();
        Ok(match status.have {
            Some(have) => SessionProbe::Open {
                have,
                total: status.total.unwrap_or(total),
            },
            None => SessionProbe::Gone,
        })
    }
}
