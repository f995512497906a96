//! Session negotiation and status queries.

use std::time::Duration;

use otapush_protocol::constants::Endpoint;
use otapush_protocol::envelope::DeviceRequest;
use otapush_protocol::messages::{SessionStartResponse, SessionStatusResponse};
use otapush_transfer::Session;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::{DeviceConnection, send_or_cancel};
use crate::error::UpdateError;

/// Opens device-side upload sessions and reads their committed offset.
pub struct SessionNegotiator<'a> {
    conn: &'a dyn DeviceConnection,
    timeout: Duration,
}

impl<'a> SessionNegotiator<'a> {
    pub fn new(conn: &'a dyn DeviceConnection, timeout: Duration) -> Self {
        Self { conn, timeout }
    }

    /// Requests a session for an artifact of `total_size` bytes.
    ///
    /// The device may answer with `have > 0` when it still holds bytes
    /// from an earlier attempt with the same size. Every failure is
    /// `SessionStartFailed`; nothing is retried here.
    pub async fn start(
        &self,
        total_size: u64,
        cancel: &CancellationToken,
    ) -> Result<Session, UpdateError> {
        if total_size == 0 {
            return Err(UpdateError::SessionStartFailed("empty upload".into()));
        }

        let req = DeviceRequest::post(Endpoint::SessionStart)
            .form(&[("size", total_size.to_string())])
            .timeout(self.timeout);

        let resp = send_or_cancel(self.conn, req, cancel)
            .await?
            .map_err(|e| UpdateError::SessionStartFailed(e.to_string()))?;

        if !resp.is_success() {
            return Err(UpdateError::SessionStartFailed(format!(
                "HTTP {}: {}",
                resp.status,
                resp.text()
            )));
        }

        let reply: SessionStartResponse = resp
            .json()
            .map_err(|e| UpdateError::SessionStartFailed(format!("invalid session reply: {e}")))?;

        if reply.total != total_size {
            return Err(UpdateError::SessionStartFailed(format!(
                "device opened session for {} bytes, expected {total_size}",
                reply.total
            )));
        }
        if reply.have > reply.total {
            return Err(UpdateError::SessionStartFailed(format!(
                "device reports {} of {} bytes",
                reply.have, reply.total
            )));
        }

        debug!(
            device = %self.conn.device_id(),
            session = %reply.id,
            have = reply.have,
            total = reply.total,
            "session opened"
        );
        Ok(reply.into())
    }

    /// Queries the committed offset of the open session.
    ///
    /// Returns a reason string when the query fails or the answer is not
    /// usable (missing `have`, or `have` beyond `total`). Cancellation is
    /// the only hard error.
    pub async fn committed(
        &self,
        total: u64,
        cancel: &CancellationToken,
    ) -> Result<Result<u64, String>, UpdateError> {
        let req = DeviceRequest::get(Endpoint::SessionStatus).timeout(self.timeout);
        let resp = match send_or_cancel(self.conn, req, cancel).await? {
            Ok(resp) => resp,
            Err(e) => return Ok(Err(e.to_string())),
        };

        if !resp.is_success() {
            return Ok(Err(format!("status HTTP {}", resp.status)));
        }

        let status: SessionStatusResponse = match resp.json() {
            Ok(s) => s,
            Err(e) => return Ok(Err(format!("invalid status reply: {e}"))),
        };

        match status.have {
            Some(have) if have <= total => Ok(Ok(have)),
            Some(have) => {
                warn!(have, total, "device status reports more bytes than the session holds");
                Ok(Err(format!("status reports have={have} beyond total={total}")))
            }
            None => Ok(Err("status reply has no 'have'".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::testing::{Scripted, ScriptedDevice};
    use otapush_protocol::envelope::RequestBody;

    const T: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn start_fresh_session() {
        let dev = ScriptedDevice::new();
        dev.script(
            Endpoint::SessionStart,
            Scripted::json(200, r#"{"id":"s1","have":0,"total":200000}"#),
        );
        let neg = SessionNegotiator::new(&dev, T);

        let s = neg.start(200_000, &CancellationToken::new()).await.unwrap();
        assert_eq!(
            s,
            Session {
                id: "s1".into(),
                total: 200_000,
                have: 0
            }
        );

        let reqs = dev.requests_to(Endpoint::SessionStart);
        assert_eq!(reqs.len(), 1);
        assert_eq!(
            reqs[0].body,
            RequestBody::Form(vec![("size".into(), "200000".into())])
        );
        assert_eq!(reqs[0].timeout, Some(T));
    }

    #[tokio::test]
    async fn start_resumed_session() {
        let dev = ScriptedDevice::new();
        dev.script(
            Endpoint::SessionStart,
            Scripted::json(200, r#"{"id":"s1","have":65536,"total":200000}"#),
        );
        let s = SessionNegotiator::new(&dev, T)
            .start(200_000, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(s.have, 65_536);
    }

    #[tokio::test]
    async fn start_transport_failure_is_fatal() {
        let dev = ScriptedDevice::new();
        dev.script(
            Endpoint::SessionStart,
            Scripted::Fail(TransportError::Connect("refused".into())),
        );
        let err = SessionNegotiator::new(&dev, T)
            .start(10, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::SessionStartFailed(ref m) if m.contains("refused")));
        // No implicit retry.
        assert_eq!(dev.requests().len(), 1);
    }

    #[tokio::test]
    async fn start_http_failure_is_fatal() {
        let dev = ScriptedDevice::new();
        dev.script(Endpoint::SessionStart, Scripted::text(507, "no space"));
        let err = SessionNegotiator::new(&dev, T)
            .start(10, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::SessionStartFailed(ref m) if m == "HTTP 507: no space"));
    }

    #[tokio::test]
    async fn start_rejects_garbage_reply() {
        let dev = ScriptedDevice::new();
        dev.script(Endpoint::SessionStart, Scripted::text(200, "<html>"));
        let err = SessionNegotiator::new(&dev, T)
            .start(10, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::SessionStartFailed(_)));
    }

    #[tokio::test]
    async fn start_rejects_size_mismatch() {
        let dev = ScriptedDevice::new();
        dev.script(
            Endpoint::SessionStart,
            Scripted::json(200, r#"{"id":"s1","have":0,"total":99}"#),
        );
        let err = SessionNegotiator::new(&dev, T)
            .start(100, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::SessionStartFailed(_)));
    }

    #[tokio::test]
    async fn start_rejects_have_beyond_total() {
        let dev = ScriptedDevice::new();
        dev.script(
            Endpoint::SessionStart,
            Scripted::json(200, r#"{"id":"s1","have":101,"total":100}"#),
        );
        let err = SessionNegotiator::new(&dev, T)
            .start(100, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::SessionStartFailed(_)));
    }

    #[tokio::test]
    async fn start_empty_upload_sends_nothing() {
        let dev = ScriptedDevice::new();
        let err = SessionNegotiator::new(&dev, T)
            .start(0, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::SessionStartFailed(ref m) if m == "empty upload"));
        assert!(dev.requests().is_empty());
    }

    #[tokio::test]
    async fn start_cancelled() {
        let dev = ScriptedDevice::new();
        dev.script(Endpoint::SessionStart, Scripted::Hang);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = SessionNegotiator::new(&dev, T)
            .start(10, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn committed_reads_have() {
        let dev = ScriptedDevice::new();
        dev.script(Endpoint::SessionStatus, Scripted::json(200, r#"{"have":131072}"#));
        let have = SessionNegotiator::new(&dev, T)
            .committed(200_000, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(have, Ok(131_072));
    }

    #[tokio::test]
    async fn committed_soft_failures() {
        let dev = ScriptedDevice::new();
        dev.script(Endpoint::SessionStatus, Scripted::Fail(TransportError::Timeout));
        dev.script(Endpoint::SessionStatus, Scripted::text(503, "busy"));
        dev.script(Endpoint::SessionStatus, Scripted::json(200, "{}"));
        dev.script(Endpoint::SessionStatus, Scripted::json(200, r#"{"have":300000}"#));
        dev.script(Endpoint::SessionStatus, Scripted::text(200, "nope"));
        let neg = SessionNegotiator::new(&dev, T);
        let cancel = CancellationToken::new();

        for _ in 0..5 {
            assert!(neg.committed(200_000, &cancel).await.unwrap().is_err());
        }
    }
}
