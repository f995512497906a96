//! Chunk driver: walks `[offset, total)` in fixed-size slices.
//!
//! One chunk-write is in flight at a time. Each write names the session
//! and the byte offset it starts at, so a repeated write is harmless. Any
//! failed write (transport error or non-2xx) moves the driver into
//! reconciliation: wait, ask the device for its committed `have`, and
//! continue from there. The device's answer always replaces the local
//! offset.

use otapush_protocol::constants::Endpoint;
use otapush_protocol::envelope::DeviceRequest;
use otapush_transfer::{ProgressReporter, TransferState, UploadSource};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{DeviceConnection, check_cancelled, send_or_cancel, sleep_or_cancel};
use crate::error::UpdateError;
use crate::events::{EventSink, UpdateEvent};
use crate::session::SessionNegotiator;
use crate::types::UpdateConfig;

/// Counters collected while driving one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Chunk-write requests issued, failed ones included.
    pub chunk_writes: u32,
    /// Payload bytes put on the wire, re-sends included.
    pub bytes_sent: u64,
    /// Chunk-writes that failed and triggered reconciliation.
    pub failed_writes: u32,
    /// Status answers adopted as the new offset.
    pub reconciliations: u32,
}

/// Internal states of the driver loop. `ChunkFailed` is the `Err` return.
#[derive(Debug)]
enum Step {
    Transferring,
    /// Waiting out the fixed backoff before status query number `attempt`.
    Retrying { attempt: u32 },
    /// Asking the device for its committed offset.
    Reconciling { attempt: u32 },
    AllSent,
}

/// Drives the chunk loop of one negotiated session.
pub struct ChunkDriver<'a> {
    conn: &'a dyn DeviceConnection,
    source: &'a dyn UploadSource,
    config: &'a UpdateConfig,
    events: Option<EventSink>,
}

impl<'a> ChunkDriver<'a> {
    pub fn new(
        conn: &'a dyn DeviceConnection,
        source: &'a dyn UploadSource,
        config: &'a UpdateConfig,
    ) -> Self {
        Self {
            conn,
            source,
            config,
            events: None,
        }
    }

    /// Sends `Progress` and `Log` events to `tx` while driving.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<UpdateEvent>) -> Self {
        self.events = Some(EventSink::new(tx));
        self
    }

    pub(crate) fn with_sink(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    /// Runs until `state.offset() == state.total()`.
    ///
    /// Transient chunk failures never escape; the only errors are
    /// cancellation, a failed source read, and an exhausted
    /// `max_reconcile_attempts` bound.
    pub async fn run(
        &self,
        state: &mut TransferState,
        reporter: &mut ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<DriverStats, UpdateError> {
        let chunk_size = self.config.effective_chunk_size();
        let negotiator = SessionNegotiator::new(self.conn, self.config.request_timeout);
        let mut stats = DriverStats::default();
        let mut step = Step::Transferring;

        loop {
            step = match step {
                Step::Transferring => {
                    if state.is_complete() {
                        Step::AllSent
                    } else {
                        check_cancelled(cancel)?;
                        let offset = state.offset();
                        let len = state.next_chunk_len(chunk_size);
                        let data = self.source.read_at(offset, len).await?;

                        stats.chunk_writes += 1;
                        stats.bytes_sent += len as u64;

                        match self.write_chunk(state.session_id(), offset, data, cancel).await? {
                            Ok(()) => {
                                state.advance(len);
                                debug!(offset = state.offset(), total = state.total(), "chunk acknowledged");
                                if let Some(pct) = reporter.observe(state.offset()) {
                                    self.emit_progress(pct);
                                }
                                Step::Transferring
                            }
                            Err(reason) => {
                                stats.failed_writes += 1;
                                warn!(offset, error = %reason, "chunk write failed, reconciling");
                                self.emit_log(format!("chunk at {offset} failed: {reason}"));
                                Step::Retrying { attempt: 1 }
                            }
                        }
                    }
                }

                Step::Retrying { attempt } => {
                    sleep_or_cancel(self.config.retry_delay, cancel).await?;
                    Step::Reconciling { attempt }
                }

                Step::Reconciling { attempt } => {
                    match negotiator.committed(state.total(), cancel).await? {
                        Ok(have) if adopt_reported(state, have) => {
                            stats.reconciliations += 1;
                            self.emit_log(format!("device has {have} of {} bytes", state.total()));
                            if let Some(pct) = reporter.observe(state.offset()) {
                                self.emit_progress(pct);
                            }
                            Step::Transferring
                        }
                        Ok(have) => {
                            self.query_failed(attempt, state, format!("unusable have={have}"))?
                        }
                        Err(reason) => self.query_failed(attempt, state, reason)?,
                    }
                }

                Step::AllSent => {
                    info!(
                        session = %state.session_id(),
                        writes = stats.chunk_writes,
                        reconciliations = stats.reconciliations,
                        "all chunks sent"
                    );
                    return Ok(stats);
                }
            };
        }
    }

    /// Issues one chunk-write. `Ok(Err(reason))` is a transient failure.
    async fn write_chunk(
        &self,
        session_id: &str,
        offset: u64,
        data: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Result<(), String>, UpdateError> {
        let req = DeviceRequest::post(Endpoint::SessionChunk)
            .query("id", session_id)
            .query("offset", offset)
            .binary(data)
            .timeout(self.config.request_timeout);

        Ok(match send_or_cancel(self.conn, req, cancel).await? {
            Ok(resp) if resp.is_success() => Ok(()),
            Ok(resp) => Err(format!("HTTP {}: {}", resp.status, resp.text())),
            Err(e) => Err(e.to_string()),
        })
    }

    /// Decides what follows a failed status query.
    fn query_failed(
        &self,
        attempt: u32,
        state: &TransferState,
        reason: String,
    ) -> Result<Step, UpdateError> {
        debug!(attempt, error = %reason, "status query failed");
        if let Some(max) = self.config.max_reconcile_attempts
            && attempt >= max
        {
            return Err(UpdateError::ReconcileExhausted {
                attempts: attempt,
                offset: state.offset(),
            });
        }
        Ok(Step::Retrying {
            attempt: attempt + 1,
        })
    }

    fn emit_progress(&self, pct: u8) {
        if let Some(events) = &self.events {
            events.progress(pct);
        }
    }

    fn emit_log(&self, line: String) {
        if let Some(events) = &self.events {
            events.log(line);
        }
    }
}

/// Overwrites the local offset with the device's `have`.
fn adopt_reported(state: &mut TransferState, have: u64) -> bool {
    let before = state.offset();
    if !state.adopt(have) {
        return false;
    }
    if have < before {
        warn!(before, have, "device reports fewer committed bytes than acknowledged");
    } else {
        debug!(before, have, "adopted device offset");
    }
    true
}
