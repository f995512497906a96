//! Update orchestrator.
//!
//! Runs one attempt end to end (negotiate, transfer, finalize), reports
//! progress through an event channel, and honors cancellation at every
//! suspension point.

use otapush_transfer::{Phase, ProgressReporter, TransferState, UploadSource, checksum_source};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::connection::{DeviceConnection, check_cancelled};
use crate::driver::ChunkDriver;
use crate::error::UpdateError;
use crate::events::{EventSink, UpdateEvent};
use crate::finalizer::{FinalizeOutcome, Finalizer};
use crate::session::SessionNegotiator;
use crate::types::{UpdateConfig, UpdateSummary};

/// Pushes an artifact to a device through a resumable session.
///
/// Only one attempt should drive a given session at a time; callers keep
/// a single `OtaUpdate` running per device.
pub struct OtaUpdate {
    config: UpdateConfig,
    events_tx: mpsc::UnboundedSender<UpdateEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<UpdateEvent>>,
    cancel: CancellationToken,
}

impl Default for OtaUpdate {
    fn default() -> Self {
        Self::new(UpdateConfig::default())
    }
}

impl OtaUpdate {
    pub fn new(config: UpdateConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<UpdateEvent>> {
        self.events_rx.take()
    }

    /// Returns a cancellation token for this update.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Runs one update attempt.
    ///
    /// Emits `Phase`, `Log` and `Progress` events as it goes and exactly
    /// one `Done` at the end, whatever the outcome.
    pub async fn run(
        &self,
        conn: &dyn DeviceConnection,
        source: &dyn UploadSource,
    ) -> Result<UpdateSummary, UpdateError> {
        let sink = EventSink::new(self.events_tx.clone());
        let total = source.total_size();
        let mut reporter = ProgressReporter::new(total);

        let result = self.attempt(conn, source, &sink, &mut reporter).await;

        match &result {
            Ok(summary) => {
                info!(
                    device = %conn.device_id(),
                    session = %summary.session_id,
                    writes = summary.chunk_writes,
                    "update accepted"
                );
                sink.phase(Phase::Done);
                if let Some(pct) = reporter.observe(total) {
                    sink.progress(pct);
                }
                sink.done(true, summary.message.clone());
            }
            Err(e) => {
                if e.is_cancelled() {
                    info!(device = %conn.device_id(), "update cancelled");
                } else {
                    error!(device = %conn.device_id(), error = %e, "update failed");
                }
                sink.phase(Phase::Failed);
                sink.progress(reporter.last().unwrap_or(0));
                sink.done(false, e.to_string());
            }
        }

        result
    }

    async fn attempt(
        &self,
        conn: &dyn DeviceConnection,
        source: &dyn UploadSource,
        sink: &EventSink,
        reporter: &mut ProgressReporter,
    ) -> Result<UpdateSummary, UpdateError> {
        let cancel = &self.cancel;
        let total = source.total_size();

        // 1. Negotiate
        sink.phase(Phase::Negotiating);
        if total > 0 {
            sink.progress(reporter.force(0));
        } else {
            sink.progress(0);
        }
        check_cancelled(cancel)?;

        if self.config.log_checksum && total > 0 {
            let digest = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UpdateError::Cancelled),
                digest = checksum_source(source) => digest?,
            };
            sink.log(format!("sha256 {digest}"));
        }

        sink.log(format!("opening session for {total} bytes"));
        let session = SessionNegotiator::new(conn, self.config.request_timeout)
            .start(total, cancel)
            .await?;
        let mut state = TransferState::from_session(&session).ok_or_else(|| {
            UpdateError::SessionStartFailed(format!(
                "device reports {} of {} bytes",
                session.have, session.total
            ))
        })?;

        if session.have > 0 {
            sink.log(format!("resuming at {} of {total} bytes", session.have));
            if let Some(pct) = reporter.observe(session.have) {
                sink.progress(pct);
            }
        }

        // 2. Transfer
        enter_phase(&mut state, sink, Phase::Transferring);
        let stats = ChunkDriver::new(conn, source, &self.config)
            .with_sink(sink.clone())
            .run(&mut state, reporter, cancel)
            .await?;

        // 3. Finalize
        check_cancelled(cancel)?;
        enter_phase(&mut state, sink, Phase::Finalizing);
        sink.log("all bytes sent, finalizing");

        let finalizer = Finalizer::new(conn, self.config.finalize_timeout);
        let message = match finalizer.finalize(state.session_id(), cancel).await? {
            FinalizeOutcome::Accepted(msg) => msg,
            FinalizeOutcome::Rejected(msg) => {
                sink.log(format!("device rejected the update: {msg}"));
                return Err(UpdateError::FinalizeRejected(msg));
            }
            FinalizeOutcome::Indeterminate(reason) => {
                // One look at the session so the caller can choose between
                // finalizing again and restarting. Finalize is not repeated.
                sink.log(format!("finalize outcome unknown ({reason}), checking session"));
                let probe = Finalizer::new(conn, self.config.request_timeout)
                    .probe(state.total(), cancel)
                    .await?;
                sink.log(format!("probe: {probe}"));
                return Err(UpdateError::FinalizeIndeterminate(format!("{reason}; {probe}")));
            }
        };

        Ok(UpdateSummary {
            session_id: session.id,
            total,
            resumed_from: session.have,
            chunk_writes: stats.chunk_writes,
            reconciliations: stats.reconciliations,
            message,
        })
    }
}

fn enter_phase(state: &mut TransferState, sink: &EventSink, phase: Phase) {
    state.set_phase(phase);
    debug!(session = %state.session_id(), phase = %state.phase(), "phase changed");
    sink.phase(state.phase());
}
