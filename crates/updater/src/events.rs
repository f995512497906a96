//! Events emitted while an update runs.
//!
//! These are the collaborator interface for a presentation layer: a
//! progress bar subscribes to `Progress`, a log pane to `Log`, and the
//! terminal banner to `Done`.

use otapush_transfer::Phase;
use tokio::sync::mpsc;

/// Progress event emitted during an update attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    /// The attempt entered a new lifecycle phase.
    Phase(Phase),
    /// Percentage of the artifact committed by the device.
    Progress(u8),
    /// Human-readable diagnostic line.
    Log(String),
    /// Terminal result; sent exactly once per attempt.
    Done { success: bool, message: String },
}

/// Sending half shared by the orchestrator and its components.
///
/// Sends never fail the update: a dropped receiver only means nobody is
/// watching.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: mpsc::UnboundedSender<UpdateEvent>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<UpdateEvent>) -> Self {
        Self { tx }
    }

    pub(crate) fn phase(&self, phase: Phase) {
        let _ = self.tx.send(UpdateEvent::Phase(phase));
    }

    pub(crate) fn progress(&self, percent: u8) {
        let _ = self.tx.send(UpdateEvent::Progress(percent));
    }

    pub(crate) fn log(&self, line: impl Into<String>) {
        let _ = self.tx.send(UpdateEvent::Log(line.into()));
    }

    pub(crate) fn done(&self, success: bool, message: impl Into<String>) {
        let _ = self.tx.send(UpdateEvent::Done {
            success,
            message: message.into(),
        });
    }
}
