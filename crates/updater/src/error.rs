//! Error types for the update flow.

use otapush_transfer::TransferError;

/// Failure to complete a single request/response round-trip.
///
/// A response with a non-2xx status is not a transport error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(String),
}

/// Terminal outcomes of an update attempt other than success.
///
/// Transient chunk failures never appear here: the chunk driver absorbs
/// them by reconciling with the device.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("session start failed: {0}")]
    SessionStartFailed(String),

    #[error("finalize rejected: {0}")]
    FinalizeRejected(String),

    #[error("finalize outcome unknown: {0}")]
    FinalizeIndeterminate(String),

    #[error("gave up reconciling after {attempts} status queries at offset {offset}")]
    ReconcileExhausted { attempts: u32, offset: u64 },

    #[error("source error: {0}")]
    Source(#[from] TransferError),

    #[error("cancelled")]
    Cancelled,
}

impl UpdateError {
    /// True for a caller-initiated stop.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UpdateError::Cancelled)
    }
}

/// Errors from the simple request/response device calls (status, release).
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("device refused: {0}")]
    Rejected(String),
}
