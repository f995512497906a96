//! Data types for the update flow.

use std::time::Duration;

use otapush_protocol::constants::{
    DEFAULT_CHUNK_SIZE, FINALIZE_TIMEOUT, RECONCILE_DELAY, REQUEST_TIMEOUT,
};

/// Tunables for one update attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateConfig {
    /// Bytes per chunk-write.
    pub chunk_size: usize,
    /// Fixed wait before each status query after a chunk failure.
    pub retry_delay: Duration,
    /// Consecutive failed status queries tolerated per failure;
    /// `None` keeps reconciling until cancelled.
    pub max_reconcile_attempts: Option<u32>,
    /// Timeout for session start, status and chunk requests.
    pub request_timeout: Duration,
    /// Timeout for the finalize request.
    pub finalize_timeout: Duration,
    /// Log the artifact's SHA-256 before negotiating.
    pub log_checksum: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry_delay: RECONCILE_DELAY,
            max_reconcile_attempts: None,
            request_timeout: REQUEST_TIMEOUT,
            finalize_timeout: FINALIZE_TIMEOUT,
            log_checksum: true,
        }
    }
}

impl UpdateConfig {
    /// Chunk size with a zero value mapped to the default.
    pub fn effective_chunk_size(&self) -> usize {
        if self.chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            self.chunk_size
        }
    }
}

/// Result of a successful update attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    pub session_id: String,
    pub total: u64,
    /// Offset the device reported when the session was opened.
    pub resumed_from: u64,
    pub chunk_writes: u32,
    pub reconciliations: u32,
    /// Device's finalize diagnostic.
    pub message: String,
}
