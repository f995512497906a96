use std::time::Duration;

/// Size of one chunk-write slice (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Fixed wait before querying session status after a failed chunk-write.
pub const RECONCILE_DELAY: Duration = Duration::from_secs(3);

/// Timeout for ordinary request/response calls (session start, status, chunks).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the finalize call.
///
/// Finalize returns only after the device has validated the assembled
/// container, so it runs much longer than a chunk-write.
pub const FINALIZE_TIMEOUT: Duration = Duration::from_secs(120);

/// Interval between release-update progress polls.
pub const RELEASE_POLL_INTERVAL: Duration = Duration::from_millis(700);

/// Interval between device status polls for the connection indicator.
pub const STATUS_POLL_INTERVAL: Duration = Duration::from_millis(1200);

/// Content type of a raw chunk body.
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// HTTP endpoints exposed by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    // Resumable session
    SessionStart,
    SessionChunk,
    SessionStatus,
    SessionFinalize,

    // Non-resumable uploads
    FirmwareUpload,
    ContainerUpload,

    // Release update driven by the device itself
    ReleaseCheck,
    ReleaseUpdate,
    ReleaseProgress,

    // Device status
    Status,
}

impl Endpoint {
    /// Returns the absolute request path for this endpoint.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::SessionStart => "/api/ota/session/start",
            Endpoint::SessionChunk => "/api/ota/session/chunk",
            Endpoint::SessionStatus => "/api/ota/session/status",
            Endpoint::SessionFinalize => "/api/ota/session/finalize",
            Endpoint::FirmwareUpload => "/api/ota/upload",
            Endpoint::ContainerUpload => "/api/ota/updatezip",
            Endpoint::ReleaseCheck => "/api/ota/github_check",
            Endpoint::ReleaseUpdate => "/api/ota/github_update",
            Endpoint::ReleaseProgress => "/api/ota/github_progress",
            Endpoint::Status => "/api/status",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}
