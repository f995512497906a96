use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Resumable session
// ---------------------------------------------------------------------------

/// Reply to `POST session/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartResponse {
    pub id: String,
    /// Contiguous bytes the device already holds for this session.
    #[serde(default)]
    pub have: u64,
    pub total: u64,
}

/// Reply to `GET session/status`.
///
/// Only `have` is relied upon; a reply without it is treated as a failed
/// status query by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatusResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub have: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

// ---------------------------------------------------------------------------
// Release update (the device downloads the release itself)
// ---------------------------------------------------------------------------

/// Reply to `GET github_check`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseCheckResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

/// Reply to `GET github_progress`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseProgress {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub pct: f64,
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub msg: String,
}

impl ReleaseProgress {
    /// True once the device has stopped working on the update for good.
    pub fn is_terminal(&self) -> bool {
        !self.active && (self.phase == "done" || self.phase == "error")
    }

    /// Progress clamped to `0..=100`.
    pub fn percent(&self) -> u8 {
        if self.pct.is_nan() {
            return 0;
        }
        self.pct.clamp(0.0, 100.0) as u8
    }
}

// ---------------------------------------------------------------------------
// Device status
// ---------------------------------------------------------------------------

/// Reply to `GET /api/status` (only the fields the client reads).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(default)]
    pub wifi: WifiStatus,
    #[serde(default)]
    pub ota: OtaStatus,
    #[serde(default)]
    pub app: AppInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WifiStatus {
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub ssid: String,
}

/// Progress of a device-side flash in progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtaStatus {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub written: u64,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}
