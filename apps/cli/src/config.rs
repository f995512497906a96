//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/otapush/config.toml`
//! - Windows: `%APPDATA%/otapush/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use otapush_protocol::constants::{
    DEFAULT_CHUNK_SIZE, FINALIZE_TIMEOUT, RECONCILE_DELAY, RELEASE_POLL_INTERVAL, REQUEST_TIMEOUT,
    STATUS_POLL_INTERVAL,
};
use otapush_updater::UpdateConfig;
use serde::{Deserialize, Serialize};

use crate::cli::GlobalArgs;

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Base URL of the device.
    #[serde(default = "default_device_url")]
    pub device_url: String,

    /// Bytes per chunk-write.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Wait before each status query after a failed chunk.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Failed status queries tolerated per chunk failure; unset retries
    /// until interrupted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reconcile_attempts: Option<u32>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_finalize_timeout_secs")]
    pub finalize_timeout_secs: u64,

    #[serde(default = "default_release_poll_interval_ms")]
    pub release_poll_interval_ms: u64,

    #[serde(default = "default_status_poll_interval_ms")]
    pub status_poll_interval_ms: u64,
}

fn default_device_url() -> String {
    "http://192.168.4.1".into()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_retry_delay_ms() -> u64 {
    RECONCILE_DELAY.as_millis() as u64
}

fn default_request_timeout_secs() -> u64 {
    REQUEST_TIMEOUT.as_secs()
}

fn default_finalize_timeout_secs() -> u64 {
    FINALIZE_TIMEOUT.as_secs()
}

fn default_release_poll_interval_ms() -> u64 {
    RELEASE_POLL_INTERVAL.as_millis() as u64
}

fn default_status_poll_interval_ms() -> u64 {
    STATUS_POLL_INTERVAL.as_millis() as u64
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            device_url: default_device_url(),
            chunk_size: default_chunk_size(),
            retry_delay_ms: default_retry_delay_ms(),
            max_reconcile_attempts: None,
            request_timeout_secs: default_request_timeout_secs(),
            finalize_timeout_secs: default_finalize_timeout_secs(),
            release_poll_interval_ms: default_release_poll_interval_ms(),
            status_poll_interval_ms: default_status_poll_interval_ms(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from the default location.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Loads configuration from `path`, or creates a default if not found.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: CliConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = CliConfig::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies command-line overrides on top of the file values.
    pub fn apply_overrides(&mut self, args: &GlobalArgs) {
        if let Some(device) = &args.device {
            self.device_url = device.clone();
        }
        if let Some(chunk_size) = args.chunk_size {
            self.chunk_size = chunk_size;
        }
        if let Some(retry_delay_ms) = args.retry_delay_ms {
            self.retry_delay_ms = retry_delay_ms;
        }
        if let Some(max) = args.max_reconcile_attempts {
            self.max_reconcile_attempts = Some(max);
        }
    }

    /// Library configuration for one update attempt.
    pub fn update_config(&self) -> UpdateConfig {
        UpdateConfig {
            chunk_size: self.chunk_size,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_reconcile_attempts: self.max_reconcile_attempts,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            finalize_timeout: Duration::from_secs(self.finalize_timeout_secs),
            log_checksum: true,
        }
    }

    /// Bound for every single request outside the finalize call.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn release_poll_interval(&self) -> Duration {
        Duration::from_millis(self.release_poll_interval_ms)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("otapush")
            .join("config.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("otapush").join("config.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/otapush/config.toml"))
    }
}
