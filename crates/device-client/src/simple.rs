//! Single-request multipart upload for small payloads.
//!
//! No session, no resume: a failure means starting over. Progress is only
//! reported at the start (0) and after the device answers (100).

use std::path::Path;

use otapush_protocol::constants::{CONTENT_TYPE_OCTET_STREAM, Endpoint, FINALIZE_TIMEOUT};
use otapush_updater::{DeviceError, UpdateEvent};
use reqwest::multipart::{Form, Part};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::client::{HttpDevice, transport_error};

/// Where a simple upload is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleTarget {
    /// Raw application image.
    Firmware,
    /// Dual-image container, applied in one go.
    Container,
}

impl SimpleTarget {
    /// Picks the target from a file extension (`.bin` or `.zip`).
    pub fn for_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "bin" => Some(SimpleTarget::Firmware),
            "zip" => Some(SimpleTarget::Container),
            _ => None,
        }
    }

    pub fn endpoint(self) -> Endpoint {
        match self {
            SimpleTarget::Firmware => Endpoint::FirmwareUpload,
            SimpleTarget::Container => Endpoint::ContainerUpload,
        }
    }
}

/// Posts `data` as the multipart field `file` and returns the device's text.
///
/// Emits `Progress(0)`, `Progress(100)` on success, log lines, and one
/// `Done` on `events`.
pub async fn simple_upload(
    device: &HttpDevice,
    target: SimpleTarget,
    file_name: &str,
    data: Vec<u8>,
    events: &mpsc::UnboundedSender<UpdateEvent>,
) -> Result<String, DeviceError> {
    let size = data.len();
    let _ = events.send(UpdateEvent::Progress(0));
    let _ = events.send(UpdateEvent::Log(format!("uploading {file_name} ({size} bytes)")));

    let result = post_file(device, target, file_name, data).await;

    match &result {
        Ok(text) => {
            info!(device = %device.base_url(), file = %file_name, size, "simple upload accepted");
            let _ = events.send(UpdateEvent::Progress(100));
            let _ = events.send(UpdateEvent::Done {
                success: true,
                message: text.clone(),
            });
        }
        Err(e) => {
            warn!(device = %device.base_url(), error = %e, "simple upload failed");
            let _ = events.send(UpdateEvent::Done {
                success: false,
                message: e.to_string(),
            });
        }
    }
    result
}

async fn post_file(
    device: &HttpDevice,
    target: SimpleTarget,
    file_name: &str,
    data: Vec<u8>,
) -> Result<String, DeviceError> {
    let part = Part::bytes(data)
        .file_name(file_name.to_string())
        .mime_str(CONTENT_TYPE_OCTET_STREAM)
        .map_err(transport_error)?;
    let form = Form::new().part("file", part);

    let resp = device
        .http()
        .post(device.url(target.endpoint().path()))
        .multipart(form)
        .timeout(FINALIZE_TIMEOUT)
        .send()
        .await
        .map_err(transport_error)?;

    let status = resp.status();
    let text = resp.text().await.map_err(transport_error)?.trim().to_string();
    if !status.is_success() {
        return Err(DeviceError::Http {
            status: status.as_u16(),
            body: text,
        });
    }
    Ok(text)
}
