//! Dual-image update container.
//!
//! Layout (little-endian):
//!
//! ```text
//! 8 bytes   magic    "K2UPD1\0\0"
//! 4 bytes   fw_size  u32
//! 4 bytes   fs_size  u32
//! fw_size   firmware image
//! fs_size   filesystem image
//! ```
//!
//! The device validates each image when the session is finalized; the
//! client only checks the framing so it does not ship a file the device is
//! certain to reject.

/// Container magic.
pub const CONTAINER_MAGIC: &[u8; 8] = b"K2UPD1\0\0";

/// Length of the fixed header.
pub const HEADER_LEN: usize = 16;

/// Errors produced while parsing or building a container.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    #[error("container too short: {0} bytes")]
    TooShort(usize),

    #[error("bad container magic")]
    BadMagic,

    #[error("{0} image is empty")]
    EmptyImage(&'static str),

    #[error("container length mismatch: header says {expected} bytes, file has {actual}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("{0} image exceeds 4 GiB")]
    TooLarge(&'static str),
}

/// Parsed container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub firmware_size: u32,
    pub filesystem_size: u32,
}

impl ContainerHeader {
    /// Parses the header from the first bytes of a container.
    pub fn parse(buf: &[u8]) -> Result<Self, ContainerError> {
        if buf.len() < HEADER_LEN {
            return Err(ContainerError::TooShort(buf.len()));
        }
        if &buf[..8] != CONTAINER_MAGIC {
            return Err(ContainerError::BadMagic);
        }
        Ok(Self {
            firmware_size: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            filesystem_size: u32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    /// Total container length implied by the header.
    pub fn expected_len(&self) -> u64 {
        HEADER_LEN as u64 + u64::from(self.firmware_size) + u64::from(self.filesystem_size)
    }

    /// Checks that both images are present and the file length matches.
    pub fn validate_len(&self, actual: u64) -> Result<(), ContainerError> {
        if self.firmware_size == 0 {
            return Err(ContainerError::EmptyImage("firmware"));
        }
        if self.filesystem_size == 0 {
            return Err(ContainerError::EmptyImage("filesystem"));
        }
        let expected = self.expected_len();
        if expected != actual {
            return Err(ContainerError::LengthMismatch { expected, actual });
        }
        Ok(())
    }

    /// Encodes the header.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..8].copy_from_slice(CONTAINER_MAGIC);
        out[8..12].copy_from_slice(&self.firmware_size.to_le_bytes());
        out[12..16].copy_from_slice(&self.filesystem_size.to_le_bytes());
        out
    }
}

/// Builds a container from a firmware image and a filesystem image.
pub fn build_container(firmware: &[u8], filesystem: &[u8]) -> Result<Vec<u8>, ContainerError> {
    if firmware.is_empty() {
        return Err(ContainerError::EmptyImage("firmware"));
    }
    if filesystem.is_empty() {
        return Err(ContainerError::EmptyImage("filesystem"));
    }
    let header = ContainerHeader {
        firmware_size: u32::try_from(firmware.len())
            .map_err(|_| ContainerError::TooLarge("firmware"))?,
        filesystem_size: u32::try_from(filesystem.len())
            .map_err(|_| ContainerError::TooLarge("filesystem"))?,
    };

    let mut out = Vec::with_capacity(HEADER_LEN + firmware.len() + filesystem.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(firmware);
    out.extend_from_slice(filesystem);
    Ok(out)
}
