//! Byte-addressable upload sources, transfer state and progress accounting.
//!
//! Nothing here talks to the network: the updater crate drives these types.

mod checksum;
mod progress;
mod source;
mod types;

pub use checksum::{checksum_bytes, checksum_source};
pub use progress::{ProgressReporter, percent};
pub use source::{FileSource, MemorySource, UploadSource};
pub use types::{Phase, Session, TransferState};

pub use otapush_protocol::constants::DEFAULT_CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("read past end of source: offset {offset} + {len} > {total}")]
    OutOfRange { offset: u64, len: usize, total: u64 },
}
