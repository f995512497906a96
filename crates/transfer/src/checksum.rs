use sha2::{Digest, Sha256};

use crate::{TransferError, UploadSource};

/// Read size used while hashing a source.
const HASH_BLOCK: usize = 64 * 1024;

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire upload source and returns the hex digest.
pub async fn checksum_source(source: &dyn UploadSource) -> Result<String, TransferError> {
    let total = source.total_size();
    let mut hasher = Sha256::new();
    let mut offset = 0u64;
    while offset < total {
        let len = (total - offset).min(HASH_BLOCK as u64) as usize;
        let block = source.read_at(offset, len).await?;
        hasher.update(&block);
        offset += len as u64;
    }
    Ok(hex::encode(hasher.finalize()))
}
