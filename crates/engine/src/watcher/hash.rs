// Content checksums for optimistic concurrency and change detection.
//
// A checksum is the lowercase hex SHA-256 of the file bytes. Watch events
// only count as changes when the checksum moved (mtime bumps and rewrites of
// identical bytes are no-ops).

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::store::StoreError;

/// Hex-encoded SHA-256 of file content.
pub type Checksum = String;

/// Compute the SHA-256 of the given bytes as a lowercase hex string.
pub fn sha256_hex(content: &[u8]) -> Checksum {
    let digest = Sha256::digest(content);
    hex_encode(&digest)
}

/// Compute the checksum of a file on disk.
pub fn checksum_file(path: &Path) -> Result<Checksum, StoreError> {
    match std::fs::read(path) {
        Ok(content) => Ok(sha256_hex(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::file_not_found(path)),
        Err(e) => Err(StoreError::Read(format!(
            "failed to read {} for checksum: {e}",
            path.display()
        ))),
    }
}

/// Returns the new checksum when it differs from `previous`, `None` when the
/// content is unchanged.
pub fn changed_checksum(previous: Option<&str>, content: &[u8]) -> Option<Checksum> {
    let current = sha256_hex(content);
    match previous {
        Some(prev) if prev == current => None,
        _ => Some(current),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}
