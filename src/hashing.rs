//! Hashing - SHA-256 Content Names
//!
//! Backside files are named after their content so re-running a deck with
//! the same artwork yields the same file name.

use sha2::{Digest, Sha256};

/// Bytes of the digest kept in short content tags
const SHORT_HASH_BYTES: usize = 3;

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Six hex characters identifying `data`, used in backside file names
pub fn short_content_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(&digest[..SHORT_HASH_BYTES])
}

// We need hex encoding
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}
