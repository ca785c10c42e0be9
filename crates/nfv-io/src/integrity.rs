//! Write-time content hashes consulted at verify time.
//!
//! The store only answers "was a buffer with these exact bytes written
//! somewhere". It is not keyed by offset, so data swapped between two offsets
//! still verifies.

use std::collections::HashSet;

use crate::{IoError, Result};

/// BLAKE3 hash type (32 bytes)
pub type ContentHash = [u8; 32];

#[inline]
pub fn content_hash(data: &[u8]) -> ContentHash {
    *blake3::hash(data).as_bytes()
}

#[inline]
pub fn hash_to_hex(hash: &ContentHash) -> String {
    hex::encode(hash)
}

#[derive(Debug, Default, Clone)]
pub struct IntegrityStore {
    seen: HashSet<ContentHash>,
}

impl IntegrityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `data` as written.
    pub fn record(&mut self, data: &[u8]) -> ContentHash {
        let hash = content_hash(data);
        self.seen.insert(hash);
        hash
    }

    pub fn contains(&self, data: &[u8]) -> bool {
        self.seen.contains(&content_hash(data))
    }

    /// Fail with `DataCheckFailed` unless `data` was recorded.
    pub fn verify(&self, data: &[u8], offset: u64) -> Result<()> {
        let hash = content_hash(data);
        if self.seen.contains(&hash) {
            Ok(())
        } else {
            Err(IoError::DataCheckFailed {
                offset,
                reason: format!(
                    "{} bytes hashing to {} were never written",
                    data.len(),
                    hash_to_hex(&hash)
                ),
            })
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
