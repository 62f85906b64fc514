//! Content-addressed result caching.

mod lru;

pub use lru::{CacheStats, ResultCache, DEFAULT_CAPACITY};

use std::fmt;

use sha2::{Digest, Sha256};

/// Hex characters of the hash exposed to callers and logs.
pub const SHORT_HASH_LEN: usize = 16;

/// SHA-256 identity of an image payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash raw bytes. Any byte sequence, including an empty one, is valid.
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }

    /// Full 64-character lowercase hex digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// 16-character hex prefix used in responses.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(SHORT_HASH_LEN);
        hex
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
