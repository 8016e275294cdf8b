use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Fixed-width structural digest of a tracked object's content.
///
/// Equal content always produces the same `ContentHash`. Unequal content
/// produces a different hash with high but not guaranteed probability; the
/// digest is not meant to resist deliberate collisions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 8]);

impl ContentHash {
    /// Width of the digest in bytes.
    pub const LEN: usize = 8;

    /// Wrap a pre-computed digest.
    pub const fn from_array(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Build a digest from its little-endian numeric form.
    pub fn from_u64(value: u64) -> Self {
        Self(value.to_le_bytes())
    }

    /// The numeric form of the digest (little-endian).
    pub fn to_u64(&self) -> u64 {
        u64::from_le_bytes(self.0)
    }

    /// Parse a digest from a stored key or value.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; 8] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The raw digest bytes, as written to storage.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 8]> for ContentHash {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl From<ContentHash> for [u8; 8] {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}
