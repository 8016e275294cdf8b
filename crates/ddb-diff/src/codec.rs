//! Binary encoding of staged payloads.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::DiffResult;

/// Encode a value for payload storage.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> DiffResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

/// A staged object as handed to the apply callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Payload<'a> {
    bytes: &'a [u8],
}

impl<'a> Payload<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Decode the payload into a concrete type.
    ///
    /// The target must be shape-compatible with the type that was staged.
    pub fn decode<T: DeserializeOwned>(&self) -> DiffResult<T> {
        Ok(bincode::deserialize(self.bytes)?)
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
