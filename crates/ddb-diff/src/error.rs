//! Error types for the differential engine.

use std::error::Error;
use std::fmt;

use ddb_hash::HasherError;
use ddb_store::StoreError;
use ddb_types::{ContentHash, TypeError};

/// Errors that can occur during differential operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// Conflict tracking is on and this ID was already staged in the
    /// current epoch. Nothing was changed.
    #[error("conflicting key: {} was already staged in this epoch", hex::encode(.id))]
    ConflictingKey { id: Vec<u8> },

    /// One or more items failed to apply, or the run was cancelled.
    #[error(transparent)]
    Apply(#[from] ApplyError),

    /// A streaming stage was cancelled and its batch discarded.
    #[error("operation cancelled")]
    Cancelled,

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The object could not be hashed.
    #[error("hash error: {0}")]
    Hash(#[from] HasherError),

    /// The object could not be encoded or a payload could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// A configuration value is invalid or could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The namespace name is not usable.
    #[error("invalid namespace name: {0:?}")]
    InvalidNamespace(String),

    /// A background task running a blocking store call failed.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A pending entry has no payload. The namespace is corrupt.
    #[error("corrupt state: pending entry {} has no payload for hash {hash}", hex::encode(.id))]
    MissingPayload { id: Vec<u8>, hash: ContentHash },

    /// A stored hash has the wrong width. The namespace is corrupt.
    #[error("corrupt state: stored hash for {} is malformed: {source}", hex::encode(.id))]
    CorruptHash {
        id: Vec<u8>,
        #[source]
        source: TypeError,
    },
}

impl DiffError {
    /// Whether this error signals inconsistent stored state rather than an
    /// ordinary runtime failure.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::MissingPayload { .. } | Self::CorruptHash { .. })
    }

    /// Whether this is a [`DiffError::ConflictingKey`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConflictingKey { .. })
    }

    /// The aggregated apply report, if this is an apply failure.
    pub fn as_apply(&self) -> Option<&ApplyError> {
        match self {
            Self::Apply(report) => Some(report),
            _ => None,
        }
    }
}

/// Convenience alias for differential results.
pub type DiffResult<T> = Result<T, DiffError>;

/// A single item the apply callback rejected.
#[derive(Debug)]
pub struct ApplyFailure {
    /// ID of the item, still pending.
    pub id: Vec<u8>,
    /// The error the callback returned.
    pub error: Box<dyn Error + Send + Sync>,
}

/// Outcome of an apply run that did not fully succeed.
///
/// Items that succeeded were promoted and committed regardless of the
/// failures listed here.
#[derive(Debug, Default)]
pub struct ApplyError {
    /// Items promoted before the run ended.
    pub promoted: usize,
    /// Every item whose callback failed, in scan order.
    pub failures: Vec<ApplyFailure>,
    /// Whether the run stopped because it was cancelled.
    pub cancelled: bool,
}

impl ApplyError {
    /// IDs of the failed items, in scan order.
    pub fn failed_ids(&self) -> Vec<&[u8]> {
        self.failures.iter().map(|f| f.id.as_slice()).collect()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "apply stopped with {} failed item(s) after promoting {}",
            self.failures.len(),
            self.promoted
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        for failure in &self.failures {
            write!(f, "\n  {}: {}", hex::encode(&failure.id), failure.error)?;
        }
        Ok(())
    }
}

impl Error for ApplyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.failures
            .first()
            .map(|f| f.error.as_ref() as &(dyn Error + 'static))
    }
}
