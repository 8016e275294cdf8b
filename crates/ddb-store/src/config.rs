use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::memory::InMemoryStore;
use crate::sqlite::SqliteStore;
use crate::traits::Store;

/// Which storage backend to open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Volatile, process-local store.
    #[default]
    Memory,
    /// Durable SQLite database file.
    Sqlite,
}

/// Tuning for the SQLite backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteOptions {
    /// Value for `PRAGMA journal_mode`.
    pub journal_mode: String,
    /// Value for `PRAGMA synchronous`.
    pub synchronous: String,
    /// How long a connection waits on a locked database.
    pub busy_timeout_ms: u64,
    /// Idle reader connections kept for reuse.
    pub reader_pool_size: usize,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            journal_mode: "WAL".into(),
            synchronous: "NORMAL".into(),
            busy_timeout_ms: 5000,
            reader_pool_size: 4,
        }
    }
}

/// Store selection and location.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,
    /// Database file; required for [`Backend::Sqlite`].
    pub path: Option<PathBuf>,
    pub sqlite: SqliteOptions,
}

impl StoreConfig {
    /// An in-memory store configuration.
    pub fn memory() -> Self {
        Self::default()
    }

    /// A SQLite store at `path` with default tuning.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Sqlite,
            path: Some(path.into()),
            sqlite: SqliteOptions::default(),
        }
    }

    /// Open the configured backend.
    pub fn open(&self) -> StoreResult<Arc<dyn Store>> {
        match self.backend {
            Backend::Memory => Ok(Arc::new(InMemoryStore::new())),
            Backend::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    StoreError::Config("the sqlite backend requires a path".into())
                })?;
                Ok(Arc::new(SqliteStore::open_with(path, self.sqlite.clone())?))
            }
        }
    }
}
