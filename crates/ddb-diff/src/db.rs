use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use ddb_store::{update, view, BucketRef, InMemoryStore, SqliteStore, Store, WriteTxn};

use crate::config::{DiffDbConfig, DEFAULT_STREAM_CAPACITY};
use crate::differential::{Differential, CORE_BUCKETS};
use crate::error::{DiffError, DiffResult};

/// A store holding any number of named differentials.
///
/// Every [`Differential`] opened from one `DiffDb` shares its store, and
/// therefore its single-writer admission.
#[derive(Clone)]
pub struct DiffDb {
    store: Arc<dyn Store>,
    stream_capacity: usize,
}

impl std::fmt::Debug for DiffDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiffDb")
            .field("stream_capacity", &self.stream_capacity)
            .finish_non_exhaustive()
    }
}

impl DiffDb {
    /// Wrap an existing store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }

    /// A database that lives only as long as this handle and its clones.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Open (or create) a SQLite-backed database at `path`.
    pub fn open_sqlite(path: impl AsRef<Path>) -> DiffResult<Self> {
        Ok(Self::new(Arc::new(SqliteStore::open(path)?)))
    }

    /// Open the store described by `config`.
    pub fn from_config(config: &DiffDbConfig) -> DiffResult<Self> {
        config.validate()?;
        let store = config.store.open()?;
        Ok(Self {
            store,
            stream_capacity: config.stream_capacity,
        })
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Open the differential `name`, creating it if it does not exist.
    pub fn open(&self, name: &str) -> DiffResult<Differential> {
        if name.is_empty() {
            return Err(DiffError::InvalidNamespace(name.to_string()));
        }
        let namespace = name.as_bytes();
        let created = update(&*self.store, |txn| -> DiffResult<bool> {
            let created = txn.create_namespace(namespace)?;
            for bucket in CORE_BUCKETS {
                txn.create_bucket(BucketRef::new(namespace, bucket))?;
            }
            Ok(created)
        })?;
        if created {
            info!(namespace = %name, "created differential");
        } else {
            debug!(namespace = %name, "opened differential");
        }
        Ok(Differential::new(name.to_string(), Arc::clone(&self.store)))
    }

    /// Delete the differential `name` and everything in it.
    pub fn delete(&self, name: &str) -> DiffResult<()> {
        update(&*self.store, |txn| txn.delete_namespace(name.as_bytes()))?;
        info!(namespace = %name, "deleted differential");
        Ok(())
    }

    /// Names of all differentials, in byte order.
    pub fn namespaces(&self) -> DiffResult<Vec<String>> {
        let names = view(&*self.store, |txn| txn.list_namespaces())?;
        Ok(names
            .into_iter()
            .map(|n| String::from_utf8_lossy(&n).into_owned())
            .collect())
    }

    /// Begin a write transaction for use with
    /// [`Differential::stage_in`].
    ///
    /// Blocks while another writer is active. The transaction rolls back if
    /// dropped without committing.
    pub fn begin_write(&self) -> DiffResult<Box<dyn WriteTxn>> {
        Ok(self.store.begin_write()?)
    }

    /// A bounded channel for feeding [`Differential::stage_stream`].
    pub fn stream_channel<T>(&self) -> (mpsc::Sender<Option<T>>, mpsc::Receiver<Option<T>>) {
        mpsc::channel(self.stream_capacity)
    }
}
