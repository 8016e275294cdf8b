//! SQLite-backed store.
//!
//! Namespaces, buckets and entries live in three `WITHOUT ROWID` tables of
//! a single database file. SQLite compares BLOB keys with `memcmp`, which
//! gives the lexicographic byte order the [`Cursor`](crate::Cursor)
//! promises. The database runs in WAL mode so readers keep a stable
//! snapshot while the writer works.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::config::SqliteOptions;
use crate::error::{StoreError, StoreResult};
use crate::slot::{Checkout, ExclusiveSlot};
use crate::traits::{BucketRef, CommitHook, Entry, ReadTxn, Store, WriteTxn};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS ddb_namespaces (
    name BLOB PRIMARY KEY
) WITHOUT ROWID;
CREATE TABLE IF NOT EXISTS ddb_buckets (
    namespace BLOB NOT NULL,
    name BLOB NOT NULL,
    PRIMARY KEY (namespace, name)
) WITHOUT ROWID;
CREATE TABLE IF NOT EXISTS ddb_entries (
    namespace BLOB NOT NULL,
    bucket BLOB NOT NULL,
    key BLOB NOT NULL,
    value BLOB NOT NULL,
    PRIMARY KEY (namespace, bucket, key)
) WITHOUT ROWID;
";

fn open_connection(path: &Path, options: &SqliteOptions) -> StoreResult<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_millis(options.busy_timeout_ms))?;
    let mode: String = conn.pragma_update_and_check(
        None,
        "journal_mode",
        options.journal_mode.as_str(),
        |row| row.get(0),
    )?;
    conn.pragma_update(None, "synchronous", options.synchronous.as_str())?;
    debug!(path = %path.display(), journal_mode = %mode, "opened sqlite connection");
    Ok(conn)
}

/// Durable store on a single SQLite database file.
///
/// One writer connection is checked out for the lifetime of each write
/// transaction, which both serializes writers and keeps the transaction
/// `Send`. Read transactions draw from a small pool of extra connections.
pub struct SqliteStore {
    path: PathBuf,
    options: SqliteOptions,
    writer: Arc<ExclusiveSlot<Connection>>,
    readers: Arc<Mutex<Vec<Connection>>>,
}

impl SqliteStore {
    /// Open (or create) a store at `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(path, SqliteOptions::default())
    }

    /// Open (or create) a store at `path`.
    pub fn open_with(path: impl AsRef<Path>, options: SqliteOptions) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let writer = open_connection(&path, &options)?;
        writer.execute_batch(SCHEMA)?;

        Ok(Self {
            path,
            options,
            writer: ExclusiveSlot::new(writer),
            readers: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&self) -> StoreResult<Connection> {
        let pooled = self
            .readers
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?
            .pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => open_connection(&self.path, &self.options),
        }
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .field("options", &self.options)
            .finish()
    }
}

impl Store for SqliteStore {
    fn begin_read(&self) -> StoreResult<Box<dyn ReadTxn>> {
        let conn = self.reader()?;
        conn.execute_batch("BEGIN DEFERRED")?;
        // A deferred transaction takes its snapshot at the first read.
        let pinned: StoreResult<i64> = conn
            .query_row("SELECT COUNT(*) FROM ddb_namespaces", [], |r| r.get(0))
            .map_err(StoreError::from);
        if let Err(e) = pinned {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                warn!(error = %rollback, "rollback of unpinned read transaction failed");
            }
            return Err(e);
        }
        Ok(Box::new(SqliteReadTxn {
            conn: Some(conn),
            pool: Arc::clone(&self.readers),
            pool_size: self.options.reader_pool_size,
        }))
    }

    fn begin_write(&self) -> StoreResult<Box<dyn WriteTxn>> {
        let conn = self.writer.checkout()?;
        conn.get()?.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteWriteTxn {
            conn: Some(conn),
            hooks: Vec::new(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Statements shared by read and write transactions
// ---------------------------------------------------------------------------

fn namespace_exists(conn: &Connection, namespace: &[u8]) -> StoreResult<bool> {
    let found = conn
        .prepare_cached("SELECT 1 FROM ddb_namespaces WHERE name = ?1")?
        .query_row(params![namespace], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn list_namespaces(conn: &Connection) -> StoreResult<Vec<Vec<u8>>> {
    let mut stmt = conn.prepare_cached("SELECT name FROM ddb_namespaces ORDER BY name")?;
    let mut rows = stmt.query([])?;
    let mut names = Vec::new();
    while let Some(row) = rows.next()? {
        names.push(row.get(0)?);
    }
    Ok(names)
}

fn bucket_exists(conn: &Connection, at: BucketRef<'_>) -> StoreResult<bool> {
    let found = conn
        .prepare_cached("SELECT 1 FROM ddb_buckets WHERE namespace = ?1 AND name = ?2")?
        .query_row(params![at.namespace, at.name], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn require_bucket(conn: &Connection, at: BucketRef<'_>) -> StoreResult<()> {
    if bucket_exists(conn, at)? {
        return Ok(());
    }
    if namespace_exists(conn, at.namespace)? {
        Err(StoreError::bucket_not_found(at.namespace, at.name))
    } else {
        Err(StoreError::namespace_not_found(at.namespace))
    }
}

fn get(conn: &Connection, at: BucketRef<'_>, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
    require_bucket(conn, at)?;
    let value = conn
        .prepare_cached(
            "SELECT value FROM ddb_entries WHERE namespace = ?1 AND bucket = ?2 AND key = ?3",
        )?
        .query_row(params![at.namespace, at.name, key], |r| r.get(0))
        .optional()?;
    Ok(value)
}

fn seek_after(
    conn: &Connection,
    at: BucketRef<'_>,
    after: Option<&[u8]>,
) -> StoreResult<Option<Entry>> {
    require_bucket(conn, at)?;
    let entry = match after {
        Some(key) => conn
            .prepare_cached(
                "SELECT key, value FROM ddb_entries \
                 WHERE namespace = ?1 AND bucket = ?2 AND key > ?3 \
                 ORDER BY key LIMIT 1",
            )?
            .query_row(params![at.namespace, at.name, key], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .optional()?,
        None => conn
            .prepare_cached(
                "SELECT key, value FROM ddb_entries \
                 WHERE namespace = ?1 AND bucket = ?2 \
                 ORDER BY key LIMIT 1",
            )?
            .query_row(params![at.namespace, at.name], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .optional()?,
    };
    Ok(entry)
}

fn count(conn: &Connection, at: BucketRef<'_>) -> StoreResult<u64> {
    require_bucket(conn, at)?;
    let n: i64 = conn
        .prepare_cached("SELECT COUNT(*) FROM ddb_entries WHERE namespace = ?1 AND bucket = ?2")?
        .query_row(params![at.namespace, at.name], |r| r.get(0))?;
    Ok(n as u64)
}

// ---------------------------------------------------------------------------
// Read transaction
// ---------------------------------------------------------------------------

struct SqliteReadTxn {
    conn: Option<Connection>,
    pool: Arc<Mutex<Vec<Connection>>>,
    pool_size: usize,
}

impl SqliteReadTxn {
    fn conn(&self) -> StoreResult<&Connection> {
        self.conn.as_ref().ok_or(StoreError::TransactionClosed)
    }
}

impl ReadTxn for SqliteReadTxn {
    fn namespace_exists(&self, namespace: &[u8]) -> StoreResult<bool> {
        namespace_exists(self.conn()?, namespace)
    }

    fn list_namespaces(&self) -> StoreResult<Vec<Vec<u8>>> {
        list_namespaces(self.conn()?)
    }

    fn bucket_exists(&self, bucket: BucketRef<'_>) -> StoreResult<bool> {
        bucket_exists(self.conn()?, bucket)
    }

    fn get(&self, bucket: BucketRef<'_>, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        get(self.conn()?, bucket, key)
    }

    fn seek_after(
        &self,
        bucket: BucketRef<'_>,
        after: Option<&[u8]>,
    ) -> StoreResult<Option<Entry>> {
        seek_after(self.conn()?, bucket, after)
    }

    fn count(&self, bucket: BucketRef<'_>) -> StoreResult<u64> {
        count(self.conn()?, bucket)
    }
}

impl Drop for SqliteReadTxn {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if let Err(e) = conn.execute_batch("ROLLBACK") {
            warn!(error = %e, "failed to end sqlite read transaction; discarding connection");
            return;
        }
        if let Ok(mut pool) = self.pool.lock() {
            if pool.len() < self.pool_size {
                pool.push(conn);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Write transaction
// ---------------------------------------------------------------------------

struct SqliteWriteTxn {
    conn: Option<Checkout<Connection>>,
    hooks: Vec<CommitHook>,
}

impl SqliteWriteTxn {
    fn conn(&self) -> StoreResult<&Connection> {
        self.conn.as_ref().ok_or(StoreError::TransactionClosed)?.get()
    }
}

impl ReadTxn for SqliteWriteTxn {
    fn namespace_exists(&self, namespace: &[u8]) -> StoreResult<bool> {
        namespace_exists(self.conn()?, namespace)
    }

    fn list_namespaces(&self) -> StoreResult<Vec<Vec<u8>>> {
        list_namespaces(self.conn()?)
    }

    fn bucket_exists(&self, bucket: BucketRef<'_>) -> StoreResult<bool> {
        bucket_exists(self.conn()?, bucket)
    }

    fn get(&self, bucket: BucketRef<'_>, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        get(self.conn()?, bucket, key)
    }

    fn seek_after(
        &self,
        bucket: BucketRef<'_>,
        after: Option<&[u8]>,
    ) -> StoreResult<Option<Entry>> {
        seek_after(self.conn()?, bucket, after)
    }

    fn count(&self, bucket: BucketRef<'_>) -> StoreResult<u64> {
        count(self.conn()?, bucket)
    }
}

impl WriteTxn for SqliteWriteTxn {
    fn create_namespace(&mut self, namespace: &[u8]) -> StoreResult<bool> {
        let inserted = self
            .conn()?
            .prepare_cached("INSERT OR IGNORE INTO ddb_namespaces (name) VALUES (?1)")?
            .execute(params![namespace])?;
        Ok(inserted > 0)
    }

    fn delete_namespace(&mut self, namespace: &[u8]) -> StoreResult<()> {
        let conn = self.conn()?;
        if !namespace_exists(conn, namespace)? {
            return Err(StoreError::namespace_not_found(namespace));
        }
        conn.prepare_cached("DELETE FROM ddb_entries WHERE namespace = ?1")?
            .execute(params![namespace])?;
        conn.prepare_cached("DELETE FROM ddb_buckets WHERE namespace = ?1")?
            .execute(params![namespace])?;
        conn.prepare_cached("DELETE FROM ddb_namespaces WHERE name = ?1")?
            .execute(params![namespace])?;
        Ok(())
    }

    fn create_bucket(&mut self, bucket: BucketRef<'_>) -> StoreResult<bool> {
        let conn = self.conn()?;
        if !namespace_exists(conn, bucket.namespace)? {
            return Err(StoreError::namespace_not_found(bucket.namespace));
        }
        let inserted = conn
            .prepare_cached("INSERT OR IGNORE INTO ddb_buckets (namespace, name) VALUES (?1, ?2)")?
            .execute(params![bucket.namespace, bucket.name])?;
        Ok(inserted > 0)
    }

    fn delete_bucket(&mut self, bucket: BucketRef<'_>) -> StoreResult<bool> {
        let conn = self.conn()?;
        if !namespace_exists(conn, bucket.namespace)? {
            return Err(StoreError::namespace_not_found(bucket.namespace));
        }
        conn.prepare_cached("DELETE FROM ddb_entries WHERE namespace = ?1 AND bucket = ?2")?
            .execute(params![bucket.namespace, bucket.name])?;
        let removed = conn
            .prepare_cached("DELETE FROM ddb_buckets WHERE namespace = ?1 AND name = ?2")?
            .execute(params![bucket.namespace, bucket.name])?;
        Ok(removed > 0)
    }

    fn put(&mut self, bucket: BucketRef<'_>, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let conn = self.conn()?;
        require_bucket(conn, bucket)?;
        conn.prepare_cached(
            "INSERT INTO ddb_entries (namespace, bucket, key, value) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(namespace, bucket, key) DO UPDATE SET value = excluded.value",
        )?
        .execute(params![bucket.namespace, bucket.name, key, value])?;
        Ok(())
    }

    fn delete(&mut self, bucket: BucketRef<'_>, key: &[u8]) -> StoreResult<bool> {
        let conn = self.conn()?;
        require_bucket(conn, bucket)?;
        let removed = conn
            .prepare_cached(
                "DELETE FROM ddb_entries WHERE namespace = ?1 AND bucket = ?2 AND key = ?3",
            )?
            .execute(params![bucket.namespace, bucket.name, key])?;
        Ok(removed > 0)
    }

    fn on_commit(&mut self, hook: CommitHook) {
        self.hooks.push(hook);
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        let conn = self.conn.take().ok_or(StoreError::TransactionClosed)?;
        let held = conn.get()?;
        if let Err(e) = held.execute_batch("COMMIT") {
            if let Err(rollback) = held.execute_batch("ROLLBACK") {
                warn!(error = %rollback, "rollback after failed commit did not complete");
            }
            return Err(e.into());
        }
        // Release the writer before running hooks.
        drop(conn);
        for hook in std::mem::take(&mut self.hooks) {
            hook();
        }
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> StoreResult<()> {
        let conn = self.conn.take().ok_or(StoreError::TransactionClosed)?;
        conn.get()?.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for SqliteWriteTxn {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if let Ok(held) = conn.get() {
            if let Err(e) = held.execute_batch("ROLLBACK") {
                warn!(error = %e, "rollback of abandoned write transaction failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;
    use crate::traits::update;

    fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("diff.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn basic_crud() {
        let (_dir, store) = temp_store();
        conformance::basic_crud(&store);
    }

    #[test]
    fn missing_buckets_are_errors() {
        let (_dir, store) = temp_store();
        conformance::missing_buckets_are_errors(&store);
    }

    #[test]
    fn rollback_discards_changes() {
        let (_dir, store) = temp_store();
        conformance::rollback_discards_changes(&store);
    }

    #[test]
    fn drop_without_commit_rolls_back() {
        let (_dir, store) = temp_store();
        conformance::drop_without_commit_rolls_back(&store);
    }

    #[test]
    fn commit_hooks_run_only_on_commit() {
        let (_dir, store) = temp_store();
        conformance::commit_hooks_run_only_on_commit(&store);
    }

    #[test]
    fn readers_see_committed_state_only() {
        let (_dir, store) = temp_store();
        conformance::readers_see_committed_state_only(&store);
    }

    #[test]
    fn namespaces_are_independent() {
        let (_dir, store) = temp_store();
        conformance::namespaces_are_independent(&store);
    }

    #[test]
    fn delete_namespace_removes_everything() {
        let (_dir, store) = temp_store();
        conformance::delete_namespace_removes_everything(&store);
    }

    #[test]
    fn seek_after_orders_by_bytes() {
        let (_dir, store) = temp_store();
        conformance::seek_after_orders_by_bytes(&store);
    }

    #[test]
    fn writers_are_serialized() {
        let (_dir, store) = temp_store();
        conformance::writers_are_serialized(Arc::new(store));
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("diff.db");
        let bucket = BucketRef::new(b"ns", b"data");
        {
            let store = SqliteStore::open(&path).unwrap();
            update(&store, |txn| -> StoreResult<()> {
                txn.create_namespace(b"ns")?;
                txn.create_bucket(bucket)?;
                txn.put(bucket, b"k", b"durable")
            })
            .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.path(), path.as_path());
        let txn = store.begin_read().unwrap();
        assert_eq!(txn.get(bucket, b"k").unwrap(), Some(b"durable".to_vec()));
    }

    #[test]
    fn reader_connections_are_pooled() {
        let (_dir, store) = temp_store();
        drop(store.begin_read().unwrap());
        drop(store.begin_read().unwrap());
        assert_eq!(store.readers.lock().unwrap().len(), 1);
    }

    #[test]
    fn failed_snapshot_pin_is_not_pooled() {
        let (dir, store) = temp_store();
        let raw = Connection::open(dir.path().join("diff.db")).unwrap();
        raw.execute_batch("DROP TABLE ddb_namespaces").unwrap();

        assert!(matches!(store.begin_read(), Err(StoreError::Sqlite(_))));
        assert!(store.readers.lock().unwrap().is_empty());

        raw.execute_batch(SCHEMA).unwrap();
        drop(store.begin_read().unwrap());
        assert_eq!(store.readers.lock().unwrap().len(), 1);
    }
}
