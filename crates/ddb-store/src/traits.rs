//! The [`Store`] capability and its transaction traits.
//!
//! Higher layers are written against these traits only, so any backend
//! (in-memory, SQLite, or one supplied by the embedding application) can
//! sit underneath the differential engine.

use crate::error::{StoreError, StoreResult};

/// A key/value pair read from a bucket.
pub type Entry = (Vec<u8>, Vec<u8>);

/// Callback run once a write transaction has durably committed.
pub type CommitHook = Box<dyn FnOnce() + Send + 'static>;

/// Address of a bucket: a namespace name plus a bucket name within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BucketRef<'a> {
    pub namespace: &'a [u8],
    pub name: &'a [u8],
}

impl<'a> BucketRef<'a> {
    pub const fn new(namespace: &'a [u8], name: &'a [u8]) -> Self {
        Self { namespace, name }
    }
}

/// A transactional store of namespaces.
///
/// Implementations must be thread-safe and must admit at most one write
/// transaction at a time: `begin_write` blocks the caller until the
/// previous writer commits, rolls back or is dropped. Read transactions
/// may run concurrently with each other and with the writer.
pub trait Store: Send + Sync {
    /// Begin a read-only transaction over the last committed state.
    fn begin_read(&self) -> StoreResult<Box<dyn ReadTxn>>;

    /// Begin the exclusive read-write transaction.
    fn begin_write(&self) -> StoreResult<Box<dyn WriteTxn>>;
}

/// Read access inside a transaction.
///
/// Bucket accessors fail with [`StoreError::NamespaceNotFound`] or
/// [`StoreError::BucketNotFound`] when the addressed bucket is missing.
pub trait ReadTxn: Send {
    /// Returns `true` if the namespace exists.
    fn namespace_exists(&self, namespace: &[u8]) -> StoreResult<bool>;

    /// All namespace names in key order.
    fn list_namespaces(&self) -> StoreResult<Vec<Vec<u8>>>;

    /// Returns `true` if the bucket exists. A missing namespace is `false`.
    fn bucket_exists(&self, bucket: BucketRef<'_>) -> StoreResult<bool>;

    /// Read the value stored under `key`, if any.
    fn get(&self, bucket: BucketRef<'_>, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// The first entry whose key sorts strictly after `after`, or the first
    /// entry of the bucket when `after` is `None`.
    ///
    /// This is the primitive behind [`Cursor`](crate::Cursor): it carries no
    /// iterator state, so callers may mutate the bucket between calls.
    fn seek_after(&self, bucket: BucketRef<'_>, after: Option<&[u8]>)
        -> StoreResult<Option<Entry>>;

    /// Number of keys in the bucket.
    fn count(&self, bucket: BucketRef<'_>) -> StoreResult<u64>;

    /// Every entry of the bucket, in key order.
    fn entries(&self, bucket: BucketRef<'_>) -> StoreResult<Vec<Entry>> {
        let mut out = Vec::new();
        let mut position: Option<Vec<u8>> = None;
        while let Some((key, value)) = self.seek_after(bucket, position.as_deref())? {
            position = Some(key.clone());
            out.push((key, value));
        }
        Ok(out)
    }
}

/// The exclusive read-write transaction.
///
/// Reads observe the transaction's own writes. Nothing becomes visible to
/// other transactions until [`commit`](WriteTxn::commit) succeeds; dropping
/// the transaction instead discards every change.
pub trait WriteTxn: ReadTxn {
    /// Create a namespace if missing. Returns `true` if it was created.
    fn create_namespace(&mut self, namespace: &[u8]) -> StoreResult<bool>;

    /// Delete a namespace with all of its buckets.
    fn delete_namespace(&mut self, namespace: &[u8]) -> StoreResult<()>;

    /// Create a bucket if missing. Returns `true` if it was created.
    /// The namespace must already exist.
    fn create_bucket(&mut self, bucket: BucketRef<'_>) -> StoreResult<bool>;

    /// Delete a bucket and its entries. Returns `true` if it existed.
    fn delete_bucket(&mut self, bucket: BucketRef<'_>) -> StoreResult<bool>;

    /// Insert or overwrite a value.
    fn put(&mut self, bucket: BucketRef<'_>, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Remove a key. Returns `true` if the key existed.
    fn delete(&mut self, bucket: BucketRef<'_>, key: &[u8]) -> StoreResult<bool>;

    /// Register a callback to run after a successful commit. Hooks are
    /// dropped unrun if the transaction rolls back.
    fn on_commit(&mut self, hook: CommitHook);

    /// Atomically publish every change made in this transaction.
    fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discard every change made in this transaction.
    fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Run `f` inside a read transaction.
pub fn view<R, E, F>(store: &dyn Store, f: F) -> Result<R, E>
where
    E: From<StoreError>,
    F: FnOnce(&dyn ReadTxn) -> Result<R, E>,
{
    let txn = store.begin_read()?;
    f(&*txn)
}

/// Run `f` inside the write transaction, committing if it returns `Ok` and
/// rolling back otherwise.
pub fn update<R, E, F>(store: &dyn Store, f: F) -> Result<R, E>
where
    E: From<StoreError>,
    F: FnOnce(&mut dyn WriteTxn) -> Result<R, E>,
{
    let mut txn = store.begin_write()?;
    match f(&mut *txn) {
        Ok(value) => {
            txn.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = txn.rollback() {
                tracing::warn!(error = %rollback, "rollback after failed update did not complete");
            }
            Err(e)
        }
    }
}
