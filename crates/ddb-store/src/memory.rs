use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use crate::error::{StoreError, StoreResult};
use crate::slot::{Checkout, ExclusiveSlot};
use crate::traits::{BucketRef, CommitHook, Entry, ReadTxn, Store, WriteTxn};

type Bucket = BTreeMap<Vec<u8>, Vec<u8>>;
type Namespace = BTreeMap<Vec<u8>, Arc<Bucket>>;

/// One immutable version of the whole store.
///
/// Namespaces and buckets sit behind their own `Arc`s, so publishing a
/// commit copies only what it touched and only when a reader still holds
/// the previous version.
#[derive(Clone, Debug, Default)]
struct Snapshot {
    namespaces: BTreeMap<Vec<u8>, Arc<Namespace>>,
}

impl Snapshot {
    fn bucket(&self, at: BucketRef<'_>) -> StoreResult<&Bucket> {
        let ns = self
            .namespaces
            .get(at.namespace)
            .ok_or_else(|| StoreError::namespace_not_found(at.namespace))?;
        ns.get(at.name)
            .map(|bucket| &**bucket)
            .ok_or_else(|| StoreError::bucket_not_found(at.namespace, at.name))
    }

    fn namespace_exists(&self, namespace: &[u8]) -> bool {
        self.namespaces.contains_key(namespace)
    }

    fn list_namespaces(&self) -> Vec<Vec<u8>> {
        self.namespaces.keys().cloned().collect()
    }

    fn bucket_exists(&self, at: BucketRef<'_>) -> bool {
        self.namespaces
            .get(at.namespace)
            .is_some_and(|ns| ns.contains_key(at.name))
    }

    fn get(&self, at: BucketRef<'_>, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.bucket(at)?.get(key).cloned())
    }

    fn seek_after(&self, at: BucketRef<'_>, after: Option<&[u8]>) -> StoreResult<Option<Entry>> {
        let view = BucketView {
            base: Some(self.bucket(at)?),
            changes: None,
        };
        Ok(view.seek_after(after))
    }

    fn count(&self, at: BucketRef<'_>) -> StoreResult<u64> {
        Ok(self.bucket(at)?.len() as u64)
    }

    /// Fold a writer's changes into this version.
    fn apply(&mut self, changes: BTreeMap<Vec<u8>, NamespaceChanges>) {
        for (name, ns_changes) in changes {
            if !ns_changes.live {
                self.namespaces.remove(&name);
                continue;
            }
            let ns = self.namespaces.entry(name).or_default();
            if ns_changes.reset {
                *ns = Arc::default();
            }
            let ns = Arc::make_mut(ns);
            for (bucket_name, bucket_changes) in ns_changes.buckets {
                if !bucket_changes.live {
                    ns.remove(&bucket_name);
                    continue;
                }
                let bucket = ns.entry(bucket_name).or_default();
                if bucket_changes.reset {
                    *bucket = Arc::default();
                }
                let bucket = Arc::make_mut(bucket);
                for (key, value) in bucket_changes.entries {
                    match value {
                        Some(value) => {
                            bucket.insert(key, value);
                        }
                        None => {
                            bucket.remove(&key);
                        }
                    }
                }
            }
        }
    }
}

/// Uncommitted changes to one namespace.
#[derive(Debug)]
struct NamespaceChanges {
    /// `false` once the namespace is deleted.
    live: bool,
    /// Committed buckets are hidden.
    reset: bool,
    buckets: BTreeMap<Vec<u8>, BucketChanges>,
}

impl NamespaceChanges {
    fn fresh(live: bool) -> Self {
        Self {
            live,
            reset: true,
            buckets: BTreeMap::new(),
        }
    }

    fn kept() -> Self {
        Self {
            live: true,
            reset: false,
            buckets: BTreeMap::new(),
        }
    }
}

/// Uncommitted changes to one bucket. A `None` value is a deleted key.
#[derive(Debug)]
struct BucketChanges {
    live: bool,
    reset: bool,
    entries: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl BucketChanges {
    fn fresh(live: bool) -> Self {
        Self {
            live,
            reset: true,
            entries: BTreeMap::new(),
        }
    }

    fn kept() -> Self {
        Self {
            live: true,
            reset: false,
            entries: BTreeMap::new(),
        }
    }
}

/// A bucket as seen from inside a write transaction: committed entries
/// with the transaction's own changes laid over them.
#[derive(Clone, Copy)]
struct BucketView<'a> {
    base: Option<&'a Bucket>,
    changes: Option<&'a BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
}

impl BucketView<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.changes.and_then(|changes| changes.get(key)) {
            Some(changed) => changed.clone(),
            None => self.base.and_then(|base| base.get(key).cloned()),
        }
    }

    fn seek_after(&self, after: Option<&[u8]>) -> Option<Entry> {
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        let mut base = self
            .base
            .into_iter()
            .flat_map(|b| b.range::<[u8], _>((lower, Bound::Unbounded)))
            .peekable();
        let mut changes = self
            .changes
            .into_iter()
            .flat_map(|c| c.range::<[u8], _>((lower, Bound::Unbounded)))
            .peekable();

        loop {
            let order = match (base.peek(), changes.peek()) {
                (None, None) => return None,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some((committed, _)), Some((changed, _))) => committed.cmp(changed),
            };
            match order {
                Ordering::Less => {
                    return base.next().map(|(k, v)| (k.clone(), v.clone()));
                }
                Ordering::Equal => {
                    base.next();
                }
                Ordering::Greater => {}
            }
            // Deleted keys are skipped.
            if let Some((key, Some(value))) = changes.next() {
                return Some((key.clone(), value.clone()));
            }
        }
    }

    fn count(&self) -> u64 {
        let committed = self.base.map_or(0, |b| b.len() as u64);
        let Some(changes) = self.changes else {
            return committed;
        };
        changes.iter().fold(committed, |n, (key, value)| {
            let was = self.base.is_some_and(|b| b.contains_key(key));
            match (was, value.is_some()) {
                (false, true) => n + 1,
                (true, false) => n - 1,
                _ => n,
            }
        })
    }
}

/// In-memory, snapshot-based transactional store.
///
/// Intended for tests and embedding. The committed state is an immutable
/// [`Snapshot`] behind an `RwLock`. Read transactions clone the pointer.
/// The write transaction shares the same pointer and records its changes
/// in an overlay; commit folds the overlay into the shared state,
/// copy-on-write at namespace and bucket granularity. Data is lost when
/// the store is dropped.
pub struct InMemoryStore {
    committed: Arc<RwLock<Arc<Snapshot>>>,
    writer: Arc<ExclusiveSlot<()>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            committed: Arc::new(RwLock::new(Arc::new(Snapshot::default()))),
            writer: ExclusiveSlot::new(()),
        }
    }

    fn current(&self) -> StoreResult<Arc<Snapshot>> {
        let guard = self
            .committed
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(Arc::clone(&guard))
    }

    /// Number of namespaces in the committed state.
    pub fn namespace_count(&self) -> StoreResult<usize> {
        Ok(self.current()?.namespaces.len())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let namespaces = self.namespace_count().unwrap_or_default();
        f.debug_struct("InMemoryStore")
            .field("namespace_count", &namespaces)
            .finish()
    }
}

impl Store for InMemoryStore {
    fn begin_read(&self) -> StoreResult<Box<dyn ReadTxn>> {
        Ok(Box::new(MemoryReadTxn {
            snapshot: self.current()?,
        }))
    }

    fn begin_write(&self) -> StoreResult<Box<dyn WriteTxn>> {
        // Admission first: the base must be taken after the previous writer
        // has published.
        let permit = self.writer.checkout()?;
        Ok(Box::new(MemoryWriteTxn {
            base: self.current()?,
            changes: BTreeMap::new(),
            committed: Arc::clone(&self.committed),
            hooks: Vec::new(),
            permit,
        }))
    }
}

struct MemoryReadTxn {
    snapshot: Arc<Snapshot>,
}

impl ReadTxn for MemoryReadTxn {
    fn namespace_exists(&self, namespace: &[u8]) -> StoreResult<bool> {
        Ok(self.snapshot.namespace_exists(namespace))
    }

    fn list_namespaces(&self) -> StoreResult<Vec<Vec<u8>>> {
        Ok(self.snapshot.list_namespaces())
    }

    fn bucket_exists(&self, bucket: BucketRef<'_>) -> StoreResult<bool> {
        Ok(self.snapshot.bucket_exists(bucket))
    }

    fn get(&self, bucket: BucketRef<'_>, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.snapshot.get(bucket, key)
    }

    fn seek_after(
        &self,
        bucket: BucketRef<'_>,
        after: Option<&[u8]>,
    ) -> StoreResult<Option<Entry>> {
        self.snapshot.seek_after(bucket, after)
    }

    fn count(&self, bucket: BucketRef<'_>) -> StoreResult<u64> {
        self.snapshot.count(bucket)
    }
}

struct MemoryWriteTxn {
    base: Arc<Snapshot>,
    changes: BTreeMap<Vec<u8>, NamespaceChanges>,
    committed: Arc<RwLock<Arc<Snapshot>>>,
    hooks: Vec<CommitHook>,
    permit: Checkout<()>,
}

impl MemoryWriteTxn {
    fn namespace_live(&self, namespace: &[u8]) -> bool {
        match self.changes.get(namespace) {
            Some(changes) => changes.live,
            None => self.base.namespace_exists(namespace),
        }
    }

    fn require_namespace(&self, namespace: &[u8]) -> StoreResult<()> {
        if self.namespace_live(namespace) {
            Ok(())
        } else {
            Err(StoreError::namespace_not_found(namespace))
        }
    }

    fn view(&self, at: BucketRef<'_>) -> StoreResult<BucketView<'_>> {
        self.require_namespace(at.namespace)?;
        let ns_changes = self.changes.get(at.namespace);
        let bucket_changes = ns_changes.and_then(|ns| ns.buckets.get(at.name));

        let ns_reset = ns_changes.is_some_and(|ns| ns.reset);
        let bucket_reset = bucket_changes.is_some_and(|b| b.reset);
        let base = if ns_reset || bucket_reset {
            None
        } else {
            self.base
                .namespaces
                .get(at.namespace)
                .and_then(|ns| ns.get(at.name))
                .map(|bucket| &**bucket)
        };

        let live = match bucket_changes {
            Some(changes) => changes.live,
            None => base.is_some(),
        };
        if !live {
            return Err(StoreError::bucket_not_found(at.namespace, at.name));
        }
        Ok(BucketView {
            base,
            changes: bucket_changes.map(|b| &b.entries),
        })
    }

    /// Overlay for a bucket already known to exist.
    fn changes_mut(&mut self, at: BucketRef<'_>) -> &mut BucketChanges {
        self.changes
            .entry(at.namespace.to_vec())
            .or_insert_with(NamespaceChanges::kept)
            .buckets
            .entry(at.name.to_vec())
            .or_insert_with(BucketChanges::kept)
    }
}

impl ReadTxn for MemoryWriteTxn {
    fn namespace_exists(&self, namespace: &[u8]) -> StoreResult<bool> {
        Ok(self.namespace_live(namespace))
    }

    fn list_namespaces(&self) -> StoreResult<Vec<Vec<u8>>> {
        let mut names: BTreeSet<Vec<u8>> = self
            .base
            .namespaces
            .keys()
            .filter(|name| !self.changes.contains_key(*name))
            .cloned()
            .collect();
        names.extend(
            self.changes
                .iter()
                .filter(|(_, changes)| changes.live)
                .map(|(name, _)| name.clone()),
        );
        Ok(names.into_iter().collect())
    }

    fn bucket_exists(&self, bucket: BucketRef<'_>) -> StoreResult<bool> {
        Ok(self.view(bucket).is_ok())
    }

    fn get(&self, bucket: BucketRef<'_>, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.view(bucket)?.get(key))
    }

    fn seek_after(
        &self,
        bucket: BucketRef<'_>,
        after: Option<&[u8]>,
    ) -> StoreResult<Option<Entry>> {
        Ok(self.view(bucket)?.seek_after(after))
    }

    fn count(&self, bucket: BucketRef<'_>) -> StoreResult<u64> {
        Ok(self.view(bucket)?.count())
    }
}

impl WriteTxn for MemoryWriteTxn {
    fn create_namespace(&mut self, namespace: &[u8]) -> StoreResult<bool> {
        if self.namespace_live(namespace) {
            return Ok(false);
        }
        self.changes
            .insert(namespace.to_vec(), NamespaceChanges::fresh(true));
        Ok(true)
    }

    fn delete_namespace(&mut self, namespace: &[u8]) -> StoreResult<()> {
        self.require_namespace(namespace)?;
        self.changes
            .insert(namespace.to_vec(), NamespaceChanges::fresh(false));
        Ok(())
    }

    fn create_bucket(&mut self, bucket: BucketRef<'_>) -> StoreResult<bool> {
        self.require_namespace(bucket.namespace)?;
        if self.view(bucket).is_ok() {
            return Ok(false);
        }
        *self.changes_mut(bucket) = BucketChanges::fresh(true);
        Ok(true)
    }

    fn delete_bucket(&mut self, bucket: BucketRef<'_>) -> StoreResult<bool> {
        self.require_namespace(bucket.namespace)?;
        if self.view(bucket).is_err() {
            return Ok(false);
        }
        *self.changes_mut(bucket) = BucketChanges::fresh(false);
        Ok(true)
    }

    fn put(&mut self, bucket: BucketRef<'_>, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.view(bucket)?;
        self.changes_mut(bucket)
            .entries
            .insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, bucket: BucketRef<'_>, key: &[u8]) -> StoreResult<bool> {
        let existed = self.view(bucket)?.get(key).is_some();
        if existed {
            self.changes_mut(bucket).entries.insert(key.to_vec(), None);
        }
        Ok(existed)
    }

    fn on_commit(&mut self, hook: CommitHook) {
        self.hooks.push(hook);
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryWriteTxn {
            base,
            changes,
            committed,
            hooks,
            permit,
        } = *self;
        // Release our hold on the base so an unobserved version is updated
        // in place.
        drop(base);
        {
            let mut guard = committed
                .write()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            Arc::make_mut(&mut *guard).apply(changes);
        }
        drop(permit);
        for hook in hooks {
            hook();
        }
        Ok(())
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        // The overlay was never published; dropping it is the rollback.
        Ok(())
    }
}
