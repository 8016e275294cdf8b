//! One namespace of change-tracking state.
//!
//! A [`Differential`] owns five buckets inside its namespace:
//!
//! | Bucket | Contents                                             |
//! |--------|------------------------------------------------------|
//! | `_m`   | ID to hash of the last successfully applied version  |
//! | `_ph`  | ID to hash of the latest staged, unapplied version   |
//! | `_pd`  | hash and ID to encoded payload of a pending version  |
//! | `_ud`  | free-form user data, outside the diff protocol       |
//! | `_dk`  | ID to marker; present only while tracking conflicts  |

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use ddb_hash::StructuralHasher;
use ddb_store::{update, view, BucketRef, Cursor, ReadTxn, Store, WriteTxn};
use ddb_types::ContentHash;

use crate::codec;
use crate::error::{DiffError, DiffResult};
use crate::object::Object;

pub(crate) const COMMITTED: &[u8] = b"_m";
pub(crate) const PENDING: &[u8] = b"_ph";
pub(crate) const PAYLOADS: &[u8] = b"_pd";
pub(crate) const USER_DATA: &[u8] = b"_ud";
pub(crate) const CONFLICTS: &[u8] = b"_dk";

/// Buckets created when a namespace is opened.
pub(crate) const CORE_BUCKETS: [&[u8]; 4] = [COMMITTED, PENDING, PAYLOADS, USER_DATA];

/// Key of a pending payload: the 8 hash bytes followed by the ID.
///
/// Scoping the payload by ID keeps two IDs with identical content from
/// sharing, and then orphaning, one payload entry.
pub(crate) fn payload_key(hash: &[u8], id: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(hash.len() + id.len());
    key.extend_from_slice(hash);
    key.extend_from_slice(id);
    key
}

/// Parse a hash read back from the committed or pending bucket.
pub(crate) fn stored_hash(id: &[u8], raw: &[u8]) -> DiffResult<ContentHash> {
    ContentHash::from_slice(raw).map_err(|source| DiffError::CorruptHash {
        id: id.to_vec(),
        source,
    })
}

/// Change-tracking handle for one namespace.
///
/// Obtained from [`DiffDb::open`](crate::DiffDb::open). Handles are cheap to
/// clone and every clone addresses the same persisted state.
#[derive(Clone)]
pub struct Differential {
    name: String,
    pub(crate) store: Arc<dyn Store>,
    hasher: StructuralHasher,
}

impl std::fmt::Debug for Differential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Differential")
            .field("name", &self.name)
            .field("hasher", &self.hasher)
            .finish()
    }
}

impl Differential {
    pub(crate) fn new(name: String, store: Arc<dyn Store>) -> Self {
        Self {
            name,
            store,
            hasher: StructuralHasher::OBJECT,
        }
    }

    /// The namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn bucket(&self, name: &'static [u8]) -> BucketRef<'_> {
        BucketRef::new(self.name.as_bytes(), name)
    }

    // ---------------------------------------------------------------
    // Staging
    // ---------------------------------------------------------------

    /// Stage `obj` in its own transaction.
    ///
    /// Returns `true` when a new pending version was written and `false`
    /// when the content matches the committed or pending version already.
    pub fn stage<T: Object + ?Sized>(&self, obj: &T) -> DiffResult<bool> {
        update(&*self.store, |txn| self.stage_in(txn, obj))
    }

    /// Stage `obj` inside a transaction owned by the caller.
    ///
    /// Nothing is durable until the caller commits `txn`. On error the
    /// transaction has not been modified by this call and may still be
    /// committed or rolled back.
    pub fn stage_in<T: Object + ?Sized>(
        &self,
        txn: &mut dyn WriteTxn,
        obj: &T,
    ) -> DiffResult<bool> {
        let id = obj.id();
        let conflicts = self.bucket(CONFLICTS);
        let tracking = txn.bucket_exists(conflicts)?;
        if tracking && txn.get(conflicts, &id)?.is_some() {
            return Err(DiffError::ConflictingKey { id });
        }

        let hash = self.hasher.hash(obj)?;
        let hash_bytes = hash.as_bytes().as_slice();

        if txn.get(self.bucket(COMMITTED), &id)?.as_deref() == Some(hash_bytes) {
            return Ok(false);
        }

        let previous = txn.get(self.bucket(PENDING), &id)?;
        if previous.as_deref() == Some(hash_bytes) {
            return Ok(false);
        }

        // Encode before the first write so a codec failure leaves the
        // transaction untouched.
        let raw = codec::encode(obj)?;

        if let Some(previous) = previous {
            txn.delete(self.bucket(PAYLOADS), &payload_key(&previous, &id))?;
        }
        txn.put(self.bucket(PENDING), &id, hash_bytes)?;
        txn.put(self.bucket(PAYLOADS), &payload_key(hash_bytes, &id), &raw)?;
        if tracking {
            txn.put(conflicts, &id, &[])?;
        }

        debug!(
            namespace = %self.name,
            id = %hex::encode(&id),
            hash = %hash,
            "staged update"
        );
        Ok(true)
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Whether `candidate` differs from the last applied version of `id`.
    ///
    /// Pending versions are ignored. An ID that was never applied is
    /// always reported as changed.
    pub fn changed<T: Serialize + ?Sized>(&self, id: &[u8], candidate: &T) -> DiffResult<bool> {
        let hash = self.hasher.hash(candidate)?;
        let committed = view(&*self.store, |txn| txn.get(self.bucket(COMMITTED), id))?;
        Ok(committed.as_deref() != Some(hash.as_bytes().as_slice()))
    }

    /// Number of IDs with a committed version.
    pub fn count_tracking(&self) -> DiffResult<u64> {
        Ok(view(&*self.store, |txn| txn.count(self.bucket(COMMITTED)))?)
    }

    /// Number of IDs with a pending version.
    pub fn count_changes(&self) -> DiffResult<u64> {
        Ok(view(&*self.store, |txn| txn.count(self.bucket(PENDING)))?)
    }

    /// Hash of the last applied version of `id`.
    pub fn committed_hash(&self, id: &[u8]) -> DiffResult<Option<ContentHash>> {
        self.lookup_hash(COMMITTED, id)
    }

    /// Hash of the pending version of `id`.
    pub fn pending_hash(&self, id: &[u8]) -> DiffResult<Option<ContentHash>> {
        self.lookup_hash(PENDING, id)
    }

    fn lookup_hash(&self, bucket: &'static [u8], id: &[u8]) -> DiffResult<Option<ContentHash>> {
        let raw = view(&*self.store, |txn| txn.get(self.bucket(bucket), id))?;
        raw.map(|raw| stored_hash(id, &raw)).transpose()
    }

    /// IDs with a pending version, in ascending byte order.
    pub fn pending_ids(&self) -> DiffResult<Vec<Vec<u8>>> {
        let txn = self.store.begin_read()?;
        let mut cursor = Cursor::new(self.bucket(PENDING));
        let mut ids = Vec::new();
        while let Some((id, _)) = cursor.next(&*txn)? {
            ids.push(id);
        }
        Ok(ids)
    }

    // ---------------------------------------------------------------
    // Conflict tracking
    // ---------------------------------------------------------------

    /// Start a new conflict epoch.
    ///
    /// Clears all existing markers. Until tracking is disabled, staging an
    /// ID that was already staged in this epoch fails with
    /// [`DiffError::ConflictingKey`], even when the content is identical.
    pub fn enable_conflict_tracking(&self) -> DiffResult<()> {
        let name = self.name.clone();
        update(&*self.store, |txn| -> DiffResult<()> {
            let conflicts = self.bucket(CONFLICTS);
            txn.delete_bucket(conflicts)?;
            txn.create_bucket(conflicts)?;
            txn.on_commit(Box::new(move || {
                info!(namespace = %name, "conflict tracking enabled");
            }));
            Ok(())
        })
    }

    /// Stop rejecting duplicate IDs and drop all markers.
    pub fn disable_conflict_tracking(&self) -> DiffResult<()> {
        let name = self.name.clone();
        update(&*self.store, |txn| -> DiffResult<()> {
            if txn.delete_bucket(self.bucket(CONFLICTS))? {
                txn.on_commit(Box::new(move || {
                    info!(namespace = %name, "conflict tracking disabled");
                }));
            }
            Ok(())
        })
    }

    /// Whether conflict tracking is on for this namespace.
    pub fn is_tracking_conflicts(&self) -> DiffResult<bool> {
        Ok(view(&*self.store, |txn| {
            txn.bucket_exists(self.bucket(CONFLICTS))
        })?)
    }

    pub(crate) fn read_txn(&self) -> DiffResult<Box<dyn ReadTxn>> {
        Ok(self.store.begin_read()?)
    }
}
