//! Free-form per-namespace storage outside the diff protocol.
//!
//! Useful for bookkeeping such as the time of the last export. Entries in
//! the user bucket are never hashed, staged or applied.

use ddb_store::{update, BucketRef, Entry, ReadTxn, WriteTxn};

use crate::differential::{Differential, USER_DATA};
use crate::error::DiffResult;

/// Read-only view of a namespace's user data.
pub struct UserData<'t> {
    txn: &'t dyn ReadTxn,
    bucket: BucketRef<'t>,
}

impl UserData<'_> {
    pub fn get(&self, key: &[u8]) -> DiffResult<Option<Vec<u8>>> {
        Ok(self.txn.get(self.bucket, key)?)
    }

    pub fn len(&self) -> DiffResult<u64> {
        Ok(self.txn.count(self.bucket)?)
    }

    pub fn is_empty(&self) -> DiffResult<bool> {
        Ok(self.len()? == 0)
    }

    /// All entries in ascending key order.
    pub fn entries(&self) -> DiffResult<Vec<Entry>> {
        Ok(self.txn.entries(self.bucket)?)
    }
}

/// Read-write view of a namespace's user data.
pub struct UserDataMut<'t> {
    txn: &'t mut dyn WriteTxn,
    bucket: BucketRef<'t>,
}

impl UserDataMut<'_> {
    pub fn get(&self, key: &[u8]) -> DiffResult<Option<Vec<u8>>> {
        Ok(self.txn.get(self.bucket, key)?)
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> DiffResult<()> {
        Ok(self.txn.put(self.bucket, key, value)?)
    }

    /// Remove `key`, reporting whether it was present.
    pub fn delete(&mut self, key: &[u8]) -> DiffResult<bool> {
        Ok(self.txn.delete(self.bucket, key)?)
    }

    pub fn len(&self) -> DiffResult<u64> {
        Ok(self.txn.count(self.bucket)?)
    }

    pub fn is_empty(&self) -> DiffResult<bool> {
        Ok(self.len()? == 0)
    }

    /// All entries in ascending key order.
    pub fn entries(&self) -> DiffResult<Vec<Entry>> {
        Ok(self.txn.entries(self.bucket)?)
    }
}

impl Differential {
    /// Run `f` over a snapshot of the user data.
    pub fn view_user_data<R, F>(&self, f: F) -> DiffResult<R>
    where
        F: FnOnce(&UserData<'_>) -> DiffResult<R>,
    {
        let txn = self.read_txn()?;
        let data = UserData {
            txn: &*txn,
            bucket: self.bucket(USER_DATA),
        };
        f(&data)
    }

    /// Run `f` over the user data in a write transaction. Changes commit
    /// when `f` returns `Ok` and are rolled back otherwise.
    pub fn update_user_data<R, F>(&self, f: F) -> DiffResult<R>
    where
        F: FnOnce(&mut UserDataMut<'_>) -> DiffResult<R>,
    {
        update(&*self.store, |txn| {
            let mut data = UserDataMut {
                txn,
                bucket: self.bucket(USER_DATA),
            };
            f(&mut data)
        })
    }
}
