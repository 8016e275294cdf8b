use crate::error::StoreResult;
use crate::traits::{BucketRef, Entry, ReadTxn};

/// Forward cursor over a bucket in ascending key order.
///
/// The cursor remembers only the last key it returned and re-seeks on
/// every step, so it does not borrow the transaction between steps. The
/// caller may put or delete keys (including the current one) and keep
/// iterating; keys inserted behind the cursor are not revisited.
#[derive(Clone, Debug)]
pub struct Cursor<'b> {
    bucket: BucketRef<'b>,
    position: Option<Vec<u8>>,
    exhausted: bool,
}

impl<'b> Cursor<'b> {
    /// A cursor positioned before the first key of `bucket`.
    pub fn new(bucket: BucketRef<'b>) -> Self {
        Self {
            bucket,
            position: None,
            exhausted: false,
        }
    }

    /// Advance to the next entry.
    pub fn next<T>(&mut self, txn: &T) -> StoreResult<Option<Entry>>
    where
        T: ReadTxn + ?Sized,
    {
        if self.exhausted {
            return Ok(None);
        }
        match txn.seek_after(self.bucket, self.position.as_deref())? {
            Some((key, value)) => {
                self.position = Some(key.clone());
                Ok(Some((key, value)))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    /// The last key returned, if any.
    pub fn position(&self) -> Option<&[u8]> {
        self.position.as_deref()
    }

    /// The bucket this cursor walks.
    pub fn bucket(&self) -> BucketRef<'b> {
        self.bucket
    }
}
