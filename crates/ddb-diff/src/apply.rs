//! Applying pending changes.

use std::error::Error;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ddb_store::Cursor;

use crate::codec::Payload;
use crate::differential::{payload_key, stored_hash, Differential, COMMITTED, PAYLOADS, PENDING};
use crate::error::{ApplyError, ApplyFailure, DiffError, DiffResult};

impl Differential {
    /// Apply every pending change through `f`.
    ///
    /// Equivalent to [`apply_n`](Self::apply_n) with no limit.
    pub fn apply<F, E>(&self, cancel: &CancellationToken, f: F) -> DiffResult<usize>
    where
        F: FnMut(&[u8], &Payload<'_>) -> Result<(), E>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        self.apply_n(cancel, 0, f)
    }

    /// Apply pending changes through `f`, in ascending ID order, stopping
    /// after `limit` promotions (`0` means no limit).
    ///
    /// Each item whose callback succeeds is promoted: its hash becomes the
    /// committed hash and its pending entry and payload are removed. An
    /// item whose callback fails stays pending and does not count toward
    /// the limit. Cancellation is checked before each item; items not yet
    /// reached stay pending.
    ///
    /// All promotions are committed together at the end of the scan.
    /// Returns the number promoted, or [`DiffError::Apply`] describing the
    /// failures and cancellation when the run was not clean. A pending
    /// entry without a payload aborts the run with
    /// [`DiffError::MissingPayload`] and commits nothing.
    pub fn apply_n<F, E>(&self, cancel: &CancellationToken, limit: usize, mut f: F) -> DiffResult<usize>
    where
        F: FnMut(&[u8], &Payload<'_>) -> Result<(), E>,
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        let committed = self.bucket(COMMITTED);
        let pending = self.bucket(PENDING);
        let payloads = self.bucket(PAYLOADS);

        let mut txn = self.store.begin_write()?;
        let mut cursor = Cursor::new(pending);
        let mut report = ApplyError::default();

        while let Some((id, hash)) = cursor.next(&*txn)? {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let key = payload_key(&hash, &id);
            let Some(data) = txn.get(payloads, &key)? else {
                let hash = stored_hash(&id, &hash)?;
                error!(
                    namespace = %self.name(),
                    id = %hex::encode(&id),
                    hash = %hash,
                    "pending entry has no payload; aborting apply"
                );
                return Err(DiffError::MissingPayload { id, hash });
            };

            if let Err(e) = f(&id, &Payload::new(&data)) {
                let error: Box<dyn Error + Send + Sync> = e.into();
                warn!(
                    namespace = %self.name(),
                    id = %hex::encode(&id),
                    error = %error,
                    "apply callback failed; entry stays pending"
                );
                report.failures.push(ApplyFailure { id, error });
                continue;
            }

            txn.put(committed, &id, &hash)?;
            txn.delete(pending, &id)?;
            txn.delete(payloads, &key)?;
            report.promoted += 1;

            if limit > 0 && report.promoted == limit {
                break;
            }
        }

        txn.commit()?;

        info!(
            namespace = %self.name(),
            promoted = report.promoted,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "apply finished"
        );

        if report.is_clean() {
            Ok(report.promoted)
        } else {
            Err(DiffError::Apply(report))
        }
    }
}
