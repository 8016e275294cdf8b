//! Staging a batch of objects in a single transaction.
//!
//! Both entry points are all-or-nothing: the batch commits only when the
//! input ends normally. Cancellation or any staging error discards every
//! object staged in the run.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ddb_store::{update, WriteTxn};

use crate::differential::Differential;
use crate::error::{DiffError, DiffResult};
use crate::object::Object;

impl Differential {
    /// Stage objects received from `rx` until a `None` sentinel arrives or
    /// every sender is dropped, then commit them together.
    ///
    /// Between items the loop waits for either the next message or
    /// `cancel`, whichever comes first; an item already received is always
    /// staged completely. On cancellation the batch is rolled back and
    /// [`DiffError::Cancelled`] is returned. Returns the number of objects
    /// that were updated.
    ///
    /// Writer admission, each stage, the commit and any rollback touch the
    /// store synchronously, so all of them run on the blocking pool. The
    /// async worker only waits on the channel and the token.
    pub async fn stage_stream<T>(
        &self,
        rx: &mut mpsc::Receiver<Option<T>>,
        cancel: &CancellationToken,
    ) -> DiffResult<usize>
    where
        T: Object + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let mut txn = spawn_blocking(move || store.begin_write()).await??;

        let mut updated = 0;
        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.discard(txn, "cancelled").await;
                    return Err(DiffError::Cancelled);
                }
                received = rx.recv() => received,
            };

            // A closed channel ends the batch like the sentinel does.
            let Some(Some(obj)) = received else {
                break;
            };

            let diff = self.clone();
            let (returned, staged) = spawn_blocking(move || {
                let staged = diff.stage_in(&mut *txn, &obj);
                (txn, staged)
            })
            .await?;
            txn = returned;

            match staged {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => {
                    self.discard(txn, "staging failed").await;
                    return Err(e);
                }
            }
        }

        spawn_blocking(move || txn.commit()).await??;
        debug!(namespace = %self.name(), updated, "committed streamed batch");
        Ok(updated)
    }

    /// Stage every object from `items` in one transaction.
    ///
    /// `cancel` is checked before each object. Cancellation or a staging
    /// error rolls the whole batch back. Returns the number of objects that
    /// were updated.
    pub fn stage_all<I>(&self, items: I, cancel: &CancellationToken) -> DiffResult<usize>
    where
        I: IntoIterator,
        I::Item: Object,
    {
        update(&*self.store, |txn| {
            let mut updated = 0;
            for obj in items {
                if cancel.is_cancelled() {
                    debug!(namespace = %self.name(), "batch cancelled; rolling back");
                    return Err(DiffError::Cancelled);
                }
                if self.stage_in(txn, &obj)? {
                    updated += 1;
                }
            }
            Ok(updated)
        })
    }

    async fn discard(&self, txn: Box<dyn WriteTxn>, reason: &str) {
        debug!(namespace = %self.name(), reason, "discarding streamed batch");
        match spawn_blocking(move || txn.rollback()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(namespace = %self.name(), error = %e, "rollback of streamed batch failed");
            }
            Err(e) => {
                warn!(namespace = %self.name(), error = %e, "rollback task of streamed batch failed");
            }
        }
    }
}
