//! Exclusive checkout of a single shared resource.
//!
//! Used for writer admission: whoever holds the [`Checkout`] is the only
//! writer. The checkout owns the resource outright, so a transaction built
//! on it is `Send + 'static` and can live across `.await` points.

use std::sync::{Arc, Condvar, Mutex};

use crate::error::{StoreError, StoreResult};

pub(crate) struct ExclusiveSlot<T> {
    item: Mutex<Option<T>>,
    returned: Condvar,
}

impl<T> ExclusiveSlot<T> {
    pub(crate) fn new(item: T) -> Arc<Self> {
        Arc::new(Self {
            item: Mutex::new(Some(item)),
            returned: Condvar::new(),
        })
    }

    /// Take the resource, blocking while another holder has it.
    pub(crate) fn checkout(self: &Arc<Self>) -> StoreResult<Checkout<T>> {
        let mut guard = self
            .item
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        loop {
            if let Some(item) = guard.take() {
                return Ok(Checkout {
                    item: Some(item),
                    slot: Arc::clone(self),
                });
            }
            guard = self
                .returned
                .wait(guard)
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        }
    }
}

/// The checked-out resource. Returned to its slot on drop.
pub(crate) struct Checkout<T> {
    item: Option<T>,
    slot: Arc<ExclusiveSlot<T>>,
}

impl<T> Checkout<T> {
    /// The held resource. Only empty once the checkout is being dropped.
    pub(crate) fn get(&self) -> StoreResult<&T> {
        self.item.as_ref().ok_or(StoreError::TransactionClosed)
    }
}

impl<T> Drop for Checkout<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            let mut guard = match self.slot.item.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *guard = Some(item);
            drop(guard);
            self.slot.returned.notify_one();
        }
    }
}
