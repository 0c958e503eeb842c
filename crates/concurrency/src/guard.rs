//! RAII lock ownership
//!
//! `lock` and `free` are separate store calls. `TransactionLock` pairs
//! them so the lock is released on every exit path, including `?` returns
//! and panics.

use crate::factory::{DeltaKind, TransactionFactory};
use crate::transaction::Transaction;
use ledger_core::{
    CancellationToken, LedgerResult, LockFlags, TransactionId, TransactionMutableData,
    TransactionStore,
};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Held lock on one transaction id; released on drop
#[must_use = "dropping the guard releases the lock"]
pub struct TransactionLock {
    store: Arc<dyn TransactionStore>,
    id: TransactionId,
    held: bool,
}

impl TransactionLock {
    /// Block until the lock for `id` is held
    ///
    /// # Errors
    ///
    /// Whatever `TransactionStore::lock` reports: `NotFound`, `Timeout` or
    /// `Cancelled`.
    pub fn acquire(
        store: Arc<dyn TransactionStore>,
        id: TransactionId,
        flags: LockFlags,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> LedgerResult<Self> {
        store.lock(id, flags, timeout, cancel)?;
        Ok(Self {
            store,
            id,
            held: true,
        })
    }

    /// Take the lock if it frees up within `timeout`, `Ok(None)` otherwise
    pub fn try_acquire(
        store: Arc<dyn TransactionStore>,
        id: TransactionId,
        flags: LockFlags,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> LedgerResult<Option<Self>> {
        if !store.try_lock(id, flags, timeout, cancel)? {
            return Ok(None);
        }
        Ok(Some(Self {
            store,
            id,
            held: true,
        }))
    }

    /// Locked id
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Release now, surfacing the store's error
    pub fn release(mut self) -> LedgerResult<()> {
        self.held = false;
        self.store.free(self.id)
    }
}

impl Drop for TransactionLock {
    fn drop(&mut self) {
        if !self.held {
            return;
        }
        if let Err(e) = self.store.free(self.id) {
            warn!(target: "ledger::txn", id = %self.id, error = %e, "Failed to release lock");
        }
    }
}

impl fmt::Debug for TransactionLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionLock")
            .field("id", &self.id)
            .field("held", &self.held)
            .finish()
    }
}

/// A transaction whose lock the caller owns
///
/// Derefs to the current [`Transaction`]; `apply` advances it in place.
pub struct LockedTransaction {
    transaction: Transaction,
    lock: TransactionLock,
    factory: TransactionFactory,
}

impl LockedTransaction {
    pub(crate) fn new(
        transaction: Transaction,
        lock: TransactionLock,
        factory: TransactionFactory,
    ) -> Self {
        Self {
            transaction,
            lock,
            factory,
        }
    }

    /// Current revision held by this handle
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Commit `patch` as the next revision and advance this handle
    pub fn apply(&mut self, patch: &TransactionMutableData) -> LedgerResult<&Transaction> {
        let next = self
            .factory
            .create_delta(&self.transaction, patch, DeltaKind::Revision)?;
        self.transaction = next;
        Ok(&self.transaction)
    }

    /// Commit an expiring revision (see [`TransactionFactory::expire`])
    pub fn expire(&mut self, patch: &TransactionMutableData) -> LedgerResult<&Transaction> {
        let next = self.factory.expire(&self.transaction, patch)?;
        self.transaction = next;
        Ok(&self.transaction)
    }

    /// Start a child chain parented to the current revision
    pub fn create_child(&self, child: &TransactionMutableData) -> LedgerResult<Transaction> {
        self.factory.create_child(&self.transaction, child)
    }

    /// Release the lock, keeping the last revision
    pub fn unlock(self) -> LedgerResult<Transaction> {
        let Self {
            transaction, lock, ..
        } = self;
        lock.release()?;
        Ok(transaction)
    }
}

impl Deref for LockedTransaction {
    type Target = Transaction;

    fn deref(&self) -> &Transaction {
        &self.transaction
    }
}

impl fmt::Debug for LockedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockedTransaction")
            .field("transaction", &self.transaction)
            .field("lock", &self.lock)
            .finish()
    }
}
