//! Transaction factory
//!
//! Every mutation after genesis goes through [`TransactionFactory::create_delta`]:
//! the patch is merged over a copy of the caller's snapshot and committed
//! with `commit_delta`. That call is the optimistic-concurrency boundary;
//! if another writer advanced the chain first the caller gets `Conflict`
//! and must start again from a fresh fetch.
//!
//! # Defaults applied to every delta
//!
//! - `revision = snapshot.revision + 1`
//! - `created = now`
//! - `expires = now` unless the patch sets or clears it, so every change is
//!   re-evaluated by the processor
//! - `expired` cleared

use crate::guard::{LockedTransaction, TransactionLock};
use crate::retry::RetryConfig;
use crate::transaction::Transaction;
use ledger_core::{
    CancellationToken, LedgerError, LedgerResult, LockFlags, Timestamp, TransactionData,
    TransactionId, TransactionMutableData, TransactionStore,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Lock timeout used when neither the factory nor the caller sets one
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

/// How a delta relates to the snapshot it was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeltaKind {
    /// Next revision of the same chain
    Revision,
    /// Genesis of a new chain parented to the snapshot
    NewChild,
}

/// Helper operations over any [`TransactionStore`]
#[derive(Clone)]
pub struct TransactionFactory {
    store: Arc<dyn TransactionStore>,
    lock_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl TransactionFactory {
    /// Factory with the default lock timeout
    pub fn new(store: Arc<dyn TransactionStore>) -> Self {
        Self {
            store,
            lock_timeout: Some(DEFAULT_LOCK_TIMEOUT),
            cancel: CancellationToken::new(),
        }
    }

    /// Lock timeout for calls that do not pass one (`None` = wait forever)
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Token that aborts lock waits started through this factory
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Backing store
    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.store
    }

    /// Configured lock timeout
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout
    }

    /// Wrap a committed record in a handle bound to this factory's store
    pub fn wrap(&self, data: Arc<TransactionData>) -> Transaction {
        Transaction::new(data, Arc::clone(&self.store))
    }

    /// Fetch a revision (the head when `None`) without locking
    pub fn fetch(&self, id: TransactionId, revision: Option<u64>) -> LedgerResult<Transaction> {
        Ok(self.wrap(self.store.fetch(id, revision)?))
    }

    /// Create a new chain and return it locked
    ///
    /// The genesis is `Initialized` with an empty payload and no expiry. A
    /// fresh id is generated when `id` is `None`.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if `id` already has a chain; lock errors as-is.
    pub fn start_transaction(&self, id: Option<TransactionId>) -> LedgerResult<LockedTransaction> {
        let id = id.unwrap_or_default();
        // An existing chain must not make the caller sit out its holder's lock.
        if self.store.exists(id) {
            return Err(LedgerError::AlreadyExists { id });
        }
        // Lock first so nobody else can take the new chain between create and lock.
        let lock = TransactionLock::acquire(
            Arc::clone(&self.store),
            id,
            LockFlags::CREATE,
            self.lock_timeout,
            &self.cancel,
        )
        .map_err(|e| {
            if e.is_timeout() && self.store.exists(id) {
                LedgerError::AlreadyExists { id }
            } else {
                e
            }
        })?;
        let genesis = TransactionData::genesis(id).with_created(Timestamp::now());
        let created = self.store.create(genesis)?;
        debug!(target: "ledger::txn", %id, "Started transaction");
        Ok(LockedTransaction::new(self.wrap(created), lock, self.clone()))
    }

    /// Lock an existing chain and fetch it
    ///
    /// Fetches the head, or `revision` when given. `timeout` overrides the
    /// factory's lock timeout. The lock is released if the fetch fails.
    ///
    /// # Errors
    ///
    /// `NotFound`, `RevisionNotFound`, `Timeout` and `Cancelled` surface
    /// unchanged.
    pub fn continue_transaction(
        &self,
        id: TransactionId,
        revision: Option<u64>,
        timeout: Option<Duration>,
    ) -> LedgerResult<LockedTransaction> {
        let lock = TransactionLock::acquire(
            Arc::clone(&self.store),
            id,
            LockFlags::NONE,
            timeout.or(self.lock_timeout),
            &self.cancel,
        )?;
        let data = self.store.fetch(id, revision)?;
        Ok(LockedTransaction::new(self.wrap(data), lock, self.clone()))
    }

    fn next_revision(transaction: &Transaction) -> LedgerResult<u64> {
        transaction.revision().checked_add(1).ok_or_else(|| {
            LedgerError::invalid_argument(format!("revision overflow on {}", transaction.id()))
        })
    }

    /// Commit `patch` relative to `transaction`
    ///
    /// # Errors
    ///
    /// `Conflict` if `transaction` is no longer the head (only for
    /// [`DeltaKind::Revision`]); any other store error unchanged.
    pub fn create_delta(
        &self,
        transaction: &Transaction,
        patch: &TransactionMutableData,
        kind: DeltaKind,
    ) -> LedgerResult<Transaction> {
        let now = Timestamp::now();
        let committed = match kind {
            DeltaKind::Revision => {
                let mut next = transaction
                    .data()
                    .merge(patch, Self::next_revision(transaction)?, now);
                if patch.expires.is_none() {
                    next.expires = Some(now);
                }
                self.commit(transaction, next)?
            }
            DeltaKind::NewChild => {
                let mut child = TransactionData::genesis(TransactionId::new())
                    .with_created(now)
                    .with_parent(transaction.revision_ref());
                patch.apply_to(&mut child);
                if patch.expires.is_none() {
                    child.expires = Some(now);
                }
                let child = self.store.create(child)?;
                debug!(
                    target: "ledger::txn",
                    id = %child.id,
                    parent = %transaction.revision_ref(),
                    "Created child transaction"
                );
                child
            }
        };
        Ok(self.wrap(committed))
    }

    /// Start a new chain parented to `parent`
    pub fn create_child(
        &self,
        parent: &Transaction,
        child: &TransactionMutableData,
    ) -> LedgerResult<Transaction> {
        self.create_delta(parent, child, DeltaKind::NewChild)
    }

    /// Commit `patch` and consume the pending expiry
    ///
    /// Like a [`DeltaKind::Revision`] delta, except `expires` is always
    /// cleared and `expired` records the instant that was consumed.
    pub fn expire(
        &self,
        transaction: &Transaction,
        patch: &TransactionMutableData,
    ) -> LedgerResult<Transaction> {
        let now = Timestamp::now();
        let mut next = transaction
            .data()
            .merge(patch, Self::next_revision(transaction)?, now);
        next.expires = None;
        next.expired = Some(transaction.expires().unwrap_or(now));
        Ok(self.wrap(self.commit(transaction, next)?))
    }

    fn commit(
        &self,
        transaction: &Transaction,
        next: TransactionData,
    ) -> LedgerResult<Arc<TransactionData>> {
        match self.store.commit_delta(transaction.data(), next) {
            Ok(committed) => {
                debug!(
                    target: "ledger::txn",
                    id = %committed.id,
                    revision = committed.revision,
                    state = %committed.state,
                    "Committed delta"
                );
                Ok(committed)
            }
            Err(e) => {
                if e.is_conflict() {
                    debug!(target: "ledger::txn", id = %transaction.id(), error = %e, "Delta conflicted");
                }
                Err(e)
            }
        }
    }

    /// Read-modify-write with retry on conflict
    ///
    /// Fetches the head, builds a patch with `f`, and commits it as a
    /// revision delta. On `Conflict` the whole cycle restarts after an
    /// exponential backoff, up to `retry.max_retries` times. Errors from `f`
    /// and non-conflict store errors are returned immediately. A backoff cut
    /// short by the factory's cancellation token returns `Cancelled`.
    pub fn update_with_retry<F>(
        &self,
        id: TransactionId,
        retry: &RetryConfig,
        mut f: F,
    ) -> LedgerResult<Transaction>
    where
        F: FnMut(&Transaction) -> LedgerResult<TransactionMutableData>,
    {
        let mut attempt = 0;
        loop {
            let current = self.fetch(id, None)?;
            let patch = f(&current)?;
            match self.create_delta(&current, &patch, DeltaKind::Revision) {
                Err(e) if e.is_conflict() && retry.allows(attempt) => {
                    let delay = retry.backoff(attempt);
                    debug!(
                        target: "ledger::txn",
                        %id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying after conflict"
                    );
                    if self.cancel.sleep(delay) {
                        return Err(LedgerError::Cancelled {
                            operation: "update_with_retry",
                        });
                    }
                    attempt += 1;
                }
                Err(e) if e.is_conflict() => {
                    warn!(target: "ledger::txn", %id, attempts = attempt + 1, "Giving up after conflicts");
                    return Err(e);
                }
                other => return other,
            }
        }
    }
}

impl fmt::Debug for TransactionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionFactory")
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}
