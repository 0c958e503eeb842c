//! The storage contract
//!
//! `TransactionStore` is the capability set every storage engine provides.
//! Upper layers (the delta/factory layer, the processor, API and script
//! subsystems) only talk to a store through this trait, so an in-memory
//! engine and a durable one are interchangeable.
//!
//! Thread safety: all methods must be safe to call concurrently from
//! multiple threads (requires Send + Sync). Operations on distinct ids never
//! block each other except for the brief commit critical section.

use std::ops::BitOr;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::error::LedgerResult;
use crate::observer::{CommitObserver, Subscription};
use crate::query::{TransactionPredicate, TransactionQuery};
use crate::timestamp::Timestamp;
use crate::transaction::TransactionData;
use crate::types::{TransactionId, TransactionState};

/// Options for `lock` / `try_lock`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LockFlags(u8);

impl LockFlags {
    /// Lock an existing chain only
    pub const NONE: LockFlags = LockFlags(0);
    /// Create a placeholder slot when the id is absent
    pub const CREATE: LockFlags = LockFlags(1);

    /// Whether every flag in `other` is set
    pub const fn contains(&self, other: LockFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for LockFlags {
    type Output = LockFlags;

    fn bitor(self, rhs: LockFlags) -> LockFlags {
        LockFlags(self.0 | rhs.0)
    }
}

/// Point-in-time counters describing a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Chains with at least one revision
    pub chains: usize,
    /// Revisions across every chain
    pub revisions: usize,
    /// Heads currently waiting in the expiry index
    pub pending_expiries: usize,
    /// Ids whose lock is held
    pub locked: usize,
}

/// Storage contract for the transaction ledger
pub trait TransactionStore: Send + Sync {
    /// Acquire the exclusive lock for `id`
    ///
    /// With [`LockFlags::CREATE`] an absent id gets a placeholder slot first.
    /// `timeout = None` waits without bound.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id is absent and creation was not requested,
    /// `Timeout` when the bound elapses, `Cancelled` on cancellation.
    fn lock(
        &self,
        id: TransactionId,
        flags: LockFlags,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> LedgerResult<()>;

    /// Like [`lock`](Self::lock) but reports a timeout as `Ok(false)`
    fn try_lock(
        &self,
        id: TransactionId,
        flags: LockFlags,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> LedgerResult<bool>;

    /// Release the lock for `id`
    ///
    /// Must be paired with a successful `lock`/`try_lock`.
    fn free(&self, id: TransactionId) -> LedgerResult<()>;

    /// Non-blocking check of the lock for `id`
    fn is_locked(&self, id: TransactionId) -> bool;

    /// Whether a chain exists for `id`
    fn exists(&self, id: TransactionId) -> bool;

    /// Snapshot at `revision`, or the head when `None`
    ///
    /// # Errors
    ///
    /// `NotFound` for an absent id, `RevisionNotFound` for a revision past
    /// the head.
    fn fetch(&self, id: TransactionId, revision: Option<u64>) -> LedgerResult<Arc<TransactionData>>;

    /// Insert the genesis revision of a new chain
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the id already has a chain, `InvalidArgument` if
    /// `data` is not a genesis revision.
    fn create(&self, data: TransactionData) -> LedgerResult<Arc<TransactionData>>;

    /// Append `next` as the new head of `original`'s chain
    ///
    /// Succeeds iff `next.id == original.id`,
    /// `next.revision == original.revision + 1` and `original` is still the
    /// head. This is the only mutation primitive after genesis.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` on id mismatch or a non-contiguous revision,
    /// `NotFound` if the chain is absent, `Conflict` if another writer
    /// advanced the chain first.
    fn commit_delta(
        &self,
        original: &TransactionData,
        next: TransactionData,
    ) -> LedgerResult<Arc<TransactionData>>;

    /// Full revision history of `id`, oldest first
    fn get_chain(&self, id: TransactionId) -> LedgerResult<Vec<Arc<TransactionData>>>;

    /// Heads whose parent chain is `id` and whose state is in `states`
    ///
    /// An empty `states` slice matches every state.
    fn get_child_transactions(
        &self,
        id: TransactionId,
        states: &[TransactionState],
    ) -> Vec<Arc<TransactionData>>;

    /// Heads due for re-evaluation
    ///
    /// Blocks until at least one head may have `expires <= now` (with `now`
    /// advanced by the time spent waiting), then returns every such head
    /// whose `expired` is unset, in no particular order. Returns an empty
    /// vector when `cancel` fires.
    fn get_expiring_transactions(
        &self,
        now: Timestamp,
        cancel: &CancellationToken,
    ) -> LedgerResult<Vec<Arc<TransactionData>>>;

    /// Next committed revision matching `predicate`
    ///
    /// `Ok(None)` when `timeout` elapses without a match.
    ///
    /// # Errors
    ///
    /// `Cancelled` when `cancel` fires first.
    fn wait_for(
        &self,
        predicate: TransactionPredicate,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> LedgerResult<Option<Arc<TransactionData>>>;

    /// Filterable view over every head
    fn query(&self) -> TransactionQuery;

    /// Register a commit observer
    ///
    /// Each commit is delivered exactly once; cross-thread delivery order
    /// is not guaranteed (see [`CommitObserver`]).
    fn subscribe(&self, observer: CommitObserver) -> Subscription;

    /// Number of chains
    fn len(&self) -> usize;

    /// Whether the store holds no chains
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time counters
    fn stats(&self) -> StoreStats;
}
