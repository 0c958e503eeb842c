//! In-memory `TransactionStore`
//!
//! # Design
//!
//! - `slots`: DashMap of id -> `TransactionSlot` (chain + per-id lock).
//!   Slots are never removed; the ledger is append-only.
//! - `expiry`: the coarse commit lock. Its mutex guards the `ExpiryIndex`
//!   and serialises every `create`/`commit_delta`; its condvar is the wake
//!   signal for `get_expiring_transactions`.
//! - `parents`: parent id -> child ids.
//! - `observers`: commit fan-out, invoked after every lock is released, so
//!   two threads committing back to back may notify out of revision order.
//!
//! Lock order is commit mutex, then DashMap shard, then slot chain. Nothing
//! takes the commit mutex while holding a shard or chain lock.

use crate::expiry::ExpiryIndex;
use crate::index::ParentIndex;
use crate::lock::LockOutcome;
use crate::observers::ObserverRegistry;
use crate::slot::TransactionSlot;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ledger_core::{
    CancellationToken, CommitObserver, LedgerError, LedgerResult, LockFlags, StoreStats,
    Subscription, Timestamp, TransactionData, TransactionId, TransactionPredicate,
    TransactionQuery, TransactionState, TransactionStore, GENESIS_REVISION,
};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

struct ExpiryMonitor {
    index: Mutex<ExpiryIndex>,
    changed: Condvar,
}

impl ExpiryMonitor {
    fn wake_all(&self) {
        let _index = self.index.lock();
        self.changed.notify_all();
    }
}

/// One-shot rendezvous used by `wait_for`
#[derive(Default)]
struct Waiter {
    matched: Mutex<Option<Arc<TransactionData>>>,
    done: Condvar,
}

impl Waiter {
    fn offer(&self, tx: &Arc<TransactionData>) {
        let mut matched = self.matched.lock();
        if matched.is_none() {
            *matched = Some(Arc::clone(tx));
            self.done.notify_all();
        }
    }

    fn wake(&self) {
        let _matched = self.matched.lock();
        self.done.notify_all();
    }
}

/// Volatile reference implementation of [`TransactionStore`]
pub struct MemoryStore {
    slots: DashMap<TransactionId, Arc<TransactionSlot>>,
    expiry: Arc<ExpiryMonitor>,
    parents: ParentIndex,
    observers: ObserverRegistry,
    chains: AtomicUsize,
    revisions: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
            expiry: Arc::new(ExpiryMonitor {
                index: Mutex::new(ExpiryIndex::new()),
                changed: Condvar::new(),
            }),
            parents: ParentIndex::new(),
            observers: ObserverRegistry::new(),
            chains: AtomicUsize::new(0),
            revisions: AtomicUsize::new(0),
        }
    }

    /// Earliest pending expiry, if any
    pub fn next_expiry(&self) -> Option<Timestamp> {
        self.expiry.index.lock().nearest()
    }

    fn slot(&self, id: TransactionId) -> Option<Arc<TransactionSlot>> {
        self.slots.get(&id).map(|slot| Arc::clone(&slot))
    }

    fn head(&self, id: TransactionId) -> Option<Arc<TransactionData>> {
        self.slot(id).and_then(|slot| slot.head())
    }

    fn acquire(
        &self,
        id: TransactionId,
        flags: LockFlags,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> LedgerResult<LockOutcome> {
        let slot = if flags.contains(LockFlags::CREATE) {
            let slot = self
                .slots
                .entry(id)
                .or_insert_with(|| Arc::new(TransactionSlot::placeholder(id)));
            Arc::clone(&slot)
        } else {
            self.slot(id).ok_or(LedgerError::not_found(id))?
        };
        Ok(slot.lock().acquire(timeout, cancel))
    }

    /// Re-index `id` after its head moved from `before` to `after`.
    ///
    /// Returns whether waiters must be woken: the nearest expiry decreased
    /// or the index went from empty to non-empty.
    fn reindex(
        index: &mut ExpiryIndex,
        id: TransactionId,
        before: Option<Timestamp>,
        after: Option<Timestamp>,
    ) -> bool {
        let nearest = index.nearest();
        if let Some(at) = before {
            index.remove(at, id);
        }
        if let Some(at) = after {
            index.insert(at, id);
        }
        match (nearest, index.nearest()) {
            (None, Some(_)) => true,
            (Some(old), Some(new)) => new < old,
            _ => false,
        }
    }

    fn committed(&self, data: &Arc<TransactionData>) {
        self.revisions.fetch_add(1, Ordering::Relaxed);
        self.observers.notify(data);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("chains", &self.chains.load(Ordering::Relaxed))
            .field("revisions", &self.revisions.load(Ordering::Relaxed))
            .finish()
    }
}

impl TransactionStore for MemoryStore {
    fn lock(
        &self,
        id: TransactionId,
        flags: LockFlags,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> LedgerResult<()> {
        match self.acquire(id, flags, timeout, cancel)? {
            LockOutcome::Acquired => Ok(()),
            LockOutcome::TimedOut => Err(LedgerError::Timeout {
                operation: "lock",
                after: timeout.unwrap_or_default(),
            }),
            LockOutcome::Cancelled => Err(LedgerError::Cancelled { operation: "lock" }),
        }
    }

    fn try_lock(
        &self,
        id: TransactionId,
        flags: LockFlags,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> LedgerResult<bool> {
        match self.acquire(id, flags, timeout, cancel)? {
            LockOutcome::Acquired => Ok(true),
            LockOutcome::TimedOut => Ok(false),
            LockOutcome::Cancelled => Err(LedgerError::Cancelled { operation: "lock" }),
        }
    }

    fn free(&self, id: TransactionId) -> LedgerResult<()> {
        let slot = self.slot(id).ok_or(LedgerError::not_found(id))?;
        if !slot.lock().release() {
            warn!(target: "ledger::store", %id, "free called on an unlocked transaction");
        }
        Ok(())
    }

    fn is_locked(&self, id: TransactionId) -> bool {
        self.slot(id).map(|slot| slot.lock().is_held()).unwrap_or(false)
    }

    fn exists(&self, id: TransactionId) -> bool {
        self.slot(id).map(|slot| !slot.is_placeholder()).unwrap_or(false)
    }

    fn fetch(&self, id: TransactionId, revision: Option<u64>) -> LedgerResult<Arc<TransactionData>> {
        let slot = self.slot(id).ok_or(LedgerError::not_found(id))?;
        let head = slot.head().ok_or(LedgerError::not_found(id))?;
        match revision {
            None => Ok(head),
            Some(revision) if revision == head.revision => Ok(head),
            Some(revision) => slot.revision(revision).ok_or(LedgerError::RevisionNotFound {
                id,
                revision,
                head: head.revision,
            }),
        }
    }

    fn create(&self, data: TransactionData) -> LedgerResult<Arc<TransactionData>> {
        if data.revision != GENESIS_REVISION {
            return Err(LedgerError::invalid_argument(format!(
                "create expects revision {} for {}, got {}",
                GENESIS_REVISION, data.id, data.revision
            )));
        }
        let id = data.id;
        let data = Arc::new(data);

        let wake = {
            let mut index = self.expiry.index.lock();
            let slot = match self.slots.entry(id) {
                Entry::Occupied(entry) => {
                    let slot = Arc::clone(entry.get());
                    if !slot.is_placeholder() {
                        return Err(LedgerError::AlreadyExists { id });
                    }
                    slot
                }
                Entry::Vacant(entry) => {
                    Arc::clone(entry.insert(Arc::new(TransactionSlot::placeholder(id))).value())
                }
            };
            slot.append(Arc::clone(&data));
            if let Some(parent) = data.parent {
                self.parents.insert(parent.id, id);
            }
            self.chains.fetch_add(1, Ordering::Relaxed);
            let wake = Self::reindex(&mut index, id, None, data.pending_expiry());
            if wake {
                self.expiry.changed.notify_all();
            }
            wake
        };

        debug!(target: "ledger::store", %id, wake, "Created transaction");
        self.committed(&data);
        Ok(data)
    }

    fn commit_delta(
        &self,
        original: &TransactionData,
        next: TransactionData,
    ) -> LedgerResult<Arc<TransactionData>> {
        let id = original.id;
        if next.id != id {
            return Err(LedgerError::invalid_argument(format!(
                "delta for {} cannot extend chain {}",
                next.id, id
            )));
        }
        if original.revision.checked_add(1) != Some(next.revision) {
            return Err(LedgerError::invalid_argument(format!(
                "revision {} does not follow {} on {}",
                next.revision, original.revision, id
            )));
        }
        let slot = self.slot(id).ok_or(LedgerError::not_found(id))?;
        let next = Arc::new(next);

        let wake = {
            let mut index = self.expiry.index.lock();
            let head = slot.head().ok_or(LedgerError::not_found(id))?;
            if head.revision != original.revision {
                debug!(
                    target: "ledger::store",
                    %id,
                    expected = original.revision,
                    actual = head.revision,
                    "Commit rejected"
                );
                return Err(LedgerError::Conflict {
                    id,
                    expected: original.revision,
                    actual: head.revision,
                });
            }
            slot.append(Arc::clone(&next));
            self.parents.relink(
                id,
                head.parent.map(|p| p.id),
                next.parent.map(|p| p.id),
            );
            let wake = Self::reindex(&mut index, id, head.pending_expiry(), next.pending_expiry());
            if wake {
                self.expiry.changed.notify_all();
            }
            wake
        };

        trace!(target: "ledger::store", %id, revision = next.revision, wake, "Committed delta");
        self.committed(&next);
        Ok(next)
    }

    fn get_chain(&self, id: TransactionId) -> LedgerResult<Vec<Arc<TransactionData>>> {
        let chain = self.slot(id).map(|slot| slot.chain()).unwrap_or_default();
        if chain.is_empty() {
            return Err(LedgerError::not_found(id));
        }
        Ok(chain)
    }

    fn get_child_transactions(
        &self,
        id: TransactionId,
        states: &[TransactionState],
    ) -> Vec<Arc<TransactionData>> {
        self.parents
            .children(id)
            .into_iter()
            .filter_map(|child| self.head(child))
            .filter(|head| head.parent.map(|p| p.id) == Some(id))
            .filter(|head| states.is_empty() || states.contains(&head.state))
            .collect()
    }

    fn get_expiring_transactions(
        &self,
        now: Timestamp,
        cancel: &CancellationToken,
    ) -> LedgerResult<Vec<Arc<TransactionData>>> {
        let started = Instant::now();
        let monitor = Arc::clone(&self.expiry);
        let _registration = cancel.on_cancel(move || monitor.wake_all());

        loop {
            let snapshot = {
                let mut index = self.expiry.index.lock();
                loop {
                    if cancel.is_cancelled() {
                        return Ok(Vec::new());
                    }
                    let effective = now.saturating_add(started.elapsed());
                    match index.nearest() {
                        None => self.expiry.changed.wait(&mut index),
                        Some(at) if at > effective => {
                            let _ = self.expiry.changed.wait_for(&mut index, effective.until(at));
                        }
                        Some(_) => break index.snapshot(),
                    }
                }
            };

            // Searched without the commit lock; heads are re-checked below.
            let effective = now.saturating_add(started.elapsed());
            let due: Vec<Arc<TransactionData>> = snapshot
                .due(effective)
                .iter()
                .filter_map(|entry| self.head(entry.id))
                .filter(|head| head.is_due(effective))
                .collect();

            if !due.is_empty() {
                trace!(target: "ledger::store", count = due.len(), "Expiring transactions");
                return Ok(due);
            }
        }
    }

    fn wait_for(
        &self,
        predicate: TransactionPredicate,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> LedgerResult<Option<Arc<TransactionData>>> {
        let waiter = Arc::new(Waiter::default());

        let observer: CommitObserver = {
            let waiter = Arc::clone(&waiter);
            Arc::new(move |tx: &Arc<TransactionData>| {
                if predicate(tx) {
                    waiter.offer(tx);
                }
            })
        };
        let _subscription = self.observers.subscribe(observer);
        let _registration = {
            let waiter = Arc::clone(&waiter);
            cancel.on_cancel(move || waiter.wake())
        };

        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut matched = waiter.matched.lock();
        loop {
            if let Some(tx) = matched.take() {
                return Ok(Some(tx));
            }
            if cancel.is_cancelled() {
                return Err(LedgerError::Cancelled {
                    operation: "wait_for",
                });
            }
            match deadline {
                None => waiter.done.wait(&mut matched),
                Some(deadline) => {
                    if waiter.done.wait_until(&mut matched, deadline).timed_out() {
                        return Ok(matched.take());
                    }
                }
            }
        }
    }

    fn query(&self) -> TransactionQuery {
        let heads = self
            .slots
            .iter()
            .filter_map(|slot| slot.value().head())
            .collect();
        TransactionQuery::new(heads)
    }

    fn subscribe(&self, observer: CommitObserver) -> Subscription {
        self.observers.subscribe(observer)
    }

    fn len(&self) -> usize {
        self.chains.load(Ordering::Relaxed)
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            chains: self.chains.load(Ordering::Relaxed),
            revisions: self.revisions.load(Ordering::Relaxed),
            pending_expiries: self.expiry.index.lock().len(),
            locked: self
                .slots
                .iter()
                .filter(|slot| slot.value().lock().is_held())
                .count(),
        }
    }
}
