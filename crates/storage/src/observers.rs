//! Commit observer registry
//!
//! Observers are invoked on the committing thread after the store has
//! released its locks. A panicking observer is logged and skipped; it never
//! fails the commit that triggered it.

use ledger_core::{CommitObserver, Subscription, TransactionData};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::error;

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    observers: RwLock<FxHashMap<u64, CommitObserver>>,
}

/// Set of registered commit observers
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    inner: Arc<RegistryInner>,
}

impl ObserverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` until the returned subscription is dropped
    pub fn subscribe(&self, observer: CommitObserver) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.observers.write().insert(id, observer);

        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        Subscription::new(id, move || {
            if let Some(inner) = registry.upgrade() {
                inner.observers.write().remove(&id);
            }
        })
    }

    /// Deliver one commit event to every observer
    pub fn notify(&self, committed: &Arc<TransactionData>) {
        // Snapshot so observers may (un)subscribe from inside the callback.
        let observers: Vec<CommitObserver> =
            self.inner.observers.read().values().cloned().collect();
        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(committed))).is_err() {
                error!(
                    target: "ledger::store",
                    id = %committed.id,
                    revision = committed.revision,
                    "Commit observer panicked"
                );
            }
        }
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.inner.observers.read().len()
    }

    /// Whether no observer is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}
