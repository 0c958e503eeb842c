//! Secondary index: parent chain -> child chains
//!
//! Enables `get_child_transactions` without scanning every chain. An entry
//! is added when a child's genesis (or a later revision) names a parent and
//! removed when a later revision moves the child to another parent or
//! clears its parent link.

use dashmap::DashMap;
use ledger_core::TransactionId;
use rustc_hash::FxHashSet;

/// Secondary index: parent id -> child ids
#[derive(Debug, Default)]
pub struct ParentIndex {
    index: DashMap<TransactionId, FxHashSet<TransactionId>>,
}

impl ParentIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `child` under `parent`
    pub fn insert(&self, parent: TransactionId, child: TransactionId) {
        self.index.entry(parent).or_default().insert(child);
    }

    /// Drop `child` from `parent`'s set
    ///
    /// Empty sets are removed so the map does not accumulate dead parents.
    pub fn remove(&self, parent: TransactionId, child: TransactionId) {
        let now_empty = match self.index.get_mut(&parent) {
            Some(mut children) => {
                children.remove(&child);
                children.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.index.remove_if(&parent, |_, children| children.is_empty());
        }
    }

    /// Move `child` between parents after a revision changed its link
    pub fn relink(
        &self,
        child: TransactionId,
        before: Option<TransactionId>,
        after: Option<TransactionId>,
    ) {
        if before == after {
            return;
        }
        if let Some(parent) = before {
            self.remove(parent, child);
        }
        if let Some(parent) = after {
            self.insert(parent, child);
        }
    }

    /// Child ids currently recorded for `parent`
    pub fn children(&self, parent: TransactionId) -> Vec<TransactionId> {
        self.index
            .get(&parent)
            .map(|children| children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of parents with at least one child
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no parent has children
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
