//! Composable read view over chain heads
//!
//! `TransactionStore::query()` returns a `TransactionQuery` holding a
//! snapshot of every head at call time. Filters compose lazily and are only
//! evaluated when the query is consumed. Predicates usually come from an
//! external expression compiler; the query only evaluates them.

use std::fmt;
use std::sync::Arc;

use crate::timestamp::Timestamp;
use crate::transaction::TransactionData;
use crate::types::{TransactionId, TransactionState};

/// Compiled predicate over a transaction
pub type TransactionPredicate = Arc<dyn Fn(&TransactionData) -> bool + Send + Sync>;

/// Filterable view over a snapshot of chain heads
#[derive(Clone)]
pub struct TransactionQuery {
    heads: Arc<Vec<Arc<TransactionData>>>,
    filters: Vec<TransactionPredicate>,
}

impl TransactionQuery {
    /// Build a query over a snapshot of heads
    pub fn new(heads: Vec<Arc<TransactionData>>) -> Self {
        Self {
            heads: Arc::new(heads),
            filters: Vec::new(),
        }
    }

    /// Keep only transactions matching `predicate`
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&TransactionData) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Arc::new(predicate));
        self
    }

    /// Keep only transactions matching a pre-compiled predicate
    pub fn matching(mut self, predicate: TransactionPredicate) -> Self {
        self.filters.push(predicate);
        self
    }

    /// Keep only transactions in `state`
    pub fn with_state(self, state: TransactionState) -> Self {
        self.filter(move |tx| tx.state == state)
    }

    /// Keep only transactions whose parent chain is `parent`
    pub fn children_of(self, parent: TransactionId) -> Self {
        self.filter(move |tx| tx.parent.map(|p| p.id) == Some(parent))
    }

    /// Keep only transactions handled by `handler`
    pub fn with_handler(self, handler: impl Into<String>) -> Self {
        let handler = handler.into();
        self.filter(move |tx| tx.handler.as_deref() == Some(handler.as_str()))
    }

    /// Keep only transactions due for re-evaluation at `now`
    pub fn expiring_before(self, now: Timestamp) -> Self {
        self.filter(move |tx| tx.is_due(now))
    }

    fn accepts(&self, tx: &TransactionData) -> bool {
        self.filters.iter().all(|predicate| predicate(tx))
    }

    /// Iterate over matching heads
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TransactionData>> + '_ {
        self.heads.iter().filter(move |tx| self.accepts(tx))
    }

    /// Number of matching heads
    pub fn count(&self) -> usize {
        self.iter().count()
    }

    /// First matching head in snapshot order
    pub fn first(&self) -> Option<Arc<TransactionData>> {
        self.iter().next().cloned()
    }

    /// Whether any head matches
    pub fn any(&self) -> bool {
        self.iter().next().is_some()
    }

    /// Collect matching heads
    pub fn into_vec(self) -> Vec<Arc<TransactionData>> {
        self.iter().cloned().collect()
    }

    /// Size of the underlying snapshot, ignoring filters
    pub fn snapshot_len(&self) -> usize {
        self.heads.len()
    }
}

impl fmt::Debug for TransactionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionQuery")
            .field("heads", &self.heads.len())
            .field("filters", &self.filters.len())
            .finish()
    }
}
