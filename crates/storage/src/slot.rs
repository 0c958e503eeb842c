//! Per-id storage slot
//!
//! A slot owns one chain plus the id's exclusive lock. A slot created by
//! `lock` with the CREATE flag starts as a placeholder (empty chain) and is
//! filled by the genesis `create`.

use crate::lock::KeyedLock;
use ledger_core::{TransactionData, TransactionId};
use parking_lot::RwLock;
use std::sync::Arc;

/// Chain and lock for a single transaction id
#[derive(Debug)]
pub struct TransactionSlot {
    id: TransactionId,
    chain: RwLock<Vec<Arc<TransactionData>>>,
    lock: KeyedLock,
}

impl TransactionSlot {
    /// Empty slot reserving `id`
    pub fn placeholder(id: TransactionId) -> Self {
        Self {
            id,
            chain: RwLock::new(Vec::new()),
            lock: KeyedLock::new(),
        }
    }

    /// The id's exclusive lock
    pub fn lock(&self) -> &KeyedLock {
        &self.lock
    }

    /// Latest revision, `None` for a placeholder
    pub fn head(&self) -> Option<Arc<TransactionData>> {
        self.chain.read().last().cloned()
    }

    /// Revision `revision`, if the chain is that long
    pub fn revision(&self, revision: u64) -> Option<Arc<TransactionData>> {
        let index = usize::try_from(revision).ok()?;
        self.chain.read().get(index).cloned()
    }

    /// Copy of the full history, oldest first
    pub fn chain(&self) -> Vec<Arc<TransactionData>> {
        self.chain.read().clone()
    }

    /// Whether the chain is still empty
    pub fn is_placeholder(&self) -> bool {
        self.chain.read().is_empty()
    }

    /// Append a revision
    ///
    /// The caller is responsible for revision contiguity; the store calls
    /// this inside its commit critical section after checking the head.
    pub fn append(&self, data: Arc<TransactionData>) {
        debug_assert_eq!(data.id, self.id);
        let mut chain = self.chain.write();
        debug_assert_eq!(data.revision as usize, chain.len());
        chain.push(data);
    }
}
