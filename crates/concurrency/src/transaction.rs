//! Read-only transaction handle
//!
//! A `Transaction` pairs one committed revision with the store it came
//! from. The snapshot may be stale by the time it is read; `refresh` fetches
//! the current head.

use ledger_core::{
    LedgerResult, Timestamp, TransactionData, TransactionId, TransactionRevision,
    TransactionState, TransactionStore,
};
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Committed revision plus the store that owns its chain
///
/// Equality and hashing use `(id, revision)` only.
#[derive(Clone)]
pub struct Transaction {
    data: Arc<TransactionData>,
    store: Arc<dyn TransactionStore>,
}

impl Transaction {
    /// Wrap a committed revision
    pub fn new(data: Arc<TransactionData>, store: Arc<dyn TransactionStore>) -> Self {
        Self { data, store }
    }

    /// Underlying record
    pub fn data(&self) -> &Arc<TransactionData> {
        &self.data
    }

    /// Store the record was read from
    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.store
    }

    /// Chain id
    pub fn id(&self) -> TransactionId {
        self.data.id
    }

    /// Position in the chain
    pub fn revision(&self) -> u64 {
        self.data.revision
    }

    /// When this revision was committed
    pub fn created(&self) -> Timestamp {
        self.data.created
    }

    /// Pending re-evaluation instant
    pub fn expires(&self) -> Option<Timestamp> {
        self.data.expires
    }

    /// When the processor consumed the expiry
    pub fn expired(&self) -> Option<Timestamp> {
        self.data.expired
    }

    /// Opaque business payload
    pub fn payload(&self) -> &Value {
        &self.data.payload
    }

    /// Script reference or inline code
    pub fn script(&self) -> Option<&str> {
        self.data.script.as_deref()
    }

    /// Link to the parent revision
    pub fn parent(&self) -> Option<TransactionRevision> {
        self.data.parent
    }

    /// Lifecycle state
    pub fn state(&self) -> TransactionState {
        self.data.state
    }

    /// Handler / capability name
    pub fn handler(&self) -> Option<&str> {
        self.data.handler.as_deref()
    }

    /// Failure detail, set on `Failed`
    pub fn error(&self) -> Option<&Value> {
        self.data.error.as_ref()
    }

    /// `(id, revision)` of this handle
    pub fn revision_ref(&self) -> TransactionRevision {
        self.data.revision_ref()
    }

    /// Whether this revision is due at `now`
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.data.is_due(now)
    }

    /// Current head of the same chain
    pub fn refresh(&self) -> LedgerResult<Transaction> {
        let head = self.store.fetch(self.id(), None)?;
        Ok(Transaction::new(head, Arc::clone(&self.store)))
    }

    /// Whether a newer revision has been committed since this snapshot
    pub fn is_stale(&self) -> LedgerResult<bool> {
        Ok(self.store.fetch(self.id(), None)?.revision != self.revision())
    }

    /// Full history of the chain, oldest first
    pub fn chain(&self) -> LedgerResult<Vec<Transaction>> {
        Ok(self
            .store
            .get_chain(self.id())?
            .into_iter()
            .map(|data| Transaction::new(data, Arc::clone(&self.store)))
            .collect())
    }

    /// Heads of chains parented to this one
    pub fn children(&self, states: &[TransactionState]) -> Vec<Transaction> {
        self.store
            .get_child_transactions(self.id(), states)
            .into_iter()
            .map(|data| Transaction::new(data, Arc::clone(&self.store)))
            .collect()
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.revision_ref() == other.revision_ref()
    }
}

impl Eq for Transaction {}

impl Hash for Transaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.revision_ref().hash(state);
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.data.id)
            .field("revision", &self.data.revision)
            .field("state", &self.data.state)
            .finish()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.revision_ref())
    }
}
