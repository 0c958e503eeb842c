//! Expiry index for due-transaction lookup
//!
//! `ExpiryIndex` holds one `(expires, id)` entry per head that has an
//! expiry and has not been marked expired. Entries are kept sorted in
//! DESCENDING order so the nearest expiry sits at the end of the array:
//! - insert/remove are a binary search plus a shift
//! - the due set for `now` is the tail found by `partition_point`
//! - readers take an `Arc` snapshot and search it without holding the
//!   writer lock; writers copy-on-write through `Arc::make_mut`

use ledger_core::{Timestamp, TransactionId};
use std::sync::Arc;

/// One pending expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpiryEntry {
    /// When the head becomes due
    pub expires: Timestamp,
    /// Chain the head belongs to
    pub id: TransactionId,
}

impl ExpiryEntry {
    /// Create an entry
    pub fn new(expires: Timestamp, id: TransactionId) -> Self {
        Self { expires, id }
    }
}

/// Sorted (descending) array of pending expiries
#[derive(Debug, Clone, Default)]
pub struct ExpiryIndex {
    entries: Arc<Vec<ExpiryEntry>>,
}

impl ExpiryIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, entry: &ExpiryEntry) -> Result<usize, usize> {
        // Reversed comparison keeps the array descending.
        self.entries.binary_search_by(|other| entry.cmp(other))
    }

    /// Add an entry; returns false if it was already present
    pub fn insert(&mut self, expires: Timestamp, id: TransactionId) -> bool {
        let entry = ExpiryEntry::new(expires, id);
        match self.position(&entry) {
            Ok(_) => false,
            Err(at) => {
                Arc::make_mut(&mut self.entries).insert(at, entry);
                true
            }
        }
    }

    /// Remove an entry; returns false if it was not present
    pub fn remove(&mut self, expires: Timestamp, id: TransactionId) -> bool {
        let entry = ExpiryEntry::new(expires, id);
        match self.position(&entry) {
            Ok(at) => {
                Arc::make_mut(&mut self.entries).remove(at);
                true
            }
            Err(_) => false,
        }
    }

    /// Earliest pending expiry
    pub fn nearest(&self) -> Option<Timestamp> {
        self.entries.last().map(|e| e.expires)
    }

    /// Number of pending expiries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Immutable view of the current entries
    pub fn snapshot(&self) -> ExpirySnapshot {
        ExpirySnapshot {
            entries: Arc::clone(&self.entries),
        }
    }
}

/// Point-in-time view of an [`ExpiryIndex`]
#[derive(Debug, Clone)]
pub struct ExpirySnapshot {
    entries: Arc<Vec<ExpiryEntry>>,
}

impl ExpirySnapshot {
    /// Entries with `expires <= now`, furthest first
    pub fn due(&self, now: Timestamp) -> &[ExpiryEntry] {
        let split = self.entries.partition_point(|e| e.expires > now);
        &self.entries[split..]
    }
}
