//! In-memory storage engine for the transaction ledger
//!
//! This crate implements the reference `TransactionStore` backend with:
//! - MemoryStore: DashMap of per-id slots, coarse commit lock
//! - KeyedLock: per-id exclusive lock with timed and non-blocking acquisition
//! - ExpiryIndex: descending array of (expires, id), binary-searched on wakeup
//! - ParentIndex: parent id -> child ids, for child lookups without a scan
//! - ObserverRegistry: commit notification fan-out
//!
//! The engine is volatile: nothing is persisted.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod expiry;
pub mod index;
pub mod lock;
pub mod memory;
pub mod observers;
pub mod slot;

pub use expiry::{ExpiryEntry, ExpiryIndex, ExpirySnapshot};
pub use index::ParentIndex;
pub use lock::{KeyedLock, LockOutcome};
pub use memory::MemoryStore;
pub use observers::ObserverRegistry;
pub use slot::TransactionSlot;
