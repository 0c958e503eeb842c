//! Core types and traits for the transaction ledger
//!
//! This crate defines the foundational types used throughout the system:
//! - TransactionId: Unique identifier for a transaction chain
//! - TransactionState: The five-state lifecycle of a transaction
//! - TransactionRevision: (id, revision) reference into a chain
//! - TransactionData / TransactionMutableData: immutable record and patch
//! - Timestamp: Microsecond wall-clock instant
//! - LedgerError: Error taxonomy shared by every layer
//! - TransactionStore: The storage contract every engine implements
//! - CancellationToken: Cooperative cancellation for blocking waits
//! - TransactionQuery: Composable view over chain heads

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod error;
pub mod observer;
pub mod query;
pub mod timestamp;
pub mod traits;
pub mod transaction;
pub mod types;

pub use cancel::{CancelRegistration, CancellationToken};
pub use error::{ErrorKind, LedgerError, LedgerResult, ScriptError};
pub use observer::{CommitObserver, Subscription};
pub use query::{TransactionPredicate, TransactionQuery};
pub use timestamp::Timestamp;
pub use traits::{LockFlags, StoreStats, TransactionStore};
pub use transaction::{TransactionData, TransactionMutableData};
pub use types::{TransactionId, TransactionRevision, TransactionState, GENESIS_REVISION};
