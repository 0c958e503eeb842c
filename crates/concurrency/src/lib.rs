//! Delta / factory layer for the transaction ledger
//!
//! This crate layers optimistic-concurrency helpers over any
//! `TransactionStore`:
//! - Transaction: read-only handle over a committed revision
//! - TransactionLock / LockedTransaction: RAII ownership of a chain's lock
//! - TransactionFactory: start, continue, and extend chains with deltas
//! - RetryConfig: caller-side retry policy for conflicting writers
//!
//! The store never merges conflicting writes. A `Conflict` from
//! `create_delta` means "re-fetch and try again"; `update_with_retry` does
//! exactly that with exponential backoff.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod factory;
pub mod guard;
pub mod retry;
pub mod transaction;

pub use factory::{DeltaKind, TransactionFactory, DEFAULT_LOCK_TIMEOUT};
pub use guard::{LockedTransaction, TransactionLock};
pub use retry::RetryConfig;
pub use transaction::Transaction;
