//! LedgerDB - append-only, revision-chained transaction ledger
//!
//! Every business transaction is a chain of immutable revisions. Writers
//! append revisions under an optimistic check (`commit_delta`), may hold an
//! advisory per-id lock while they do, and schedule re-evaluation through an
//! `expires` instant. A background processor picks up expired heads, runs
//! their scripts and commits the result.
//!
//! # Quick Start
//!
//! ```ignore
//! use ledgerdb::{Ledger, TransactionMutableData, TransactionState};
//!
//! let ledger = Ledger::ephemeral();
//!
//! let mut tx = ledger.start_transaction(None)?;
//! tx.apply(&TransactionMutableData::new().script("authorize()"))?;
//! let tx = tx.unlock()?;
//!
//! let handle = ledger.start_processor(runner)?;
//! ```
//!
//! # Architecture
//!
//! - `ledger-core`: data model, errors, the `TransactionStore` contract
//! - `ledger-storage`: the in-memory engine (`MemoryStore`)
//! - `ledger-concurrency`: `Transaction` handles and `TransactionFactory`
//! - `ledger-engine`: the processor, configuration and the `Ledger` facade

pub use ledger_concurrency::{
    DeltaKind, LockedTransaction, RetryConfig, Transaction, TransactionFactory, TransactionLock,
    DEFAULT_LOCK_TIMEOUT,
};
pub use ledger_core::{
    CancelRegistration, CancellationToken, CommitObserver, ErrorKind, LedgerError, LedgerResult,
    LockFlags, ScriptError, StoreStats, Subscription, Timestamp, TransactionData, TransactionId,
    TransactionMutableData, TransactionPredicate, TransactionQuery, TransactionRevision,
    TransactionState, TransactionStore, GENESIS_REVISION,
};
pub use ledger_engine::{
    Ledger, LedgerConfig, LockConfig, ProcessorConfig, ProcessorHandle, ProcessorStats,
    RejectingRunner, ScriptRunner, TickReport, TransactionProcessor, CONFIG_FILE_NAME,
};
pub use ledger_storage::MemoryStore;
