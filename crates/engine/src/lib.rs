//! Transaction processor and ledger facade
//!
//! This crate sits on top of the storage and delta layers:
//! - TransactionProcessor: drives expiring transactions through their scripts
//! - ScriptRunner: the seam to an external script runtime
//! - ProcessorMetrics: per-processor counters
//! - LedgerConfig: `ledger.toml` settings
//! - Ledger: store + factory + processor behind one handle
//!
//! The engine is the only component that applies its own recovery policy to
//! errors: a script failure is always recorded, either on the chain or as an
//! orphan chain when the chain itself rejects the write.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod ledger;
pub mod metrics;
pub mod processor;
pub mod script;

pub use config::{LedgerConfig, LockConfig, ProcessorConfig, CONFIG_FILE_NAME};
pub use ledger::Ledger;
pub use metrics::{ProcessorMetrics, ProcessorStats, TickReport};
pub use processor::{ProcessorHandle, TransactionProcessor};
pub use script::{RejectingRunner, ScriptRunner};
