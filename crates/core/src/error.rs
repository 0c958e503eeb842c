//! Error types for the transaction ledger
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! The store never retries on its own: `NotFound`, `Timeout` and `Conflict`
//! always reach the immediate caller. Retrying after a `Conflict` is caller
//! policy and must restart from a fresh fetch.

use crate::types::TransactionId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for ledger operations
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Error types for the ledger
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    /// Transaction id not present in the store
    #[error("Transaction not found: {id}")]
    NotFound {
        /// Missing id
        id: TransactionId,
    },

    /// Requested revision is beyond the chain
    #[error("Revision {revision} not found for {id} (head is {head})")]
    RevisionNotFound {
        /// Chain id
        id: TransactionId,
        /// Requested revision
        revision: u64,
        /// Current head revision
        head: u64,
    },

    /// Genesis create for an id that already has a chain
    #[error("Transaction already exists: {id}")]
    AlreadyExists {
        /// Duplicate id
        id: TransactionId,
    },

    /// Optimistic-concurrency mismatch: the chain moved since it was read
    #[error("Conflict on {id}: expected head revision {expected}, found {actual}")]
    Conflict {
        /// Chain id
        id: TransactionId,
        /// Revision the caller based its delta on
        expected: u64,
        /// Revision actually at the head
        actual: u64,
    },

    /// Malformed request (id mismatch, non-contiguous revision, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Lock or wait exceeded its bound
    #[error("Timed out after {after:?} waiting for {operation}")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
        /// Bound that was exceeded
        after: Duration,
    },

    /// Blocking wait aborted through a cancellation token
    #[error("Cancelled while waiting for {operation}")]
    Cancelled {
        /// Operation that was cancelled
        operation: &'static str,
    },

    /// Script runner failure
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Runtime failure outside the taxonomy above (e.g. thread spawn)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`LedgerError`]
///
/// Lets outer layers (HTTP, CLI) branch on the kind of failure without
/// matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Id or revision absent
    NotFound,
    /// Duplicate genesis
    AlreadyExists,
    /// Optimistic-concurrency conflict
    Conflict,
    /// Bad request
    InvalidArgument,
    /// Bound exceeded
    Timeout,
    /// Caller aborted
    Cancelled,
    /// Anything else (script, configuration)
    Internal,
}

impl LedgerError {
    /// Shorthand for [`LedgerError::NotFound`]
    pub fn not_found(id: TransactionId) -> Self {
        LedgerError::NotFound { id }
    }

    /// Shorthand for [`LedgerError::InvalidArgument`]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        LedgerError::InvalidArgument(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound { .. } | LedgerError::RevisionNotFound { .. } => {
                ErrorKind::NotFound
            }
            LedgerError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            LedgerError::Conflict { .. } => ErrorKind::Conflict,
            LedgerError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            LedgerError::Timeout { .. } => ErrorKind::Timeout,
            LedgerError::Cancelled { .. } => ErrorKind::Cancelled,
            LedgerError::Script(_) | LedgerError::Config(_) | LedgerError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// HTTP status an API layer should answer with
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyExists | ErrorKind::Conflict => 409,
            ErrorKind::InvalidArgument => 400,
            ErrorKind::Timeout => 504,
            ErrorKind::Cancelled => 499,
            ErrorKind::Internal => 500,
        }
    }

    /// Optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Conflict { .. })
    }

    /// Id or revision absent
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Lock or wait timed out
    pub fn is_timeout(&self) -> bool {
        matches!(self, LedgerError::Timeout { .. })
    }

    /// Wait was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LedgerError::Cancelled { .. })
    }

    /// Whether retrying from a fresh fetch can succeed
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
    }
}

/// Failure reported by a script runner
///
/// Serialized into the `error` field of the `Failed` revision the processor
/// commits, so it stays plain data.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ScriptError {
    /// Human-readable cause
    pub message: String,
    /// Whether the runner panicked rather than returning an error
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub panicked: bool,
}

impl ScriptError {
    /// Create a script error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            panicked: false,
        }
    }

    /// Create a script error describing a runner panic
    pub fn panicked(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            panicked: true,
        }
    }

    /// JSON form stored on `Failed` revisions
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({ "message": self.message }))
    }
}

impl From<String> for ScriptError {
    fn from(message: String) -> Self {
        ScriptError::new(message)
    }
}

impl From<&str> for ScriptError {
    fn from(message: &str) -> Self {
        ScriptError::new(message)
    }
}
