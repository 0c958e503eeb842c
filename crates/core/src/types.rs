//! Identifier and lifecycle types
//!
//! - `TransactionId`: UUID v4 wrapper identifying one chain
//! - `TransactionRevision`: a point inside a chain
//! - `TransactionState`: the transaction state machine's states

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Revision number of the first entry of every chain
pub const GENESIS_REVISION: u64 = 0;

/// Unique identifier for a transaction chain
///
/// A TransactionId is a wrapper around a UUID v4. Every revision of a
/// transaction shares the same id; the revision number distinguishes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Create a new random TransactionId using UUID v4
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a TransactionId from raw bytes
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Create a TransactionId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the raw bytes of this TransactionId
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    /// Accepts standard UUID format (with or without hyphens).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Reference to a specific revision of a chain
///
/// Used for parent linkage between chains and for optimistic-concurrency
/// checks against the current head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionRevision {
    /// Chain identifier
    pub id: TransactionId,
    /// Revision within the chain
    pub revision: u64,
}

impl TransactionRevision {
    /// Create a new revision reference
    pub const fn new(id: TransactionId, revision: u64) -> Self {
        Self { id, revision }
    }

    /// Reference to the genesis revision of `id`
    pub const fn genesis(id: TransactionId) -> Self {
        Self::new(id, GENESIS_REVISION)
    }

    /// Reference to the revision that would follow this one
    pub const fn next(&self) -> Self {
        Self::new(self.id, self.revision + 1)
    }
}

impl fmt::Display for TransactionRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.revision)
    }
}

/// Lifecycle state of a transaction
///
/// Transition policy lives in scripts and callers, not in the store:
/// `Initialized -> Authorized -> Completed`, `Cancelled` from
/// `Initialized`/`Authorized`, `Failed` from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    /// Freshly created
    #[default]
    Initialized,
    /// Approved, awaiting completion
    Authorized,
    /// Finished successfully
    Completed,
    /// Aborted by a caller or script
    Cancelled,
    /// Evaluation failed; `error` carries the cause
    Failed,
}

impl TransactionState {
    /// All states, in lifecycle order
    pub const ALL: [TransactionState; 5] = [
        TransactionState::Initialized,
        TransactionState::Authorized,
        TransactionState::Completed,
        TransactionState::Cancelled,
        TransactionState::Failed,
    ];

    /// Whether no further transition is expected from this state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Completed | TransactionState::Cancelled | TransactionState::Failed
        )
    }

    /// Lowercase name as used in payloads and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Initialized => "initialized",
            TransactionState::Authorized => "authorized",
            TransactionState::Completed => "completed",
            TransactionState::Cancelled => "cancelled",
            TransactionState::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown transaction state '{}'", s))
    }
}
