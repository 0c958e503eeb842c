//! Transaction record and patch types
//!
//! `TransactionData` is an immutable snapshot of one revision. Once a store
//! commits it, it is shared as `Arc<TransactionData>` and never mutated; a
//! "change" is a new record with the next revision number.
//!
//! `TransactionMutableData` is a patch: the subset of fields a mutation may
//! set. It is never persisted on its own. It is merged onto a copy of the
//! current head to produce the next revision.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::timestamp::Timestamp;
use crate::types::{TransactionId, TransactionRevision, TransactionState, GENESIS_REVISION};

/// One revision of a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionData {
    /// Chain identifier
    pub id: TransactionId,
    /// Position in the chain, starting at [`GENESIS_REVISION`]
    pub revision: u64,
    /// When this revision was produced
    pub created: Timestamp,
    /// When the processor should re-evaluate this revision
    pub expires: Option<Timestamp>,
    /// When this transaction stopped expiring
    pub expired: Option<Timestamp>,
    /// Opaque structured business data
    pub payload: Value,
    /// Script reference or inline code evaluated on expiry
    pub script: Option<String>,
    /// Revision of the chain this one was spawned from
    pub parent: Option<TransactionRevision>,
    /// Lifecycle state
    pub state: TransactionState,
    /// Capability/handler name
    pub handler: Option<String>,
    /// Failure detail, set on `Failed`
    pub error: Option<Value>,
}

impl TransactionData {
    /// Genesis revision for `id`: `Initialized`, empty object payload, no expiry
    pub fn genesis(id: TransactionId) -> Self {
        Self {
            id,
            revision: GENESIS_REVISION,
            created: Timestamp::now(),
            expires: None,
            expired: None,
            payload: Value::Object(Default::default()),
            script: None,
            parent: None,
            state: TransactionState::Initialized,
            handler: None,
            error: None,
        }
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the expiry instant
    pub fn with_expires(mut self, expires: Timestamp) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Set the script
    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Set the parent link
    pub fn with_parent(mut self, parent: TransactionRevision) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set the state
    pub fn with_state(mut self, state: TransactionState) -> Self {
        self.state = state;
        self
    }

    /// Set the handler name
    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    /// Set the error detail
    pub fn with_error(mut self, error: Value) -> Self {
        self.error = Some(error);
        self
    }

    /// Set the creation instant
    pub fn with_created(mut self, created: Timestamp) -> Self {
        self.created = created;
        self
    }

    /// (id, revision) of this record
    pub fn revision_ref(&self) -> TransactionRevision {
        TransactionRevision::new(self.id, self.revision)
    }

    /// Whether this is the first entry of its chain
    pub fn is_genesis(&self) -> bool {
        self.revision == GENESIS_REVISION
    }

    /// Due for re-evaluation at `now`: `expires <= now` and not yet expired
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.expired.is_none() && matches!(self.expires, Some(at) if at <= now)
    }

    /// Expiry instant the store should index, if any
    pub fn pending_expiry(&self) -> Option<Timestamp> {
        match self.expired {
            Some(_) => None,
            None => self.expires,
        }
    }

    /// Merge `patch` over a copy of this record
    ///
    /// Produces the candidate for the next revision: revision and `created`
    /// are replaced, `expired` is cleared, fields the patch leaves untouched
    /// are carried over.
    pub fn merge(&self, patch: &TransactionMutableData, revision: u64, created: Timestamp) -> Self {
        let mut next = self.clone();
        next.revision = revision;
        next.created = created;
        next.expired = None;
        patch.apply_to(&mut next);
        next
    }
}

/// Patch describing the fields a mutation wishes to change
///
/// Nullable fields are `Option<Option<T>>`: `None` leaves the field as is,
/// `Some(None)` clears it, `Some(Some(v))` sets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionMutableData {
    /// Expiry update
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit_null"
    )]
    pub expires: Option<Option<Timestamp>>,
    /// Payload replacement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Script update
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit_null"
    )]
    pub script: Option<Option<String>>,
    /// State transition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TransactionState>,
    /// Handler update
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit_null"
    )]
    pub handler: Option<Option<String>>,
    /// Error update
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "explicit_null"
    )]
    pub error: Option<Option<Value>>,
}

/// Keeps an explicit `null` distinct from an absent field.
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl TransactionMutableData {
    /// Empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expiry instant
    pub fn expires(mut self, at: Timestamp) -> Self {
        self.expires = Some(Some(at));
        self
    }

    /// Stop expiring
    pub fn clear_expires(mut self) -> Self {
        self.expires = Some(None);
        self
    }

    /// Replace the payload
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Set the script
    pub fn script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(Some(script.into()));
        self
    }

    /// Remove the script
    pub fn clear_script(mut self) -> Self {
        self.script = Some(None);
        self
    }

    /// Transition to `state`
    pub fn state(mut self, state: TransactionState) -> Self {
        self.state = Some(state);
        self
    }

    /// Set the handler
    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(Some(handler.into()));
        self
    }

    /// Remove the handler
    pub fn clear_handler(mut self) -> Self {
        self.handler = Some(None);
        self
    }

    /// Set the error detail
    pub fn error(mut self, error: Value) -> Self {
        self.error = Some(Some(error));
        self
    }

    /// Remove the error detail
    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    /// Whether the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Write every field this patch sets into `data`
    pub fn apply_to(&self, data: &mut TransactionData) {
        if let Some(expires) = self.expires {
            data.expires = expires;
        }
        if let Some(payload) = &self.payload {
            data.payload = payload.clone();
        }
        if let Some(script) = &self.script {
            data.script = script.clone();
        }
        if let Some(state) = self.state {
            data.state = state;
        }
        if let Some(handler) = &self.handler {
            data.handler = handler.clone();
        }
        if let Some(error) = &self.error {
            data.error = error.clone();
        }
    }
}
