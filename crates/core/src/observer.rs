//! Commit notification types
//!
//! Every successful `create` or `commit_delta` raises one commit event
//! carrying the new revision. Observers are registered with
//! `TransactionStore::subscribe` and stay registered until the returned
//! [`Subscription`] is dropped.

use std::fmt;
use std::sync::Arc;

use crate::transaction::TransactionData;

/// Callback invoked once per committed revision
///
/// Runs on the committing thread, after every store lock has been released.
/// Observers must not block for long.
///
/// Commits from one thread arrive in commit order. Commits racing on
/// different threads may arrive out of revision order, even on one chain;
/// compare `revision` when order matters.
pub type CommitObserver = Arc<dyn Fn(&Arc<TransactionData>) + Send + Sync>;

/// Registration handle for a commit observer
///
/// Dropping it unregisters the observer; `unsubscribe` does the same
/// explicitly.
#[must_use = "dropping the subscription unregisters the observer"]
pub struct Subscription {
    id: u64,
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Wrap an unregister callback produced by a store's observer registry
    pub fn new(id: u64, unregister: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            cancel: Some(Box::new(unregister)),
        }
    }

    /// Registry-assigned id of this subscription
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Unregister now
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unregister) = self.cancel.take() {
            unregister();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
