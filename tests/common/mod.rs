//! Shared helpers for the ledger integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use ledgerdb::{
    CommitObserver, Ledger, ScriptError, ScriptRunner, Timestamp, Transaction, TransactionData,
    TransactionId, TransactionMutableData, TransactionState, TransactionStore,
};
use parking_lot::Mutex;
use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

static INIT_TRACING: Once = Once::new();

/// Install a test-writer subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Fresh ledger with default settings
pub fn ledger() -> Ledger {
    init_tracing();
    Ledger::ephemeral()
}

/// Genesis revision that is already due
pub fn create_due(store: &dyn TransactionStore, script: Option<&str>) -> TransactionId {
    let id = TransactionId::new();
    let now = Timestamp::now();
    let mut genesis = TransactionData::genesis(id)
        .with_created(now)
        .with_expires(now);
    genesis.script = script.map(str::to_string);
    store.create(genesis).unwrap();
    id
}

/// Runner that completes every transaction and stops its expiry
pub fn completing_runner() -> Arc<dyn ScriptRunner> {
    Arc::new(
        |_: &str, _: &Transaction| -> Result<TransactionMutableData, ScriptError> {
            Ok(TransactionMutableData::new()
                .state(TransactionState::Completed)
                .clear_expires())
        },
    )
}

/// Poll `done` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    done()
}

/// Observer that records every commit it sees
pub fn recording_observer() -> (CommitObserver, Arc<Mutex<Vec<Arc<TransactionData>>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observer: CommitObserver = {
        let seen = Arc::clone(&seen);
        Arc::new(move |tx: &Arc<TransactionData>| seen.lock().push(Arc::clone(tx)))
    };
    (observer, seen)
}
