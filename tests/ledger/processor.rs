//! Background processor through the facade
//!
//! Spawned workers against a live ledger: scripted completion, the
//! no-script expiry path, scheduling a future expiry and shutdown.

use crate::common::*;
use ledgerdb::{
    ScriptError, ScriptRunner, Timestamp, Transaction, TransactionMutableData, TransactionState,
    TransactionStore,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn processor_completes_due_transaction() {
    let ledger = ledger();
    let handle = ledger.start_processor(completing_runner()).unwrap();

    let id = create_due(ledger.store().as_ref(), Some("complete()"));
    assert!(wait_until(Duration::from_secs(5), || {
        ledger.fetch(id, None).unwrap().revision() == 1
    }));
    handle.shutdown();

    let head = ledger.fetch(id, None).unwrap();
    assert_eq!(head.revision(), 1);
    assert_eq!(head.state(), TransactionState::Completed);
    assert_eq!(head.expires(), None);
    assert!(handle.stats().scripts_run >= 1);
}

#[test]
fn future_expiry_runs_after_deadline() {
    let ledger = ledger();
    let handle = ledger.start_processor(completing_runner()).unwrap();

    let due_at = Timestamp::now().saturating_add(Duration::from_millis(80));
    let mut tx = ledger.start_transaction(None).unwrap();
    tx.apply(
        &TransactionMutableData::new()
            .script("complete()")
            .expires(due_at),
    )
    .unwrap();
    let tx = tx.unlock().unwrap();

    // still pending well before the deadline
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(tx.refresh().unwrap().state(), TransactionState::Initialized);

    assert!(wait_until(Duration::from_secs(5), || {
        tx.refresh().unwrap().state() == TransactionState::Completed
    }));
    let head = tx.refresh().unwrap();
    assert!(head.created() >= due_at);
    handle.shutdown();
}

#[test]
fn transaction_without_script_is_retired() {
    let ledger = ledger();
    let handle = ledger.start_processor(completing_runner()).unwrap();

    let id = create_due(ledger.store().as_ref(), None);
    assert!(wait_until(Duration::from_secs(5), || {
        ledger.fetch(id, None).unwrap().revision() == 1
    }));
    handle.shutdown();

    let head = ledger.fetch(id, None).unwrap();
    assert_eq!(head.expires(), None);
    assert!(head.expired().is_some());
    assert_eq!(head.state(), TransactionState::Initialized);
    assert_eq!(handle.stats().scripts_run, 0);
    assert_eq!(ledger.store().stats().pending_expiries, 0);
}

#[test]
fn script_chain_runs_until_terminal_state() {
    let ledger = ledger();
    let runs = Arc::new(AtomicUsize::new(0));
    let runner: Arc<dyn ScriptRunner> = {
        let runs = Arc::clone(&runs);
        Arc::new(
            move |_: &str, tx: &Transaction| -> Result<TransactionMutableData, ScriptError> {
                runs.fetch_add(1, Ordering::SeqCst);
                match tx.state() {
                    TransactionState::Initialized => {
                        Ok(TransactionMutableData::new().state(TransactionState::Authorized))
                    }
                    TransactionState::Authorized => Ok(TransactionMutableData::new()
                        .state(TransactionState::Completed)
                        .payload(json!({ "captured": true }))
                        .clear_expires()),
                    other => Err(ScriptError::new(format!("unexpected state {}", other))),
                }
            },
        )
    };
    let handle = ledger.start_processor(runner).unwrap();

    let id = create_due(ledger.store().as_ref(), Some("authorize_then_capture()"));
    assert!(wait_until(Duration::from_secs(5), || {
        ledger.fetch(id, None).unwrap().state() == TransactionState::Completed
    }));
    handle.shutdown();

    let chain = ledger.store().get_chain(id).unwrap();
    let states: Vec<TransactionState> = chain.iter().map(|t| t.state).collect();
    assert_eq!(
        states,
        vec![
            TransactionState::Initialized,
            TransactionState::Authorized,
            TransactionState::Completed
        ]
    );
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn shutdown_is_prompt_and_idempotent() {
    let ledger = ledger();
    let handle = ledger.start_processor(completing_runner()).unwrap();
    assert!(handle.is_running());

    let started = Instant::now();
    handle.shutdown();
    handle.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!handle.is_running());
    assert!(handle.cancellation_token().is_cancelled());
}
