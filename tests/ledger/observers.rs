//! Commit observers and predicate waits

use crate::common::*;
use ledgerdb::{
    CancellationToken, LedgerError, TransactionData, TransactionMutableData, TransactionPredicate,
    TransactionState,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn observer_sees_every_commit_in_order() {
    let ledger = ledger();
    let (observer, seen) = recording_observer();
    let subscription = ledger.subscribe(observer);

    let mut tx = ledger.start_transaction(None).unwrap();
    tx.apply(&TransactionMutableData::new().state(TransactionState::Authorized))
        .unwrap();
    tx.apply(&TransactionMutableData::new().state(TransactionState::Completed))
        .unwrap();
    let id = tx.unlock().unwrap().id();

    let revisions: Vec<u64> = seen
        .lock()
        .iter()
        .filter(|t| t.id == id)
        .map(|t| t.revision)
        .collect();
    assert_eq!(revisions, vec![0, 1, 2]);

    subscription.unsubscribe();
    ledger
        .update(id, |_| Ok(TransactionMutableData::new().clear_expires()))
        .unwrap();
    assert_eq!(seen.lock().len(), 3);
}

#[test]
fn panicking_observer_does_not_block_commits() {
    let ledger = ledger();
    let _bad = ledger.subscribe(Arc::new(|_: &Arc<TransactionData>| panic!("observer bug")));
    let (observer, seen) = recording_observer();
    let _good = ledger.subscribe(observer);

    let tx = ledger.start_transaction(None).unwrap().unlock().unwrap();
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(ledger.fetch(tx.id(), None).unwrap().revision(), 0);
}

#[test]
fn wait_for_returns_matching_commit() {
    let ledger = Arc::new(ledger());
    let id = ledger.start_transaction(None).unwrap().unlock().unwrap().id();

    let predicate: TransactionPredicate =
        Arc::new(move |tx: &TransactionData| tx.id == id && tx.state == TransactionState::Completed);

    let writer = {
        let ledger = Arc::clone(&ledger);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            for state in [TransactionState::Authorized, TransactionState::Completed] {
                ledger
                    .update(id, |_| Ok(TransactionMutableData::new().state(state)))
                    .unwrap();
            }
        })
    };

    let matched = ledger
        .wait_for(predicate, Some(Duration::from_secs(5)), &CancellationToken::new())
        .unwrap()
        .unwrap();
    writer.join().unwrap();

    assert_eq!(matched.id, id);
    assert_eq!(matched.revision, 2);
    assert_eq!(matched.state, TransactionState::Completed);
}

#[test]
fn wait_for_times_out_without_match() {
    let ledger = ledger();
    let predicate: TransactionPredicate = Arc::new(|_: &TransactionData| false);

    let started = Instant::now();
    let result = ledger
        .wait_for(predicate, Some(Duration::from_millis(30)), &CancellationToken::new())
        .unwrap();
    assert!(result.is_none());
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[test]
fn wait_for_cancellation() {
    let ledger = ledger();
    let cancel = CancellationToken::new();
    let predicate: TransactionPredicate = Arc::new(|_: &TransactionData| false);

    let canceller = {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            cancel.cancel();
        })
    };

    let err = ledger.wait_for(predicate, None, &cancel).unwrap_err();
    canceller.join().unwrap();
    assert_eq!(
        err,
        LedgerError::Cancelled {
            operation: "wait_for"
        }
    );
    assert_eq!(cancel.registrations(), 0);
}
