//! Chain semantics through the facade
//!
//! - genesis create is exclusive per id
//! - revisions are contiguous and immutable
//! - stale writers conflict, the head never moves backwards
//! - child chains link back to the exact parent revision

use crate::common::*;
use ledgerdb::{
    DeltaKind, LedgerError, Timestamp, TransactionData, TransactionId, TransactionMutableData,
    TransactionRevision, TransactionState, TransactionStore, GENESIS_REVISION,
};
use serde_json::json;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

// ============================================================================
// Genesis
// ============================================================================

#[test]
fn duplicate_create_keeps_original_genesis() {
    let ledger = ledger();
    let id = TransactionId::new();
    let store = ledger.store();

    store
        .create(TransactionData::genesis(id).with_payload(json!({ "amount": 10 })))
        .unwrap();
    let err = store
        .create(TransactionData::genesis(id).with_payload(json!({ "amount": 99 })))
        .unwrap_err();

    assert_eq!(err, LedgerError::AlreadyExists { id });
    let head = store.fetch(id, None).unwrap();
    assert_eq!(head.revision, GENESIS_REVISION);
    assert_eq!(head.payload, json!({ "amount": 10 }));
    assert_eq!(store.get_chain(id).unwrap().len(), 1);
}

#[test]
fn start_transaction_with_taken_id_fails() {
    let ledger = ledger();
    let id = ledger.start_transaction(None).unwrap().unlock().unwrap().id();

    let err = ledger.start_transaction(Some(id)).unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyExists { .. }));
    assert!(!ledger.store().is_locked(id));
}

#[test]
fn unknown_id_is_not_found() {
    let ledger = ledger();
    let id = TransactionId::new();
    assert_eq!(
        ledger.fetch(id, None).unwrap_err(),
        LedgerError::NotFound { id }
    );
    assert!(ledger.continue_transaction(id, None, None).unwrap_err().is_not_found());
}

// ============================================================================
// Revisions
// ============================================================================

#[test]
fn revisions_form_a_contiguous_history() {
    let ledger = ledger();
    let mut tx = ledger.start_transaction(None).unwrap();
    tx.apply(&TransactionMutableData::new().payload(json!({ "step": 1 })))
        .unwrap();
    tx.apply(&TransactionMutableData::new().state(TransactionState::Authorized))
        .unwrap();
    tx.apply(
        &TransactionMutableData::new()
            .state(TransactionState::Completed)
            .clear_expires(),
    )
    .unwrap();
    let tx = tx.unlock().unwrap();

    let chain = tx.chain().unwrap();
    let revisions: Vec<u64> = chain.iter().map(|t| t.revision()).collect();
    assert_eq!(revisions, vec![0, 1, 2, 3]);

    // earlier revisions are untouched by later patches
    let first = ledger.fetch(tx.id(), Some(1)).unwrap();
    assert_eq!(first.payload(), &json!({ "step": 1 }));
    assert_eq!(first.state(), TransactionState::Initialized);

    let head = ledger.fetch(tx.id(), None).unwrap();
    assert_eq!(head.payload(), &json!({ "step": 1 }));
    assert_eq!(head.state(), TransactionState::Completed);
    assert_eq!(head.expires(), None);
}

#[test]
fn revision_past_head_is_reported() {
    let ledger = ledger();
    let id = ledger.start_transaction(None).unwrap().unlock().unwrap().id();

    let err = ledger.fetch(id, Some(5)).unwrap_err();
    assert_eq!(
        err,
        LedgerError::RevisionNotFound {
            id,
            revision: 5,
            head: 0
        }
    );
    assert!(err.is_not_found());
}

#[test]
fn delta_defaults_expiry_to_now() {
    let ledger = ledger();
    let before = Timestamp::now();
    let mut tx = ledger.start_transaction(None).unwrap();
    let next = tx
        .apply(&TransactionMutableData::new().handler("card"))
        .unwrap()
        .clone();

    let expires = next.expires().unwrap();
    assert!(expires >= before);
    assert!(next.created() >= before);
    assert_eq!(next.handler(), Some("card"));
}

#[test]
fn stale_writer_conflicts() {
    let ledger = ledger();
    let factory = ledger.factory();
    let id = ledger.start_transaction(None).unwrap().unlock().unwrap().id();
    let stale = ledger.fetch(id, None).unwrap();

    ledger
        .update(id, |_| {
            Ok(TransactionMutableData::new().state(TransactionState::Authorized))
        })
        .unwrap();

    let err = factory
        .create_delta(
            &stale,
            &TransactionMutableData::new().state(TransactionState::Cancelled),
            DeltaKind::Revision,
        )
        .unwrap_err();
    assert!(err.is_conflict());
    assert!(err.is_retryable());
    assert_eq!(
        ledger.fetch(id, None).unwrap().state(),
        TransactionState::Authorized
    );
    assert!(stale.is_stale().unwrap());
}

#[test]
fn non_contiguous_delta_is_invalid() {
    let ledger = ledger();
    let id = ledger.start_transaction(None).unwrap().unlock().unwrap().id();
    let head = ledger.store().fetch(id, None).unwrap();

    let mut skip = (*head).clone();
    skip.revision = 2;
    let err = ledger.store().commit_delta(&head, skip).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidArgument(_)));

    let mut foreign = (*head).clone();
    foreign.id = TransactionId::new();
    foreign.revision = 1;
    let err = ledger.store().commit_delta(&head, foreign).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidArgument(_)));

    assert_eq!(ledger.fetch(id, None).unwrap().revision(), 0);
}

// ============================================================================
// Children
// ============================================================================

#[test]
fn child_links_to_parent_revision() {
    let ledger = ledger();
    let mut parent = ledger.start_transaction(None).unwrap();
    parent
        .apply(&TransactionMutableData::new().payload(json!({ "amount": 100 })))
        .unwrap();

    let refund = parent
        .create_child(
            &TransactionMutableData::new()
                .payload(json!({ "refund": 40 }))
                .state(TransactionState::Authorized),
        )
        .unwrap();
    let capture = parent
        .create_child(&TransactionMutableData::new().state(TransactionState::Completed))
        .unwrap();
    let parent = parent.unlock().unwrap();

    assert_eq!(refund.revision(), GENESIS_REVISION);
    assert_eq!(
        refund.parent(),
        Some(TransactionRevision::new(parent.id(), 1))
    );

    let all = parent.children(&[]);
    assert_eq!(all.len(), 2);
    let authorized = parent.children(&[TransactionState::Authorized]);
    assert_eq!(authorized.len(), 1);
    assert_eq!(authorized[0].id(), refund.id());

    // a child's later revisions keep it attached
    ledger
        .update(capture.id(), |_| {
            Ok(TransactionMutableData::new().state(TransactionState::Authorized))
        })
        .unwrap();
    assert_eq!(parent.children(&[TransactionState::Authorized]).len(), 2);
}

// ============================================================================
// Locks
// ============================================================================

#[test]
fn lock_holder_excludes_other_writers() {
    let ledger = ledger();
    let id = ledger.start_transaction(None).unwrap().unlock().unwrap().id();
    let held = ledger.continue_transaction(id, None, None).unwrap();

    let err = ledger
        .continue_transaction(id, None, Some(Duration::from_millis(10)))
        .unwrap_err();
    assert!(err.is_timeout());

    held.unlock().unwrap();
    assert!(ledger
        .continue_transaction(id, None, Some(Duration::from_millis(10)))
        .is_ok());
}

#[test]
fn concurrent_starts_on_one_id_yield_one_chain() {
    const THREADS: usize = 8;
    let ledger = Arc::new(ledger());
    let id = TransactionId::new();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                ledger
                    .start_transaction(Some(id))
                    .and_then(|tx| tx.unlock())
                    .is_ok()
            })
        })
        .collect();

    let created = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(created, 1);
    assert_eq!(ledger.store().get_chain(id).unwrap().len(), 1);
    assert!(!ledger.store().is_locked(id));
}
