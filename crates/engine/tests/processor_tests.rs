//! Processor behaviour against the in-memory store
//!
//! Covers the scripted happy path, the failure paths (including the orphan
//! chain written when the chain itself rejects the failure), cancellation
//! and several processors sharing one store.

use ledger_concurrency::{Transaction, TransactionFactory};
use ledger_core::{
    CancellationToken, CommitObserver, LedgerError, LedgerResult, LockFlags, ScriptError,
    StoreStats, Subscription, Timestamp, TransactionData, TransactionId, TransactionMutableData,
    TransactionPredicate, TransactionQuery, TransactionRevision, TransactionState,
    TransactionStore,
};
use ledger_engine::{ProcessorConfig, ScriptRunner, TransactionProcessor};
use ledger_storage::MemoryStore;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn runner<F>(f: F) -> Arc<dyn ScriptRunner>
where
    F: Fn(&str, &Transaction) -> Result<TransactionMutableData, ScriptError> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn create_due(store: &dyn TransactionStore, script: Option<&str>) -> TransactionId {
    let id = TransactionId::new();
    let now = Timestamp::now();
    let mut genesis = TransactionData::genesis(id)
        .with_created(now)
        .with_expires(now);
    genesis.script = script.map(str::to_string);
    store.create(genesis).unwrap();
    id
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let until = Instant::now() + deadline;
    while Instant::now() < until {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    done()
}

/// Delegates to a [`MemoryStore`] but refuses every `Failed` revision with a
/// conflict, as a backend would if another writer always got there first.
struct RejectFailures {
    inner: MemoryStore,
}

impl TransactionStore for RejectFailures {
    fn lock(
        &self,
        id: TransactionId,
        flags: LockFlags,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> LedgerResult<()> {
        self.inner.lock(id, flags, timeout, cancel)
    }

    fn try_lock(
        &self,
        id: TransactionId,
        flags: LockFlags,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> LedgerResult<bool> {
        self.inner.try_lock(id, flags, timeout, cancel)
    }

    fn free(&self, id: TransactionId) -> LedgerResult<()> {
        self.inner.free(id)
    }

    fn is_locked(&self, id: TransactionId) -> bool {
        self.inner.is_locked(id)
    }

    fn exists(&self, id: TransactionId) -> bool {
        self.inner.exists(id)
    }

    fn fetch(&self, id: TransactionId, revision: Option<u64>) -> LedgerResult<Arc<TransactionData>> {
        self.inner.fetch(id, revision)
    }

    fn create(&self, data: TransactionData) -> LedgerResult<Arc<TransactionData>> {
        self.inner.create(data)
    }

    fn commit_delta(
        &self,
        original: &TransactionData,
        next: TransactionData,
    ) -> LedgerResult<Arc<TransactionData>> {
        if next.state == TransactionState::Failed {
            return Err(LedgerError::Conflict {
                id: original.id,
                expected: original.revision,
                actual: original.revision + 1,
            });
        }
        self.inner.commit_delta(original, next)
    }

    fn get_chain(&self, id: TransactionId) -> LedgerResult<Vec<Arc<TransactionData>>> {
        self.inner.get_chain(id)
    }

    fn get_child_transactions(
        &self,
        id: TransactionId,
        states: &[TransactionState],
    ) -> Vec<Arc<TransactionData>> {
        self.inner.get_child_transactions(id, states)
    }

    fn get_expiring_transactions(
        &self,
        now: Timestamp,
        cancel: &CancellationToken,
    ) -> LedgerResult<Vec<Arc<TransactionData>>> {
        self.inner.get_expiring_transactions(now, cancel)
    }

    fn wait_for(
        &self,
        predicate: TransactionPredicate,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> LedgerResult<Option<Arc<TransactionData>>> {
        self.inner.wait_for(predicate, timeout, cancel)
    }

    fn query(&self) -> TransactionQuery {
        self.inner.query()
    }

    fn subscribe(&self, observer: CommitObserver) -> Subscription {
        self.inner.subscribe(observer)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn stats(&self) -> StoreStats {
        self.inner.stats()
    }
}

// ============================================================================
// Scripted evaluation
// ============================================================================

#[test]
fn test_processor_completes_expiring_transaction() {
    init_tracing();
    let store: Arc<dyn TransactionStore> = Arc::new(MemoryStore::new());
    let id = create_due(store.as_ref(), Some("complete()"));

    let processor = TransactionProcessor::new(
        TransactionFactory::new(Arc::clone(&store)),
        runner(|script, tx| {
            assert_eq!(script, "complete()");
            assert_eq!(tx.revision(), 0);
            Ok(TransactionMutableData::new()
                .state(TransactionState::Completed)
                .clear_expires())
        }),
    );

    let report = processor.tick(&CancellationToken::new()).unwrap();
    assert_eq!(report.processed, 1);

    let head = store.fetch(id, None).unwrap();
    assert_eq!(head.revision, 1);
    assert_eq!(head.state, TransactionState::Completed);
    assert_eq!(head.expires, None);
    assert_eq!(store.stats().pending_expiries, 0);
}

#[test]
fn test_script_keeping_expiry_is_reprocessed() {
    init_tracing();
    let store: Arc<dyn TransactionStore> = Arc::new(MemoryStore::new());
    let id = create_due(store.as_ref(), Some("count_to_three()"));

    // Leaving `expires` untouched schedules the next evaluation immediately.
    let processor = TransactionProcessor::new(
        TransactionFactory::new(Arc::clone(&store)),
        runner(|_, tx| {
            let count = tx.payload()["count"].as_u64().unwrap_or(0) + 1;
            let patch = TransactionMutableData::new().payload(json!({ "count": count }));
            if count >= 3 {
                Ok(patch.state(TransactionState::Completed).clear_expires())
            } else {
                Ok(patch)
            }
        }),
    );

    let cancel = CancellationToken::new();
    for _ in 0..3 {
        assert_eq!(processor.tick(&cancel).unwrap().processed, 1);
    }

    let head = store.fetch(id, None).unwrap();
    assert_eq!(head.revision, 3);
    assert_eq!(head.payload, json!({ "count": 3 }));
    assert_eq!(head.state, TransactionState::Completed);
    assert_eq!(processor.stats().scripts_run, 3);
}

#[test]
fn test_transaction_without_script_is_expired() {
    init_tracing();
    let store: Arc<dyn TransactionStore> = Arc::new(MemoryStore::new());
    let id = create_due(store.as_ref(), None);
    let expires = store.fetch(id, None).unwrap().expires;

    let processor = TransactionProcessor::new(
        TransactionFactory::new(Arc::clone(&store)),
        runner(|_, _| panic!("no script to run")),
    );
    assert_eq!(processor.tick(&CancellationToken::new()).unwrap().processed, 1);

    let head = store.fetch(id, None).unwrap();
    assert_eq!(head.revision, 1);
    assert_eq!(head.expires, None);
    assert_eq!(head.expired, expires);
    assert_eq!(head.state, TransactionState::Initialized);
}

// ============================================================================
// Failure handling
// ============================================================================

#[test]
fn test_failure_recorded_on_chain() {
    init_tracing();
    let store: Arc<dyn TransactionStore> = Arc::new(MemoryStore::new());
    let id = create_due(store.as_ref(), Some("throw()"));

    let processor = TransactionProcessor::new(
        TransactionFactory::new(Arc::clone(&store)),
        runner(|_, _| Err(ScriptError::new("card declined"))),
    );
    let report = processor.tick(&CancellationToken::new()).unwrap();
    assert_eq!(report.failed, 1);

    let head = store.fetch(id, None).unwrap();
    assert_eq!(head.revision, 1);
    assert_eq!(head.state, TransactionState::Failed);
    assert_eq!(head.error, Some(json!({ "message": "card declined" })));
    assert_eq!(head.script, None);
    assert!(head.expired.is_some());
    assert!(store.get_child_transactions(id, &[]).is_empty());
}

#[test]
fn test_failure_never_lost() {
    init_tracing();
    let store: Arc<dyn TransactionStore> = Arc::new(RejectFailures {
        inner: MemoryStore::new(),
    });
    let id = create_due(store.as_ref(), Some("throw()"));

    let processor = TransactionProcessor::new(
        TransactionFactory::new(Arc::clone(&store)),
        runner(|_, _| Err(ScriptError::new("always fails"))),
    );
    let report = processor.tick(&CancellationToken::new()).unwrap();
    assert_eq!(report.orphaned, 1);
    assert_eq!(processor.stats().orphaned, 1);

    // The chain itself never advanced.
    assert_eq!(store.fetch(id, None).unwrap().revision, 0);
    assert!(!store.is_locked(id));

    let orphans = store.get_child_transactions(id, &[TransactionState::Failed]);
    assert_eq!(orphans.len(), 1);
    let orphan = &orphans[0];
    assert_eq!(orphan.revision, 0);
    assert_eq!(orphan.parent, Some(TransactionRevision::new(id, 0)));
    assert_eq!(orphan.payload, json!({ "failure": "optimistic" }));
    assert_eq!(orphan.error, Some(json!({ "message": "always fails" })));
    assert_eq!(orphan.expires, None);

    let via_query = store.query().children_of(id).count();
    assert_eq!(via_query, 1);
}

#[test]
fn test_panicking_script_marks_failed() {
    init_tracing();
    let store: Arc<dyn TransactionStore> = Arc::new(MemoryStore::new());
    let id = create_due(store.as_ref(), Some("crash()"));

    let processor = TransactionProcessor::new(
        TransactionFactory::new(Arc::clone(&store)),
        runner(|_, _| panic!("interpreter state corrupted")),
    );
    let report = processor.tick(&CancellationToken::new()).unwrap();
    assert_eq!(report.failed, 1);

    let head = store.fetch(id, None).unwrap();
    assert_eq!(head.state, TransactionState::Failed);
    assert_eq!(
        head.error,
        Some(json!({ "message": "interpreter state corrupted", "panicked": true }))
    );
    assert!(!store.is_locked(id));
}

// ============================================================================
// Cancellation and concurrency
// ============================================================================

#[test]
fn test_run_returns_on_cancel() {
    init_tracing();
    let store: Arc<dyn TransactionStore> = Arc::new(MemoryStore::new());
    let processor = Arc::new(TransactionProcessor::new(
        TransactionFactory::new(Arc::clone(&store)),
        runner(|_, _| Ok(TransactionMutableData::new())),
    ));
    let cancel = CancellationToken::new();

    let handle = {
        let processor = Arc::clone(&processor);
        let cancel = cancel.clone();
        thread::spawn(move || processor.run(&cancel))
    };

    // blocked on an empty store
    thread::sleep(Duration::from_millis(20));
    let started = Instant::now();
    cancel.cancel();
    handle.join().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(store.len(), 0);
}

#[test]
fn test_locked_transaction_left_alone() {
    init_tracing();
    let store: Arc<dyn TransactionStore> = Arc::new(MemoryStore::new());
    let id = create_due(store.as_ref(), Some("complete()"));
    let factory = TransactionFactory::new(Arc::clone(&store));
    let held = factory.continue_transaction(id, None, None).unwrap();

    let processor = TransactionProcessor::new(
        factory.clone(),
        runner(|_, _| Ok(TransactionMutableData::new().clear_expires())),
    )
    .with_config(ProcessorConfig {
        lock_timeout_ms: 5,
        ..Default::default()
    });

    let report = processor.tick(&CancellationToken::new()).unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(processor.stats().scripts_run, 0);

    held.unlock().unwrap();
    assert_eq!(processor.tick(&CancellationToken::new()).unwrap().processed, 1);
}

#[test]
fn test_workers_process_each_transaction_once() {
    const TRANSACTIONS: usize = 50;
    init_tracing();

    let store: Arc<dyn TransactionStore> = Arc::new(MemoryStore::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let processor = TransactionProcessor::new(TransactionFactory::new(Arc::clone(&store)), {
        let calls = Arc::clone(&calls);
        runner(move |_, _| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(TransactionMutableData::new()
                .state(TransactionState::Completed)
                .clear_expires())
        })
    });
    let handle = processor.spawn(4).unwrap();

    let ids: Vec<_> = (0..TRANSACTIONS)
        .map(|_| create_due(store.as_ref(), Some("complete()")))
        .collect();

    let finished = wait_until(Duration::from_secs(10), || {
        store
            .query()
            .with_state(TransactionState::Completed)
            .count()
            == TRANSACTIONS
    });
    handle.shutdown();
    assert!(finished);

    assert_eq!(calls.load(Ordering::SeqCst), TRANSACTIONS);
    for id in ids {
        assert_eq!(store.fetch(id, None).unwrap().revision, 1);
        assert!(!store.is_locked(id));
    }
    assert_eq!(handle.stats().processed, TRANSACTIONS as u64);
}
