//! Transaction processor
//!
//! Drives every transaction whose expiry has elapsed through one scripted
//! evaluation step:
//!
//! 1. block in `get_expiring_transactions` until work exists
//! 2. `try_lock` each due transaction; skip it if another actor holds it
//! 3. re-fetch the head under the lock and re-check that it is still due
//! 4. with a script: run it and commit the returned patch as a delta
//! 5. without a script: commit an expiry delta clearing `script`/`expires`
//! 6. on script failure: commit a `Failed` revision; if that commit fails
//!    too, record the failure as an orphan chain parented to the last known
//!    revision
//!
//! The processor enforces no state-machine policy; transitions are whatever
//! the script's patch says. Several processors may run against one store:
//! the non-blocking `try_lock` keeps them off each other's transactions.

use crate::config::ProcessorConfig;
use crate::metrics::{ProcessorMetrics, ProcessorStats, TickReport};
use crate::script::ScriptRunner;
use ledger_concurrency::{DeltaKind, Transaction, TransactionFactory, TransactionLock};
use ledger_core::{
    CancellationToken, LedgerError, LedgerResult, LockFlags, ScriptError, Timestamp,
    TransactionData, TransactionMutableData, TransactionState,
};
use parking_lot::Mutex;
use serde_json::json;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Processed,
    Skipped,
    Failed,
    Orphaned,
}

/// Background driver for expiring transactions
pub struct TransactionProcessor {
    factory: TransactionFactory,
    runner: Arc<dyn ScriptRunner>,
    config: ProcessorConfig,
    metrics: Arc<ProcessorMetrics>,
}

impl TransactionProcessor {
    /// Processor with the default `[processor]` settings
    pub fn new(factory: TransactionFactory, runner: Arc<dyn ScriptRunner>) -> Self {
        Self {
            factory,
            runner,
            config: ProcessorConfig::default(),
            metrics: Arc::new(ProcessorMetrics::new()),
        }
    }

    /// Override the `[processor]` settings
    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Settings in effect
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Cumulative counters
    pub fn stats(&self) -> ProcessorStats {
        self.metrics.snapshot()
    }

    /// One pass over the transactions due now
    ///
    /// Blocks until at least one transaction is due or `cancel` fires; a
    /// cancelled tick returns an empty report.
    pub fn tick(&self, cancel: &CancellationToken) -> LedgerResult<TickReport> {
        let due = self
            .factory
            .store()
            .get_expiring_transactions(Timestamp::now(), cancel)?;

        let mut report = TickReport::default();
        for data in due {
            if cancel.is_cancelled() {
                break;
            }
            match self.process(data, cancel) {
                Outcome::Processed => report.processed += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Orphaned => report.orphaned += 1,
            }
        }

        self.metrics.record_tick(&report);
        if report.total() > 0 {
            debug!(
                target: "ledger::processor",
                processed = report.processed,
                skipped = report.skipped,
                failed = report.failed,
                orphaned = report.orphaned,
                "Tick complete"
            );
        }
        Ok(report)
    }

    /// Loop over [`tick`](Self::tick) until `cancel` fires
    pub fn run(&self, cancel: &CancellationToken) {
        info!(target: "ledger::processor", "Processor started");
        while !cancel.is_cancelled() {
            match self.tick(cancel) {
                Ok(report) if report.did_work() => {}
                Ok(_) => {
                    cancel.sleep(self.config.idle_backoff());
                }
                Err(e) => {
                    error!(target: "ledger::processor", error = %e, "Tick failed");
                    cancel.sleep(self.config.idle_backoff());
                }
            }
            thread::yield_now();
        }
        info!(target: "ledger::processor", "Processor stopped");
    }

    /// Run on `workers` named threads until the handle shuts down
    ///
    /// # Errors
    ///
    /// `Internal` if a thread cannot be spawned; threads already started
    /// are stopped first.
    pub fn spawn(self, workers: usize) -> LedgerResult<ProcessorHandle> {
        let processor = Arc::new(self);
        let handle = ProcessorHandle {
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::with_capacity(workers)),
            metrics: Some(Arc::clone(&processor.metrics)),
        };

        for i in 0..workers.max(1) {
            let worker = Arc::clone(&processor);
            let cancel = handle.cancel.clone();
            let spawned = thread::Builder::new()
                .name(format!("ledger-processor-{}", i))
                .spawn(move || worker.run(&cancel));
            match spawned {
                Ok(join) => handle.workers.lock().push(join),
                Err(e) => {
                    handle.shutdown();
                    return Err(LedgerError::Internal(format!(
                        "failed to spawn processor thread: {}",
                        e
                    )));
                }
            }
        }
        Ok(handle)
    }

    fn process(&self, data: Arc<TransactionData>, cancel: &CancellationToken) -> Outcome {
        let id = data.id;
        let lock = match TransactionLock::try_acquire(
            Arc::clone(self.factory.store()),
            id,
            LockFlags::NONE,
            Some(self.config.lock_timeout()),
            cancel,
        ) {
            Ok(Some(lock)) => lock,
            Ok(None) => return Outcome::Skipped,
            Err(e) => {
                if !e.is_cancelled() {
                    warn!(target: "ledger::processor", %id, error = %e, "Lock failed");
                }
                return Outcome::Skipped;
            }
        };

        // The snapshot from the expiry scan may be stale by now.
        let head = match self.factory.fetch(id, None) {
            Ok(head) => head,
            Err(e) => {
                warn!(target: "ledger::processor", %id, error = %e, "Fetch failed");
                return Outcome::Skipped;
            }
        };
        if !head.is_due(Timestamp::now()) {
            return Outcome::Skipped;
        }

        let outcome = match head.script() {
            Some(script) => self.evaluate(&head, script),
            None => self.retire(&head),
        };
        drop(lock);
        outcome
    }

    fn retire(&self, head: &Transaction) -> Outcome {
        let patch = TransactionMutableData::new().clear_script();
        match self.factory.expire(head, &patch) {
            Ok(_) => Outcome::Processed,
            Err(e) => {
                self.log_lost_race(head, &e);
                Outcome::Skipped
            }
        }
    }

    fn evaluate(&self, head: &Transaction, script: &str) -> Outcome {
        self.metrics.record_script_run();
        let result = catch_unwind(AssertUnwindSafe(|| self.runner.run(script, head)))
            .unwrap_or_else(|panic| Err(ScriptError::panicked(panic_message(panic.as_ref()))));

        match result {
            Ok(patch) => match self.factory.create_delta(head, &patch, DeltaKind::Revision) {
                Ok(next) => {
                    debug!(
                        target: "ledger::processor",
                        id = %next.id(),
                        revision = next.revision(),
                        state = %next.state(),
                        "Script applied"
                    );
                    Outcome::Processed
                }
                Err(e) if e.is_conflict() => {
                    self.log_lost_race(head, &e);
                    Outcome::Skipped
                }
                Err(e) => self.fail(head, ScriptError::new(e.to_string())),
            },
            Err(err) => self.fail(head, err),
        }
    }

    fn fail(&self, head: &Transaction, err: ScriptError) -> Outcome {
        warn!(
            target: "ledger::processor",
            id = %head.id(),
            revision = head.revision(),
            panicked = err.panicked,
            error = %err,
            "Script failed"
        );

        let failed = TransactionMutableData::new()
            .state(TransactionState::Failed)
            .error(err.to_json())
            .clear_script();
        let commit_err = match self.factory.expire(head, &failed) {
            Ok(_) => return Outcome::Failed,
            Err(e) => e,
        };

        // Never retried: the failure is parked on a chain nobody else owns.
        let orphan = TransactionMutableData::new()
            .state(TransactionState::Failed)
            .payload(json!({ "failure": "optimistic" }))
            .error(err.to_json())
            .clear_expires();
        match self.factory.create_child(head, &orphan) {
            Ok(child) => {
                warn!(
                    target: "ledger::processor",
                    id = %head.id(),
                    orphan = %child.id(),
                    error = %commit_err,
                    "Failure commit rejected; recorded orphan"
                );
                Outcome::Orphaned
            }
            Err(e) => {
                error!(
                    target: "ledger::processor",
                    id = %head.id(),
                    revision = head.revision(),
                    error = %e,
                    script_error = %err,
                    "Failed to record script failure"
                );
                Outcome::Failed
            }
        }
    }

    fn log_lost_race(&self, head: &Transaction, e: &LedgerError) {
        if e.is_conflict() {
            debug!(target: "ledger::processor", id = %head.id(), error = %e, "Newer revision wins");
        } else {
            warn!(target: "ledger::processor", id = %head.id(), error = %e, "Commit failed");
        }
    }
}

impl std::fmt::Debug for TransactionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionProcessor")
            .field("config", &self.config)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "(non-string panic)".to_string())
}

/// Running processor threads
///
/// Dropping the handle shuts the threads down.
pub struct ProcessorHandle {
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: Option<Arc<ProcessorMetrics>>,
}

impl ProcessorHandle {
    /// Handle for a processor that was never started
    pub fn disabled() -> Self {
        Self {
            cancel: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            metrics: None,
        }
    }

    /// Whether worker threads were started and not yet shut down
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.workers.lock().is_empty()
    }

    /// Number of worker threads still attached
    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Cumulative counters (zero for a disabled handle)
    pub fn stats(&self) -> ProcessorStats {
        self.metrics
            .as_ref()
            .map(|m| m.snapshot())
            .unwrap_or_default()
    }

    /// Token the workers watch
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel and join every worker; idempotent
    pub fn shutdown(&self) {
        self.cancel.cancel();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                error!(target: "ledger::processor", "Processor thread panicked");
            }
        }
    }
}

impl Drop for ProcessorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ProcessorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorHandle")
            .field("workers", &self.worker_count())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
