//! Ledger facade
//!
//! Wires the in-memory store, the delta factory and the processor together
//! under one [`LedgerConfig`]:
//!
//! ```text
//! Ledger
//!   ├── Arc<MemoryStore>        chains, locks, expiry index, observers
//!   ├── TransactionFactory      start / continue / delta / child
//!   └── start_processor(...)    ProcessorHandle (background threads)
//! ```

use crate::config::{LedgerConfig, CONFIG_FILE_NAME};
use crate::processor::{ProcessorHandle, TransactionProcessor};
use crate::script::ScriptRunner;
use ledger_concurrency::{LockedTransaction, Transaction, TransactionFactory};
use ledger_core::{
    CancellationToken, CommitObserver, LedgerResult, Subscription, TransactionData,
    TransactionId, TransactionMutableData, TransactionPredicate, TransactionQuery,
    TransactionStore,
};
use ledger_storage::MemoryStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// An open ledger
pub struct Ledger {
    store: Arc<MemoryStore>,
    factory: TransactionFactory,
    config: LedgerConfig,
}

impl Ledger {
    /// Open an empty ledger with `config`
    ///
    /// # Errors
    ///
    /// `Config` if the configuration fails validation.
    pub fn open(config: LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;
        info!(
            target: "ledger::store",
            workers = config.processor.workers,
            processor = config.processor.enabled,
            "Opened ledger"
        );
        Ok(Self::with_config(config))
    }

    /// Open an empty ledger with default settings
    pub fn ephemeral() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    fn with_config(config: LedgerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let shared: Arc<dyn TransactionStore> = store.clone();
        let factory = TransactionFactory::new(shared)
            .with_lock_timeout(Some(config.locks.default_timeout()));
        Self {
            store,
            factory,
            config,
        }
    }

    /// Open with `ledger.toml` from `dir`, creating the default file first
    /// if the directory has none
    pub fn open_dir<P: AsRef<Path>>(dir: P) -> LedgerResult<Self> {
        let path = dir.as_ref().join(CONFIG_FILE_NAME);
        LedgerConfig::write_default_if_missing(&path)?;
        Self::open(LedgerConfig::from_file(&path)?)
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Factory bound to this ledger's store and lock timeout
    pub fn factory(&self) -> &TransactionFactory {
        &self.factory
    }

    /// Settings in effect
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Processor over this ledger, not yet running
    pub fn processor(&self, runner: Arc<dyn ScriptRunner>) -> TransactionProcessor {
        TransactionProcessor::new(self.factory.clone(), runner)
            .with_config(self.config.processor.clone())
    }

    /// Spawn `processor.workers` processor threads
    ///
    /// Returns a disabled handle when `processor.enabled` is false.
    pub fn start_processor(&self, runner: Arc<dyn ScriptRunner>) -> LedgerResult<ProcessorHandle> {
        if !self.config.processor.enabled {
            info!(target: "ledger::processor", "Processor disabled by configuration");
            return Ok(ProcessorHandle::disabled());
        }
        self.processor(runner).spawn(self.config.processor.workers)
    }

    /// See [`TransactionFactory::start_transaction`]
    pub fn start_transaction(&self, id: Option<TransactionId>) -> LedgerResult<LockedTransaction> {
        self.factory.start_transaction(id)
    }

    /// See [`TransactionFactory::continue_transaction`]
    pub fn continue_transaction(
        &self,
        id: TransactionId,
        revision: Option<u64>,
        timeout: Option<Duration>,
    ) -> LedgerResult<LockedTransaction> {
        self.factory.continue_transaction(id, revision, timeout)
    }

    /// Read-modify-write under the configured `[retry]` policy
    pub fn update<F>(&self, id: TransactionId, f: F) -> LedgerResult<Transaction>
    where
        F: FnMut(&Transaction) -> LedgerResult<TransactionMutableData>,
    {
        self.factory.update_with_retry(id, &self.config.retry, f)
    }

    /// Head, or `revision` when given
    pub fn fetch(&self, id: TransactionId, revision: Option<u64>) -> LedgerResult<Transaction> {
        self.factory.fetch(id, revision)
    }

    /// Block until a commit matches `predicate`
    pub fn wait_for(
        &self,
        predicate: TransactionPredicate,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> LedgerResult<Option<Arc<TransactionData>>> {
        self.store.wait_for(predicate, timeout, cancel)
    }

    /// View over every head
    pub fn query(&self) -> TransactionQuery {
        self.store.query()
    }

    /// Observe every commit
    pub fn subscribe(&self, observer: CommitObserver) -> Subscription {
        self.store.subscribe(observer)
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("chains", &self.store.len())
            .field("config", &self.config)
            .finish()
    }
}
