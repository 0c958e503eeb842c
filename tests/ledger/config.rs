//! `ledger.toml` driving the facade

use crate::common::*;
use ledgerdb::{Ledger, LedgerConfig, LedgerError, RejectingRunner, CONFIG_FILE_NAME};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn open_dir_round_trips_custom_settings() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "[processor]\nworkers = 3\nidle_backoff_ms = 1\n\n[locks]\ndefault_timeout_ms = 15\n\n[retry]\nmax_retries = 0\n",
    )
    .unwrap();

    let ledger = Ledger::open_dir(dir.path()).unwrap();
    let config = ledger.config();
    assert_eq!(config.processor.workers, 3);
    assert_eq!(config.processor.idle_backoff(), Duration::from_millis(1));
    assert_eq!(config.retry.max_retries, 0);
    assert_eq!(ledger.factory().lock_timeout(), Some(Duration::from_millis(15)));

    let handle = ledger.start_processor(Arc::new(RejectingRunner)).unwrap();
    assert_eq!(handle.worker_count(), 3);
    handle.shutdown();
    assert_eq!(handle.worker_count(), 0);
}

#[test]
fn invalid_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[processor]\nworkers = 0\n").unwrap();

    let err = Ledger::open_dir(dir.path()).unwrap_err();
    assert!(matches!(err, LedgerError::Config(_)));
}

#[test]
fn disabled_processor_spawns_nothing() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[processor]\nenabled = false\n").unwrap();

    let ledger = Ledger::open_dir(dir.path()).unwrap();
    let handle = ledger.start_processor(completing_runner()).unwrap();
    assert!(!handle.is_running());
    assert_eq!(handle.worker_count(), 0);

    // nothing drives this transaction forward
    let id = create_due(ledger.store().as_ref(), Some("complete()"));
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(ledger.fetch(id, None).unwrap().revision(), 0);
}

#[test]
fn default_file_matches_default_config() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::open_dir(dir.path()).unwrap();
    assert_eq!(ledger.config(), &LedgerConfig::default());

    let written = std::fs::read_to_string(dir.path().join(CONFIG_FILE_NAME)).unwrap();
    assert_eq!(written, LedgerConfig::default_toml());
}
