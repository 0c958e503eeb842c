//! Ledger Integration Tests
//!
//! End-to-end scenarios through the `Ledger` facade: chain semantics,
//! observers, configuration and the background processor.

#[path = "../common/mod.rs"]
mod common;

mod chains;
mod config;
mod observers;
mod processor;
