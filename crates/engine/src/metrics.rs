//! Processor metrics
//!
//! Counters use Relaxed ordering: they are observational only and never
//! synchronise other memory.

use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome counts for one processor tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Transactions advanced by a script or an expiry delta
    pub processed: usize,
    /// Transactions skipped (locked elsewhere, no longer due, lost a race)
    pub skipped: usize,
    /// Script failures recorded as `Failed` revisions
    pub failed: usize,
    /// Failures recorded as orphan chains
    pub orphaned: usize,
}

impl TickReport {
    /// Whether the tick committed anything
    pub fn did_work(&self) -> bool {
        self.processed + self.failed + self.orphaned > 0
    }

    /// Transactions looked at
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.failed + self.orphaned
    }
}

/// Snapshot of [`ProcessorMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Ticks completed
    pub ticks: u64,
    /// Transactions advanced
    pub processed: u64,
    /// Transactions skipped
    pub skipped: u64,
    /// Script runs (successful or not)
    pub scripts_run: u64,
    /// Failures recorded on the chain
    pub failed: u64,
    /// Failures recorded as orphan chains
    pub orphaned: u64,
}

/// Cumulative processor counters, shared by every worker
#[derive(Debug, Default)]
pub struct ProcessorMetrics {
    ticks: AtomicU64,
    processed: AtomicU64,
    skipped: AtomicU64,
    scripts_run: AtomicU64,
    failed: AtomicU64,
    orphaned: AtomicU64,
}

impl ProcessorMetrics {
    /// Zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_tick(&self, report: &TickReport) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.processed
            .fetch_add(report.processed as u64, Ordering::Relaxed);
        self.skipped.fetch_add(report.skipped as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
        self.orphaned
            .fetch_add(report.orphaned as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_script_run(&self) {
        self.scripts_run.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values
    pub fn snapshot(&self) -> ProcessorStats {
        ProcessorStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            scripts_run: self.scripts_run.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            orphaned: self.orphaned.load(Ordering::Relaxed),
        }
    }
}
