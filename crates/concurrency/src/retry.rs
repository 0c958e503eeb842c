//! Backoff policy for `update_with_retry`
//!
//! Loaded from the `[retry]` table of `ledger.toml`. A writer that loses an
//! optimistic commit waits `base_delay_ms * 2^attempt` (capped at
//! `max_delay_ms`) and then rebuilds its patch against the new head.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How often and how patiently a conflicting writer tries again
///
/// Only `Conflict` is ever retried.
///
/// ```ignore
/// let retry = RetryConfig::new().with_retries(5);
/// factory.update_with_retry(id, &retry, |tx| Ok(patch_for(tx)))?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Commits attempted after the first one lost a race
    pub max_retries: usize,
    /// Wait before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on any single wait, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// The `[retry]` defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Surface the first `Conflict` to the caller
    pub fn disabled() -> Self {
        Self::new().with_retries(0)
    }

    /// Set `max_retries`
    pub fn with_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the first wait and the cap, both in milliseconds
    pub fn with_backoff(mut self, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Whether a writer that has already retried `attempt` times may go again
    pub fn allows(&self, attempt: usize) -> bool {
        attempt < self.max_retries
    }

    /// Wait before retry number `attempt`, counting from zero
    pub fn backoff(&self, attempt: usize) -> Duration {
        let cap = Duration::from_millis(self.max_delay_ms);
        if self.base_delay_ms == 0 {
            return Duration::ZERO;
        }
        u32::try_from(attempt)
            .ok()
            .and_then(|n| 2u32.checked_pow(n))
            .and_then(|factor| Duration::from_millis(self.base_delay_ms).checked_mul(factor))
            .map_or(cap, |wait| wait.min(cap))
    }
}
