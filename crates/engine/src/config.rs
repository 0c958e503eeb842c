//! Ledger configuration via `ledger.toml`
//!
//! Every field has a default, so an empty file (or no file at all) yields
//! a working configuration. Sections that are absent keep their defaults.

use ledger_concurrency::RetryConfig;
use ledger_core::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "ledger.toml";

/// `[processor]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Spawn processor threads when `Ledger::start_processor` is called
    pub enabled: bool,
    /// `try_lock` timeout per expiring transaction
    pub lock_timeout_ms: u64,
    /// Pause after a tick that processed nothing
    pub idle_backoff_ms: u64,
    /// Concurrent processor threads
    pub workers: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lock_timeout_ms: 0,
            idle_backoff_ms: 10,
            workers: 1,
        }
    }
}

impl ProcessorConfig {
    /// `lock_timeout_ms` as a duration
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// `idle_backoff_ms` as a duration
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

/// `[locks]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Timeout used by `continue_transaction` when the caller passes none
    pub default_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5000,
        }
    }
}

impl LockConfig {
    /// `default_timeout_ms` as a duration
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Ledger configuration loaded from `ledger.toml`
///
/// # Example
///
/// ```toml
/// [processor]
/// workers = 2
///
/// [retry]
/// max_retries = 5
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Background processor settings
    pub processor: ProcessorConfig,
    /// Lock settings
    pub locks: LockConfig,
    /// Retry-on-conflict policy
    pub retry: RetryConfig,
}

impl LedgerConfig {
    /// Reject values that parse but cannot work
    ///
    /// # Errors
    ///
    /// `Config` when `processor.workers` is zero or the retry delays are
    /// inverted.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.processor.workers == 0 {
            return Err(LedgerError::Config(
                "processor.workers must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(LedgerError::Config(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Ledger configuration

[processor]
# Spawn processor threads when the ledger starts its processor
enabled = true
# tryLock timeout per expiring transaction (0 = skip if busy)
lock_timeout_ms = 0
# Pause after a tick that processed nothing
idle_backoff_ms = 10
# Concurrent processor threads (safe: busy transactions are skipped)
workers = 1

[locks]
# Timeout used by continue_transaction when none is given
default_timeout_ms = 5000

[retry]
max_retries = 3
base_delay_ms = 10
max_delay_ms = 100
"#
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    ///
    /// `Config` on a parse or validation failure.
    pub fn from_toml_str(content: &str) -> LedgerResult<Self> {
        let config: LedgerConfig = toml::from_str(content)
            .map_err(|e| LedgerError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> LedgerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            LedgerError::Config(msg) => {
                LedgerError::Config(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> LedgerResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                LedgerError::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> LedgerResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| LedgerError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            LedgerError::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
