//! Configuration for ideahub-import
//!
//! Bootstrap TOML (`ideahub-import.toml`) with built-in defaults for every
//! key. Command-line flags override `port` and `database_path`.
//!
//! ```toml
//! port = 5790
//! database_path = "/var/lib/ideahub/ideahub.db"
//!
//! [import]
//! workers = 8
//! max_stored_errors = 100
//!
//! [import.retry]
//! max_attempts = 2
//! backoff_ms = 250
//!
//! [logging]
//! level = "info"
//! ```

use crate::services::job_ledger::LedgerLimits;
use crate::services::record_sink::RetryPolicy;
use ideahub_common::config::LoggingConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5790;

/// Top-level bootstrap file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServiceConfig {
    /// HTTP port (default 5790)
    #[serde(default)]
    pub port: Option<u16>,

    /// SQLite database file; defaults to `<data folder>/ideahub.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub import: ImportSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Import engine tuning
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImportSettings {
    /// Concurrent row workers per job (W)
    pub workers: usize,
    pub max_stored_errors: usize,
    pub max_stored_results: usize,
    /// Stored error messages are truncated to this many characters
    pub max_error_length: usize,
    /// How long a finished job stays pollable
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
    /// Wall-clock limit per job
    pub job_timeout_secs: u64,
    pub max_upload_bytes: usize,
    pub retry: RetrySettings,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            workers: 8,
            max_stored_errors: 100,
            max_stored_results: 1000,
            max_error_length: 300,
            retention_secs: 24 * 60 * 60,
            sweep_interval_secs: 60,
            job_timeout_secs: 30 * 60,
            max_upload_bytes: 25 * 1024 * 1024,
            retry: RetrySettings::default(),
        }
    }
}

impl ImportSettings {
    pub fn ledger_limits(&self) -> LedgerLimits {
        LedgerLimits {
            max_stored_errors: self.max_stored_errors,
            max_stored_results: self.max_stored_results,
            max_error_length: self.max_error_length.max(1),
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

/// Retry for transient sink failures
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per row including the first; 1 disables retry
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            backoff_ms: policy.backoff.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}
