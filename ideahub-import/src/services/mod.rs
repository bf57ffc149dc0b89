//! Import engine services
//!
//! Bottom-up: spreadsheet parsing, row transformation, the record sink
//! contract, per-job ledger, worker pool, job registry, and the coordinator
//! that wires them together.

pub mod import_coordinator;
pub mod job_ledger;
pub mod job_registry;
pub mod record_sink;
pub mod row_transformer;
pub mod spreadsheet;
pub mod worker_pool;

pub use import_coordinator::{ImportCoordinator, SubmitError};
pub use job_ledger::{JobLedger, LedgerError, LedgerLimits, RunOutcome};
pub use job_registry::{CancelError, JobRegistry};
pub use record_sink::{RecordSink, RetryPolicy, RetryingSink, SinkError};
pub use row_transformer::{RowError, RowTransformer};
pub use spreadsheet::{parse_source, ParsedSheet, RawRow, SourceError};
pub use worker_pool::{PoolReport, WorkerPool};
