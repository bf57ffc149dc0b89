//! Import job state machine and poller-facing view
//!
//! A job progresses `QUEUED → PROCESSING → {COMPLETED | FAILED}`.
//! Partial row failure is not job failure: a job whose every row was
//! rejected still ends `COMPLETED`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job-level status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Rows parsed, ledger registered, no worker started yet
    Queued,
    /// Worker pool running
    Processing,
    /// Every dispatched row accounted for (or cancellation drained)
    Completed,
    /// Job-level catastrophe: unreadable file, no rows, panic, timeout
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self → next` is a legal forward transition
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detected spreadsheet format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Xls,
    Xlsx,
}

impl SourceFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Xls => "xls",
            SourceFormat::Xlsx => "xlsx",
        }
    }
}

/// Facts about the uploaded file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMeta {
    pub filename: String,
    /// `None` when the file could not be identified at all
    pub format: Option<SourceFormat>,
    pub row_count: usize,
    pub column_count: usize,
}

impl SourceMeta {
    pub fn unidentified(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            format: None,
            row_count: 0,
            column_count: 0,
        }
    }
}

/// One stored row failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    /// 1-based data row number in the source file
    pub row: usize,
    pub error: String,
}

/// Lightweight reference to a created record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    pub id: String,
    pub slug: String,
}

/// Consistent point-in-time copy of a job ledger, serialized to pollers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobView {
    pub id: Uuid,
    pub status: JobStatus,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub successful_rows: usize,
    pub failed_rows: usize,
    /// Percentage of rows processed (0.0 - 100.0)
    pub percentage: f64,
    pub errors: Vec<RowFailure>,
    pub results: Vec<RecordRef>,
    /// Row failures counted but not stored because the error log was full
    pub omitted_errors: usize,
    /// Created records not listed because the result log was full
    pub omitted_results: usize,
    /// Top-level message for a `failed` job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set once a cancel request has been accepted; on a completed job, only
    /// if the cancel stopped dispatch before every row was taken
    pub cancel_requested: bool,
    pub source: SourceMeta,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportJobView {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
