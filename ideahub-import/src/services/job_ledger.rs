//! Job ledger
//!
//! Mutable aggregate state for one import job. All counters live behind a
//! single lock and are only changed through the methods below, so each
//! observation satisfies `successful + failed == processed <= total`.
//! Workers hold the lock only for the counter/array update itself.

use crate::models::{ImportJobView, JobStatus, RecordRef, RowFailure, SourceMeta};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Bounds on what a ledger keeps in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerLimits {
    pub max_stored_errors: usize,
    pub max_stored_results: usize,
    /// Error messages longer than this (in chars) are truncated
    pub max_error_length: usize,
}

impl Default for LedgerLimits {
    fn default() -> Self {
        Self {
            max_stored_errors: 100,
            max_stored_results: 1000,
            max_error_length: 300,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("illegal status transition {from} -> {to}")]
    IllegalTransition { from: JobStatus, to: JobStatus },

    #[error("job is {0}, row outcomes are not accepted")]
    NotAccepting(JobStatus),

    #[error("all {0} rows are already accounted for")]
    Overflow(usize),

    #[error("job already finished as {0}")]
    AlreadyTerminal(JobStatus),
}

/// How the worker pool ended, passed to [`JobLedger::finalize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every row was dispatched
    Drained,
    /// Cancellation stopped dispatch early
    Cancelled,
}

#[derive(Debug)]
struct LedgerState {
    status: JobStatus,
    total_rows: usize,
    processed_rows: usize,
    successful_rows: usize,
    failed_rows: usize,
    errors: Vec<RowFailure>,
    results: Vec<RecordRef>,
    failure_reason: Option<String>,
    cancel_requested: bool,
    updated_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl LedgerState {
    fn transition(&mut self, to: JobStatus) -> Result<(), LedgerError> {
        if !self.status.can_transition_to(to) {
            return Err(LedgerError::IllegalTransition {
                from: self.status,
                to,
            });
        }
        let now = Utc::now();
        self.status = to;
        self.updated_at = now;
        if to.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    fn accept_row(&mut self) -> Result<(), LedgerError> {
        if self.status != JobStatus::Processing {
            return Err(LedgerError::NotAccepting(self.status));
        }
        if self.processed_rows >= self.total_rows {
            return Err(LedgerError::Overflow(self.total_rows));
        }
        self.processed_rows += 1;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Concurrency-safe ledger for one job
#[derive(Debug)]
pub struct JobLedger {
    id: Uuid,
    source: SourceMeta,
    limits: LedgerLimits,
    created_at: DateTime<Utc>,
    state: RwLock<LedgerState>,
}

impl JobLedger {
    /// New ledger in `queued` with `total_rows` fixed
    pub fn new(id: Uuid, source: SourceMeta, total_rows: usize, limits: LedgerLimits) -> Self {
        let now = Utc::now();
        Self {
            id,
            source,
            limits,
            created_at: now,
            state: RwLock::new(LedgerState {
                status: JobStatus::Queued,
                total_rows,
                processed_rows: 0,
                successful_rows: 0,
                failed_rows: 0,
                errors: Vec::new(),
                results: Vec::new(),
                failure_reason: None,
                cancel_requested: false,
                updated_at: now,
                finished_at: None,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn limits(&self) -> LedgerLimits {
        self.limits
    }

    pub async fn status(&self) -> JobStatus {
        self.state.read().await.status
    }

    pub async fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.finished_at
    }

    /// `queued → processing`
    pub async fn start(&self) -> Result<(), LedgerError> {
        self.state.write().await.transition(JobStatus::Processing)
    }

    /// Count one created record
    pub async fn record_success(&self, row: usize, reference: RecordRef) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        state.accept_row()?;
        state.successful_rows += 1;
        if state.results.len() < self.limits.max_stored_results {
            state.results.push(reference);
        }
        tracing::trace!(job_id = %self.id, row, "Row succeeded");
        Ok(())
    }

    /// Count one failed row; the message is stored truncated while the log has room
    pub async fn record_failure(&self, row: usize, message: &str) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        state.accept_row()?;
        state.failed_rows += 1;
        if state.errors.len() < self.limits.max_stored_errors {
            state.errors.push(RowFailure {
                row,
                error: truncate_message(message, self.limits.max_error_length),
            });
        }
        Ok(())
    }

    /// `processing → completed`; partial row failure still completes
    pub async fn finalize(&self, outcome: RunOutcome) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        if outcome == RunOutcome::Drained && state.processed_rows < state.total_rows {
            tracing::warn!(
                job_id = %self.id,
                processed = state.processed_rows,
                total = state.total_rows,
                "Finalizing with unaccounted rows"
            );
        }
        // The flag reports a cancel that stopped dispatch; a late one is dropped
        state.cancel_requested = outcome == RunOutcome::Cancelled;
        state.transition(JobStatus::Completed)
    }

    /// `queued|processing → failed` with a single top-level reason
    pub async fn fail(&self, reason: &str) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        state.transition(JobStatus::Failed)?;
        state.failure_reason = Some(truncate_message(reason, self.limits.max_error_length));
        Ok(())
    }

    /// Mark that a cancel request was accepted
    pub async fn request_cancel(&self) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        if state.status.is_terminal() {
            return Err(LedgerError::AlreadyTerminal(state.status));
        }
        state.cancel_requested = true;
        state.updated_at = Utc::now();
        Ok(())
    }

    /// Race-free copy of every field
    pub async fn snapshot(&self) -> ImportJobView {
        let state = self.state.read().await;
        let percentage = if state.total_rows > 0 {
            (state.processed_rows as f64 / state.total_rows as f64) * 100.0
        } else {
            0.0
        };

        ImportJobView {
            id: self.id,
            status: state.status,
            total_rows: state.total_rows,
            processed_rows: state.processed_rows,
            successful_rows: state.successful_rows,
            failed_rows: state.failed_rows,
            percentage,
            errors: state.errors.clone(),
            results: state.results.clone(),
            omitted_errors: state.failed_rows - state.errors.len(),
            omitted_results: state.successful_rows - state.results.len(),
            error: state.failure_reason.clone(),
            cancel_requested: state.cancel_requested,
            source: self.source.clone(),
            created_at: self.created_at,
            updated_at: state.updated_at,
            finished_at: state.finished_at,
        }
    }
}

/// Cut `message` to at most `max_chars` characters, marking the cut with `…`
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = message.chars().take(keep).collect();
    out.push('…');
    out
}
