//! Import coordinator
//!
//! Drives one job end to end:
//!
//! ```text
//! submit ──parse──▶ QUEUED ──spawn pool──▶ PROCESSING ──drained/cancelled──▶ COMPLETED
//!    │                                          │
//!    └─unreadable / no rows──▶ FAILED ◀──panic / timeout
//! ```
//!
//! `submit` is synchronous only through parsing and registration; the pool
//! runs detached and callers poll `status`.

use crate::config::ImportSettings;
use crate::models::{ImportJobView, SourceMeta};
use crate::services::job_ledger::{JobLedger, LedgerLimits, RunOutcome};
use crate::services::job_registry::{CancelError, JobRegistry};
use crate::services::record_sink::RecordSink;
use crate::services::row_transformer::RowTransformer;
use crate::services::spreadsheet::{parse_source, RawRow, SourceError};
use crate::services::worker_pool::WorkerPool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How long in-flight rows may run after a job times out
const TIMEOUT_GRACE: Duration = Duration::from_secs(30);

/// Why `submit` could not start a job. Each variant carries the id of the
/// job registered as `failed` for the rejected file.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("could not read {filename}: {reason}")]
    Unreadable {
        job_id: Uuid,
        filename: String,
        reason: String,
    },

    #[error("{filename} contains no data rows")]
    NoRows { job_id: Uuid, filename: String },

    #[error("internal error: {reason}")]
    Internal { job_id: Uuid, reason: String },
}

impl SubmitError {
    /// Id of the `failed` job recorded for this submission
    pub fn job_id(&self) -> Uuid {
        match self {
            SubmitError::Unreadable { job_id, .. }
            | SubmitError::NoRows { job_id, .. }
            | SubmitError::Internal { job_id, .. } => *job_id,
        }
    }
}

#[derive(Clone)]
pub struct ImportCoordinator {
    registry: JobRegistry,
    sink: Arc<dyn RecordSink>,
    pool: WorkerPool,
    limits: LedgerLimits,
    /// Zero disables the limit
    job_timeout: Duration,
}

impl ImportCoordinator {
    pub fn new(registry: JobRegistry, sink: Arc<dyn RecordSink>, settings: &ImportSettings) -> Self {
        Self {
            registry,
            sink,
            pool: WorkerPool::new(settings.workers),
            limits: settings.ledger_limits(),
            job_timeout: settings.job_timeout(),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn workers(&self) -> usize {
        self.pool.workers()
    }

    /// Parse `bytes`, register the job and start processing in the background
    pub async fn submit(&self, bytes: Vec<u8>, filename: &str) -> Result<Uuid, SubmitError> {
        let job_id = Uuid::new_v4();
        let name = filename.to_string();

        let parsed = tokio::task::spawn_blocking(move || parse_source(&bytes, &name)).await;

        let sheet = match parsed {
            Ok(Ok(sheet)) => sheet,
            Ok(Err(source_error)) => {
                self.register_failed(job_id, filename, &source_error.to_string())
                    .await;
                tracing::warn!(%job_id, filename, error = %source_error, "Rejected import file");

                return Err(match source_error {
                    SourceError::NoRows => SubmitError::NoRows {
                        job_id,
                        filename: filename.to_string(),
                    },
                    other => SubmitError::Unreadable {
                        job_id,
                        filename: filename.to_string(),
                        reason: other.to_string(),
                    },
                });
            }
            Err(join_error) => {
                let reason = format!("parser task failed: {}", join_error);
                self.register_failed(job_id, filename, &reason).await;
                tracing::error!(%job_id, filename, error = %reason, "Import parsing crashed");
                return Err(SubmitError::Internal { job_id, reason });
            }
        };

        let transformer = RowTransformer::new(&sheet.headers);
        if !transformer.unmapped_headers().is_empty() {
            tracing::debug!(
                %job_id,
                ignored = ?transformer.unmapped_headers(),
                "Ignoring unrecognized columns"
            );
        }

        let total_rows = sheet.rows.len();
        let ledger = Arc::new(JobLedger::new(job_id, sheet.meta, total_rows, self.limits));
        let cancel = CancellationToken::new();
        self.registry.insert(Arc::clone(&ledger), cancel.clone()).await;

        tracing::info!(%job_id, filename, rows = total_rows, "Import job queued");

        let rows: Arc<[RawRow]> = sheet.rows.into();
        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.drive(ledger, rows, transformer, cancel).await;
        });

        Ok(job_id)
    }

    /// Current snapshot; `None` if unknown or evicted
    pub async fn status(&self, job_id: Uuid) -> Option<ImportJobView> {
        self.registry.status(job_id).await
    }

    pub async fn list(&self) -> Vec<ImportJobView> {
        self.registry.list().await
    }

    pub async fn cancel(&self, job_id: Uuid) -> Result<ImportJobView, CancelError> {
        self.registry.cancel(job_id).await
    }

    async fn register_failed(&self, job_id: Uuid, filename: &str, reason: &str) {
        let ledger = Arc::new(JobLedger::new(
            job_id,
            SourceMeta::unidentified(filename),
            0,
            self.limits,
        ));
        if let Err(e) = ledger.fail(reason).await {
            tracing::error!(%job_id, error = %e, "Could not mark rejected job as failed");
        }
        self.registry.insert(ledger, CancellationToken::new()).await;
    }

    /// Background half of a job: run the pool and settle the terminal status
    async fn drive(
        &self,
        ledger: Arc<JobLedger>,
        rows: Arc<[RawRow]>,
        transformer: RowTransformer,
        cancel: CancellationToken,
    ) {
        let job_id = ledger.id();
        if let Err(e) = ledger.start().await {
            tracing::error!(%job_id, error = %e, "Import job could not start");
            return;
        }
        tracing::info!(%job_id, workers = self.pool.workers(), "Import job processing");

        let run = self.pool.run(
            rows,
            transformer,
            Arc::clone(&self.sink),
            Arc::clone(&ledger),
            cancel.clone(),
        );
        tokio::pin!(run);

        let report = if self.job_timeout.is_zero() {
            (&mut run).await
        } else {
            match tokio::time::timeout(self.job_timeout, &mut run).await {
                Ok(report) => report,
                Err(_) => {
                    // Stop dispatch, then let in-flight rows reach the ledger
                    cancel.cancel();
                    let reason = format!(
                        "import exceeded time limit of {}s",
                        self.job_timeout.as_secs()
                    );
                    tracing::error!(%job_id, "{}", reason);

                    if tokio::time::timeout(TIMEOUT_GRACE, &mut run).await.is_err() {
                        tracing::error!(
                            %job_id,
                            grace_secs = TIMEOUT_GRACE.as_secs(),
                            "In-flight rows did not finish after timeout, aborting workers"
                        );
                    }
                    if let Err(e) = ledger.fail(&reason).await {
                        tracing::error!(%job_id, error = %e, "Could not mark timed-out job as failed");
                    }
                    return;
                }
            }
        };

        if let Some(panic) = report.panics.first() {
            let reason = format!("internal error: worker panicked: {}", panic);
            if let Err(e) = ledger.fail(&reason).await {
                tracing::error!(%job_id, error = %e, "Could not mark panicked job as failed");
            }
            return;
        }

        let outcome = if report.cancelled {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Drained
        };

        match ledger.finalize(outcome).await {
            Ok(()) => {
                let view = ledger.snapshot().await;
                if outcome == RunOutcome::Cancelled {
                    tracing::warn!(
                        %job_id,
                        processed = view.processed_rows,
                        total = view.total_rows,
                        "Import job cancelled"
                    );
                } else {
                    tracing::info!(
                        %job_id,
                        total = view.total_rows,
                        successful = view.successful_rows,
                        failed = view.failed_rows,
                        "Import job completed"
                    );
                }
            }
            Err(e) => tracing::error!(%job_id, error = %e, "Import job could not be finalized"),
        }
    }
}
