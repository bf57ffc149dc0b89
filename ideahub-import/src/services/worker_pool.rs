//! Bounded-concurrency row processing
//!
//! `W` worker tasks share one queue of row indices (an atomic cursor over
//! the parsed rows). Each worker takes the next index, transforms the row,
//! calls the sink if the transform succeeded, and reports exactly one
//! outcome to the ledger. At most `W` rows are in flight, which is the
//! backpressure on a slow sink.
//!
//! Cancellation is checked before a worker takes its next row; rows already
//! in flight run to completion.

use crate::services::job_ledger::JobLedger;
use crate::services::record_sink::RecordSink;
use crate::services::row_transformer::RowTransformer;
use crate::services::spreadsheet::RawRow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Progress is logged every this many rows
const PROGRESS_LOG_INTERVAL: usize = 100;

/// How a pool run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReport {
    /// Rows taken off the queue (and therefore reported to the ledger)
    pub dispatched: usize,
    /// Cancellation stopped dispatch before the queue drained
    pub cancelled: bool,
    /// Panic messages from workers that died mid-row
    pub panics: Vec<String>,
}

/// Shared, read-only inputs of one pool run
struct PoolJob {
    rows: Arc<[RawRow]>,
    transformer: RowTransformer,
    sink: Arc<dyn RecordSink>,
    ledger: Arc<JobLedger>,
    cursor: AtomicUsize,
    completed: AtomicUsize,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// `workers` is clamped to at least 1
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process every row once (unless cancelled); returns after all workers exit
    pub async fn run(
        &self,
        rows: Arc<[RawRow]>,
        transformer: RowTransformer,
        sink: Arc<dyn RecordSink>,
        ledger: Arc<JobLedger>,
        cancel: CancellationToken,
    ) -> PoolReport {
        let total = rows.len();
        let worker_count = self.workers.min(total.max(1));
        let job = Arc::new(PoolJob {
            rows,
            transformer,
            sink,
            ledger,
            cursor: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            cancel,
        });

        tracing::info!(
            job_id = %job.ledger.id(),
            rows = total,
            workers = worker_count,
            "Worker pool starting"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let job = Arc::clone(&job);
            workers.spawn(async move { worker_loop(worker_id, job).await });
        }

        let mut panics = Vec::new();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                if e.is_panic() {
                    let message = panic_message(e.into_panic());
                    tracing::error!(job_id = %job.ledger.id(), panic = %message, "Worker panicked");
                    panics.push(message);
                }
            }
        }

        let dispatched = job.cursor.load(Ordering::SeqCst).min(total);
        PoolReport {
            dispatched,
            cancelled: job.cancel.is_cancelled() && dispatched < total,
            panics,
        }
    }
}

async fn worker_loop(worker_id: usize, job: Arc<PoolJob>) {
    let job_id = job.ledger.id();
    let total = job.rows.len();

    loop {
        if job.cancel.is_cancelled() {
            tracing::debug!(%job_id, worker_id, "Worker observed cancellation");
            break;
        }

        let index = job.cursor.fetch_add(1, Ordering::SeqCst);
        let Some(row) = job.rows.get(index) else {
            break;
        };

        let outcome = match job.transformer.transform(row) {
            Ok(command) => job
                .sink
                .create(&command)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        let recorded = match outcome {
            Ok(reference) => job.ledger.record_success(row.number, reference).await,
            Err(message) => {
                tracing::debug!(%job_id, row = row.number, error = %message, "Row failed");
                job.ledger.record_failure(row.number, &message).await
            }
        };
        if let Err(e) = recorded {
            tracing::warn!(%job_id, row = row.number, error = %e, "Ledger refused row outcome");
        }

        let done = job.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if done % PROGRESS_LOG_INTERVAL == 0 || done == total {
            tracing::debug!(%job_id, progress = format!("{}/{}", done, total), "Import progress");
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateIdea, JobStatus, RecordRef, SourceMeta};
    use crate::services::job_ledger::LedgerLimits;
    use crate::services::record_sink::SinkError;
    use async_trait::async_trait;
    use std::time::Duration;
    use uuid::Uuid;

    /// Tracks peak concurrency; rejects slugs containing "bad"
    #[derive(Default)]
    struct GaugeSink {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RecordSink for GaugeSink {
        async fn create(&self, command: &CreateIdea) -> Result<RecordRef, SinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if command.slug.contains("bad") {
                Err(SinkError::Conflict(format!("slug {} exists", command.slug)))
            } else {
                Ok(RecordRef {
                    id: command.slug.clone(),
                    slug: command.slug.clone(),
                })
            }
        }
    }

    fn rows(n: usize) -> (Vec<String>, Arc<[RawRow]>) {
        let headers = vec!["title".to_string(), "description".to_string()];
        let rows: Vec<RawRow> = (1..=n)
            .map(|i| RawRow {
                number: i,
                values: vec![
                    if i % 5 == 0 { format!("bad idea {}", i) } else { format!("idea {}", i) },
                    if i % 7 == 0 { String::new() } else { "desc".to_string() },
                ],
            })
            .collect();
        (headers, rows.into())
    }

    async fn started_ledger(total: usize) -> Arc<JobLedger> {
        let ledger = Arc::new(JobLedger::new(
            Uuid::new_v4(),
            SourceMeta::unidentified("rows.csv"),
            total,
            LedgerLimits::default(),
        ));
        ledger.start().await.unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let (headers, rows) = rows(40);
        let sink = Arc::new(GaugeSink::default());
        let ledger = started_ledger(40).await;

        let report = WorkerPool::new(4)
            .run(rows, RowTransformer::new(&headers), sink.clone(), ledger.clone(), CancellationToken::new())
            .await;

        assert_eq!(report.dispatched, 40);
        assert!(!report.cancelled);
        assert!(report.panics.is_empty());
        assert!(sink.peak.load(Ordering::SeqCst) <= 4);

        let view = ledger.snapshot().await;
        assert_eq!(view.processed_rows, 40);
        // rows 7..=35 step 7 lack a description; 5..=40 step 5 conflict; 35 is both
        assert_eq!(view.failed_rows, 5 + 8 - 1);
        assert_eq!(view.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_transform_failures_skip_the_sink() {
        let (headers, rows) = rows(14);
        let sink = Arc::new(GaugeSink::default());
        let ledger = started_ledger(14).await;

        WorkerPool::new(2)
            .run(rows, RowTransformer::new(&headers), sink.clone(), ledger, CancellationToken::new())
            .await;

        // rows 7 and 14 lack a description
        assert_eq!(sink.calls.load(Ordering::SeqCst), 12);
    }

    #[tokio::test]
    async fn test_pre_cancelled_run_dispatches_nothing() {
        let (headers, rows) = rows(10);
        let sink = Arc::new(GaugeSink::default());
        let ledger = started_ledger(10).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = WorkerPool::new(3)
            .run(rows, RowTransformer::new(&headers), sink.clone(), ledger.clone(), cancel)
            .await;

        assert_eq!(report.dispatched, 0);
        assert!(report.cancelled);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ledger.snapshot().await.processed_rows, 0);
    }

    #[test]
    fn test_workers_clamped_to_one() {
        assert_eq!(WorkerPool::new(0).workers(), 1);
    }
}
