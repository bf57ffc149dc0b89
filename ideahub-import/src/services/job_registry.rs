//! Job registry
//!
//! Process-wide map from job id to ledger and cancellation token. Injected
//! into the coordinator and HTTP state rather than living in a global.
//! Jobs are created on submission, stay while non-terminal, and become
//! evictable once they have been terminal for the retention window.

use crate::models::{ImportJobView, JobStatus};
use crate::services::job_ledger::{JobLedger, LedgerError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CancelError {
    #[error("import job not found: {0}")]
    NotFound(Uuid),

    #[error("import job {id} already {status}")]
    AlreadyTerminal { id: Uuid, status: JobStatus },
}

#[derive(Debug, Clone)]
struct JobEntry {
    ledger: Arc<JobLedger>,
    cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, JobEntry>>>,
    retention: Duration,
}

impl JobRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub async fn insert(&self, ledger: Arc<JobLedger>, cancel: CancellationToken) {
        let id = ledger.id();
        self.jobs
            .write()
            .await
            .insert(id, JobEntry { ledger, cancel });
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<JobLedger>> {
        self.jobs.read().await.get(&id).map(|e| Arc::clone(&e.ledger))
    }

    /// Snapshot of one job; `None` if unknown or evicted
    pub async fn status(&self, id: Uuid) -> Option<ImportJobView> {
        // Release the map lock before touching the ledger's own lock
        let ledger = self.get(id).await?;
        Some(ledger.snapshot().await)
    }

    /// Snapshots of every retained job, newest first
    pub async fn list(&self) -> Vec<ImportJobView> {
        let ledgers: Vec<Arc<JobLedger>> = self
            .jobs
            .read()
            .await
            .values()
            .map(|e| Arc::clone(&e.ledger))
            .collect();

        let mut views = Vec::with_capacity(ledgers.len());
        for ledger in ledgers {
            views.push(ledger.snapshot().await);
        }
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        views
    }

    /// Number of jobs not yet terminal
    pub async fn active_count(&self) -> usize {
        let ledgers: Vec<Arc<JobLedger>> = self
            .jobs
            .read()
            .await
            .values()
            .map(|e| Arc::clone(&e.ledger))
            .collect();

        let mut active = 0;
        for ledger in ledgers {
            if !ledger.status().await.is_terminal() {
                active += 1;
            }
        }
        active
    }

    /// Trip the job's kill switch; workers stop before their next row
    pub async fn cancel(&self, id: Uuid) -> Result<ImportJobView, CancelError> {
        let entry = self
            .jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(CancelError::NotFound(id))?;

        match entry.ledger.request_cancel().await {
            Ok(()) => {}
            Err(LedgerError::AlreadyTerminal(status)) => {
                return Err(CancelError::AlreadyTerminal { id, status })
            }
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Unexpected ledger error on cancel");
            }
        }
        entry.cancel.cancel();

        tracing::info!(job_id = %id, "Import job cancellation requested");
        Ok(entry.ledger.snapshot().await)
    }

    /// Remove jobs that have been terminal for longer than the retention window
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::days(36_500));

        let candidates: Vec<(Uuid, Arc<JobLedger>)> = self
            .jobs
            .read()
            .await
            .iter()
            .map(|(id, e)| (*id, Arc::clone(&e.ledger)))
            .collect();

        let mut expired = Vec::new();
        for (id, ledger) in candidates {
            if let Some(finished_at) = ledger.finished_at().await {
                if now - finished_at >= retention {
                    expired.push(id);
                }
            }
        }

        if expired.is_empty() {
            return 0;
        }

        let mut jobs = self.jobs.write().await;
        for id in &expired {
            jobs.remove(id);
        }
        tracing::debug!(evicted = expired.len(), remaining = jobs.len(), "Evicted expired import jobs");
        expired.len()
    }

    /// Periodically evict expired jobs until `shutdown` is cancelled
    pub async fn run_sweeper(self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Import job sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    self.evict_expired(Utc::now()).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceMeta;
    use crate::services::job_ledger::{LedgerLimits, RunOutcome};

    fn new_ledger(total: usize) -> Arc<JobLedger> {
        Arc::new(JobLedger::new(
            Uuid::new_v4(),
            SourceMeta::unidentified("r.csv"),
            total,
            LedgerLimits::default(),
        ))
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let registry = JobRegistry::new(Duration::from_secs(60));
        let ledger = new_ledger(3);
        let id = ledger.id();
        registry.insert(ledger, CancellationToken::new()).await;

        let view = registry.status(id).await.unwrap();
        assert_eq!(view.id, id);
        assert_eq!(view.status, JobStatus::Queued);
        assert!(registry.status(Uuid::new_v4()).await.is_none());
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_non_terminal_jobs_are_never_evicted() {
        let registry = JobRegistry::new(Duration::ZERO);
        let ledger = new_ledger(1);
        let id = ledger.id();
        ledger.start().await.unwrap();
        registry.insert(ledger, CancellationToken::new()).await;

        let far_future = Utc::now() + chrono::Duration::days(365);
        assert_eq!(registry.evict_expired(far_future).await, 0);
        assert!(registry.get(id).await.is_some());
    }

    #[tokio::test]
    async fn test_terminal_jobs_evicted_after_retention() {
        let registry = JobRegistry::new(Duration::from_secs(3600));
        let ledger = new_ledger(0);
        let id = ledger.id();
        ledger.fail("unreadable").await.unwrap();
        registry.insert(ledger, CancellationToken::new()).await;

        assert_eq!(registry.evict_expired(Utc::now()).await, 0);
        assert!(registry.get(id).await.is_some());

        let later = Utc::now() + chrono::Duration::hours(2);
        assert_eq!(registry.evict_expired(later).await, 1);
        assert!(registry.status(id).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_trips_token() {
        let registry = JobRegistry::new(Duration::from_secs(60));
        let ledger = new_ledger(5);
        let id = ledger.id();
        ledger.start().await.unwrap();
        let token = CancellationToken::new();
        registry.insert(ledger, token.clone()).await;

        let view = registry.cancel(id).await.unwrap();
        assert!(view.cancel_requested);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_terminal_or_unknown() {
        let registry = JobRegistry::new(Duration::from_secs(60));
        let ledger = new_ledger(1);
        let id = ledger.id();
        ledger.start().await.unwrap();
        ledger.finalize(RunOutcome::Drained).await.unwrap();
        let token = CancellationToken::new();
        registry.insert(ledger, token.clone()).await;

        assert_eq!(
            registry.cancel(id).await.unwrap_err(),
            CancelError::AlreadyTerminal { id, status: JobStatus::Completed }
        );
        assert!(!token.is_cancelled());

        let unknown = Uuid::new_v4();
        assert_eq!(registry.cancel(unknown).await.unwrap_err(), CancelError::NotFound(unknown));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let registry = JobRegistry::new(Duration::from_secs(60));
        let first = new_ledger(1);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = new_ledger(1);
        let (first_id, second_id) = (first.id(), second.id());
        registry.insert(first, CancellationToken::new()).await;
        registry.insert(second, CancellationToken::new()).await;

        let ids: Vec<Uuid> = registry.list().await.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![second_id, first_id]);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let registry = JobRegistry::new(Duration::ZERO);
        let ledger = new_ledger(0);
        let id = ledger.id();
        ledger.fail("bad file").await.unwrap();
        registry.insert(ledger, CancellationToken::new()).await;

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(registry.clone().run_sweeper(Duration::from_millis(5), shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(registry.get(id).await.is_none());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
