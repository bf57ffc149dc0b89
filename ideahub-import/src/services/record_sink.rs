//! Record sink contract
//!
//! The import engine needs exactly one capability from storage: create one
//! idea from a validated command. Any error becomes a row failure; the
//! engine itself never retries. Retry for transient failures is opt-in via
//! [`RetryingSink`], applied uniformly to every row of every job.

use crate::models::{CreateIdea, RecordRef};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Storage-side failure creating one record
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// Connection hiccup, pool exhaustion, lock timeout
    #[error("temporary storage failure: {0}")]
    Transient(String),

    /// Uniqueness conflict
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage-layer validation or any other permanent failure
    #[error("rejected: {0}")]
    Rejected(String),
}

impl SinkError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SinkError::Transient(_))
    }
}

/// Durable creation of one idea record
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn create(&self, command: &CreateIdea) -> Result<RecordRef, SinkError>;
}

#[async_trait]
impl<S: RecordSink + ?Sized> RecordSink for Arc<S> {
    async fn create(&self, command: &CreateIdea) -> Result<RecordRef, SinkError> {
        (**self).create(command).await
    }
}

/// How many times to attempt a transient-failing create, and how long to wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (1 = no retry)
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `backoff * n`
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Sink wrapper that retries [`SinkError::Transient`] with linear backoff
pub struct RetryingSink<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: RecordSink> RetryingSink<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: RecordSink> RecordSink for RetryingSink<S> {
    async fn create(&self, command: &CreateIdea) -> Result<RecordRef, SinkError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.inner.create(command).await {
                Ok(reference) => {
                    if attempt > 1 {
                        tracing::debug!(slug = %command.slug, attempt, "Create succeeded after retry");
                    }
                    return Ok(reference);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.backoff * attempt;
                    tracing::warn!(
                        slug = %command.slug,
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient sink failure, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
