//! Data models for ideahub-import
//!
//! - Import job state machine and poller view
//! - Idea creation command

pub mod idea;
pub mod import_job;

pub use idea::CreateIdea;
pub use import_job::{
    ImportJobView, JobStatus, RecordRef, RowFailure, SourceFormat, SourceMeta,
};
