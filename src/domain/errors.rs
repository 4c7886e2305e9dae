//! Domain errors for the tradequeue scheduler.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the scheduler and its collaborators.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// An active job already owns the computed dedup key. Caller-recoverable:
    /// retry later or ignore.
    #[error("Duplicate job for dedup key: {0}")]
    DuplicateJob(String),

    /// Operation attempted before `start()` (or after `stop()`).
    #[error("Scheduler is not running")]
    NotRunning,

    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// Wraps any error raised inside a domain-body handler. Always caught at
    /// the worker boundary; never escapes a worker loop.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Durable-store failure. Logged; durability is best-effort and never
    /// blocks in-memory progress on its own.
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl From<sqlx::Error> for SchedulerError {
    fn from(err: sqlx::Error) -> Self {
        SchedulerError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}
