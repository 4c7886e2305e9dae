//! Durable mirror of non-terminal jobs, used only for crash recovery.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::models::{Job, JobKind, JobStatus};

/// Durable shadow of a non-terminal [`Job`].
///
/// Created on submit, updated on the Pending→Running transition, deleted on
/// any terminal transition. Carries enough to rebuild a fresh job of the
/// correct kind on recovery; it does not carry results or errors.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedJobRecord {
    pub job_id: Uuid,
    pub job_kind: String,
    pub status: JobStatus,
    pub priority: i32,
    pub owner_id: i64,
    /// Analyzed symbol or expansion scan kind.
    pub subject: Option<String>,
    /// Trigger-grouping category (use-case tag, or "risk").
    pub category: Option<String>,
    pub account_id: Option<i64>,
    pub dedup_key: String,
    pub batch_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub queue_sequence: u64,
}

impl PersistedJobRecord {
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            job_kind: job.kind.as_str().to_string(),
            status: job.status,
            priority: job.priority,
            owner_id: job.owner_id,
            subject: job.kind.subject().map(str::to_string),
            category: Some(job.kind.category().to_string()),
            account_id: job.kind.account_id(),
            dedup_key: job.dedup_key.clone(),
            batch_id: job.kind.batch_id(),
            created_at: job.created_at,
            started_at: job.started_at,
            queue_sequence: job.sequence,
        }
    }

    /// Rebuild a fresh `(owner_id, kind, priority)` triple for resubmission.
    ///
    /// An interrupted Running record restarts from scratch: no carried-over
    /// analysis reference, bypass flags reset, so pre-conditions are
    /// re-evaluated on the fresh run.
    pub fn into_job_parts(self) -> SchedulerResult<(i64, JobKind, i32)> {
        let kind = match self.job_kind.as_str() {
            "analysis" => JobKind::Analysis {
                symbol: self.subject.ok_or_else(|| {
                    SchedulerError::Serialization(format!(
                        "analysis record {} has no subject",
                        self.job_id
                    ))
                })?,
                use_case: self.category.unwrap_or_default(),
                bypass_filters: false,
                existing_analysis_id: None,
                batch_id: self.batch_id,
            },
            "risk_evaluation" => JobKind::RiskEvaluation {
                account_id: self.account_id.ok_or_else(|| {
                    SchedulerError::Serialization(format!(
                        "risk record {} has no account id",
                        self.job_id
                    ))
                })?,
            },
            "expansion" => JobKind::Expansion {
                scan_kind: self.subject.ok_or_else(|| {
                    SchedulerError::Serialization(format!(
                        "expansion record {} has no subject",
                        self.job_id
                    ))
                })?,
                use_case: self.category.unwrap_or_default(),
                batch_id: self.batch_id,
            },
            other => {
                return Err(SchedulerError::Serialization(format!(
                    "unknown job kind: {other}"
                )))
            }
        };
        Ok((self.owner_id, kind, self.priority))
    }
}

/// Port for the durable keyed record store backing crash recovery.
///
/// Implementations own the single-writer discipline and the retry/backoff
/// policy; callers treat every method as best-effort and log failures rather
/// than blocking in-memory progress.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Upsert the record by job id.
    async fn persist(&self, record: &PersistedJobRecord) -> SchedulerResult<()>;

    /// In-place status update for an existing record.
    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        started_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()>;

    /// Delete the record for a job that reached a terminal state.
    async fn remove(&self, job_id: Uuid) -> SchedulerResult<()>;

    /// All Pending/Running records, ordered by `(priority, queue_sequence)`
    /// for deterministic replay.
    async fn list_non_terminal(&self) -> SchedulerResult<Vec<PersistedJobRecord>>;

    /// Sweep rows whose `created_at` exceeds the age threshold. Returns the
    /// number of rows removed.
    async fn remove_older_than(&self, max_age: chrono::Duration) -> SchedulerResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trip_analysis() {
        let job = Job::new(
            5,
            JobKind::Analysis {
                symbol: "AAPL".to_string(),
                use_case: "entry-scan".to_string(),
                bypass_filters: true,
                existing_analysis_id: Some(77),
                batch_id: None,
            },
            2,
        );
        let record = PersistedJobRecord::from_job(&job);
        assert_eq!(record.subject.as_deref(), Some("AAPL"));
        assert_eq!(record.category.as_deref(), Some("entry-scan"));

        let (owner, kind, priority) = record.into_job_parts().unwrap();
        assert_eq!(owner, 5);
        assert_eq!(priority, 2);
        // Recovery restarts fresh: bypass and retry references are reset.
        assert_eq!(
            kind,
            JobKind::Analysis {
                symbol: "AAPL".to_string(),
                use_case: "entry-scan".to_string(),
                bypass_filters: false,
                existing_analysis_id: None,
                batch_id: None,
            }
        );
    }

    #[test]
    fn test_record_round_trip_risk() {
        let job = Job::new(7, JobKind::RiskEvaluation { account_id: 31 }, 0);
        let record = PersistedJobRecord::from_job(&job);
        assert_eq!(record.account_id, Some(31));
        assert_eq!(record.category.as_deref(), Some("risk"));

        let (_, kind, _) = record.into_job_parts().unwrap();
        assert_eq!(kind, JobKind::RiskEvaluation { account_id: 31 });
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let job = Job::new(7, JobKind::RiskEvaluation { account_id: 31 }, 0);
        let mut record = PersistedJobRecord::from_job(&job);
        record.job_kind = "margin_call".to_string();
        assert!(record.into_job_parts().is_err());
    }
}
