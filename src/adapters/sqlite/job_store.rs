//! SQLite implementation of the JobStore port.
//!
//! All writes funnel through one writer lock so durable rows never interleave
//! under concurrent workers, and each write path names its retry profile
//! explicitly: mirror upserts and status updates are `bookkeeping`, the
//! terminal-state removal is `critical` (a lost removal resurrects finished
//! work on the next recovery, which can re-run trade-adjacent analysis).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::adapters::sqlite::retry::RetryProfile;
use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::models::{JobStatus, PersistenceConfig};
use crate::domain::ports::{JobStore, PersistedJobRecord};

pub struct SqliteJobStore {
    pool: SqlitePool,
    /// Single logical writer for all mirror mutations.
    write_lock: Mutex<()>,
    bookkeeping: RetryProfile,
    critical: RetryProfile,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool, config: &PersistenceConfig) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
            bookkeeping: RetryProfile::new("bookkeeping", &config.bookkeeping),
            critical: RetryProfile::new("critical", &config.critical),
        }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn persist(&self, record: &PersistedJobRecord) -> SchedulerResult<()> {
        let _writer = self.write_lock.lock().await;
        self.bookkeeping
            .execute(|| async {
                sqlx::query(
                    r"INSERT INTO persisted_jobs
                        (job_id, job_kind, status, priority, owner_id, subject, category,
                         account_id, dedup_key, batch_id, created_at, started_at, queue_sequence)
                      VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                      ON CONFLICT(job_id) DO UPDATE SET
                        status = excluded.status,
                        started_at = excluded.started_at,
                        queue_sequence = excluded.queue_sequence",
                )
                .bind(record.job_id.to_string())
                .bind(&record.job_kind)
                .bind(record.status.as_str())
                .bind(record.priority)
                .bind(record.owner_id)
                .bind(&record.subject)
                .bind(&record.category)
                .bind(record.account_id)
                .bind(&record.dedup_key)
                .bind(record.batch_id.map(|id| id.to_string()))
                .bind(record.created_at.to_rfc3339())
                .bind(record.started_at.map(|t| t.to_rfc3339()))
                .bind(record.queue_sequence as i64)
                .execute(&self.pool)
                .await
                .map(|_| ())
            })
            .await?;
        Ok(())
    }

    async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
        started_at: Option<DateTime<Utc>>,
    ) -> SchedulerResult<()> {
        let _writer = self.write_lock.lock().await;
        let result = self
            .bookkeeping
            .execute(|| async {
                sqlx::query(
                    "UPDATE persisted_jobs SET status = ?, started_at = COALESCE(?, started_at)
                     WHERE job_id = ?",
                )
                .bind(status.as_str())
                .bind(started_at.map(|t| t.to_rfc3339()))
                .bind(job_id.to_string())
                .execute(&self.pool)
                .await
            })
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::Persistence(format!(
                "no persisted record for job {job_id}"
            )));
        }
        Ok(())
    }

    async fn remove(&self, job_id: Uuid) -> SchedulerResult<()> {
        let _writer = self.write_lock.lock().await;
        self.critical
            .execute(|| async {
                sqlx::query("DELETE FROM persisted_jobs WHERE job_id = ?")
                    .bind(job_id.to_string())
                    .execute(&self.pool)
                    .await
                    .map(|_| ())
            })
            .await?;
        Ok(())
    }

    async fn list_non_terminal(&self) -> SchedulerResult<Vec<PersistedJobRecord>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT * FROM persisted_jobs WHERE status IN ('pending', 'running')
             ORDER BY priority, queue_sequence",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn remove_older_than(&self, max_age: chrono::Duration) -> SchedulerResult<u64> {
        let cutoff = (Utc::now() - max_age).to_rfc3339();
        let _writer = self.write_lock.lock().await;
        let result = self
            .bookkeeping
            .execute(|| async {
                sqlx::query("DELETE FROM persisted_jobs WHERE created_at < ?")
                    .bind(&cutoff)
                    .execute(&self.pool)
                    .await
            })
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    job_id: String,
    job_kind: String,
    status: String,
    priority: i32,
    owner_id: i64,
    subject: Option<String>,
    category: Option<String>,
    account_id: Option<i64>,
    dedup_key: String,
    batch_id: Option<String>,
    created_at: String,
    started_at: Option<String>,
    queue_sequence: i64,
}

impl TryFrom<JobRow> for PersistedJobRecord {
    type Error = SchedulerError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let job_id = Uuid::parse_str(&row.job_id)
            .map_err(|e| SchedulerError::Serialization(e.to_string()))?;

        let status = JobStatus::parse_str(&row.status).ok_or_else(|| {
            SchedulerError::Serialization(format!("Invalid status: {}", row.status))
        })?;

        let batch_id = row
            .batch_id
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| SchedulerError::Serialization(e.to_string()))?;

        let created_at = chrono::DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| SchedulerError::Serialization(e.to_string()))?
            .with_timezone(&Utc);

        let started_at = row
            .started_at
            .map(|s| {
                chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc))
            })
            .transpose()
            .map_err(|e| SchedulerError::Serialization(e.to_string()))?;

        Ok(PersistedJobRecord {
            job_id,
            job_kind: row.job_kind,
            status,
            priority: row.priority,
            owner_id: row.owner_id,
            subject: row.subject,
            category: row.category,
            account_id: row.account_id,
            dedup_key: row.dedup_key,
            batch_id,
            created_at,
            started_at,
            queue_sequence: row.queue_sequence as u64,
        })
    }
}
