//! In-memory job registry with the dedup index.
//!
//! One narrow mutex guards both the id → job map and the dedup-key → active
//! job index, so the invariant "at most one non-terminal job per dedup key,
//! and the index entry dies the instant its job goes terminal" holds in a
//! single critical section. No lock is ever held across an await point.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::warn;
use uuid::Uuid;

use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::models::{Job, JobOutcome, JobStatus};

#[derive(Default)]
struct RegistryInner {
    jobs: HashMap<Uuid, Job>,
    dedup_index: HashMap<String, Uuid>,
}

impl RegistryInner {
    /// Drop the dedup entry for a job that just went terminal. Only removes
    /// the entry when it still points at this job; a fresh job may have
    /// already claimed the slot.
    fn release_dedup(&mut self, job: &Job) {
        if self.dedup_index.get(&job.dedup_key) == Some(&job.id) {
            self.dedup_index.remove(&job.dedup_key);
        }
    }
}

/// Lock waits past this are logged as contention; never an error.
const LOCK_WAIT_WARN: Duration = Duration::from_millis(100);

/// In-memory map of job id → job state plus the dedup secondary index.
#[derive(Default)]
pub struct JobRegistry {
    inner: Mutex<RegistryInner>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_inner(&self) -> MutexGuard<'_, RegistryInner> {
        let wait_start = Instant::now();
        let guard = self.inner.lock().expect("registry lock poisoned");
        let waited = wait_start.elapsed();
        if waited > LOCK_WAIT_WARN {
            warn!(
                waited_ms = waited.as_millis() as u64,
                "registry lock wait exceeded threshold"
            );
        }
        guard
    }

    /// Insert a freshly built job, enforcing the dedup invariant.
    pub fn submit(&self, job: Job) -> SchedulerResult<Uuid> {
        let mut inner = self.lock_inner();

        if let Some(existing_id) = inner.dedup_index.get(&job.dedup_key).copied() {
            match inner.jobs.get(&existing_id) {
                Some(existing) if !existing.is_terminal() => {
                    return Err(SchedulerError::DuplicateJob(job.dedup_key));
                }
                _ => {
                    // Index entry outlived its job; repair and move on.
                    warn!(dedup_key = %job.dedup_key, "stale dedup index entry repaired");
                    inner.dedup_index.remove(&job.dedup_key);
                }
            }
        }

        let id = job.id;
        inner.dedup_index.insert(job.dedup_key.clone(), id);
        inner.jobs.insert(id, job);
        Ok(id)
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.lock_inner().jobs.get(&id).cloned()
    }

    pub fn list_all(&self) -> Vec<Job> {
        self.lock_inner().jobs.values().cloned().collect()
    }

    pub fn list_by_status(&self, status: JobStatus) -> Vec<Job> {
        self.lock_inner()
            .jobs
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect()
    }

    /// Record the queue sequence assigned at enqueue time.
    pub fn set_sequence(&self, id: Uuid, sequence: u64) {
        let mut inner = self.lock_inner();
        if let Some(job) = inner.jobs.get_mut(&id) {
            job.sequence = sequence;
        }
    }

    /// Claim a dequeued job for execution. Returns the Running snapshot, or
    /// `None` when the job is gone or no longer Pending (cancelled between
    /// enqueue and dispatch).
    pub fn begin_run(&self, id: Uuid) -> Option<Job> {
        let mut inner = self.lock_inner();
        let job = inner.jobs.get_mut(&id)?;
        if job.status != JobStatus::Pending {
            return None;
        }
        job.mark_running();
        Some(job.clone())
    }

    /// Terminal success transition; releases the dedup key in the same
    /// critical section.
    pub fn mark_completed(&self, id: Uuid, outcome: JobOutcome) -> SchedulerResult<Job> {
        let mut inner = self.lock_inner();
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or(SchedulerError::JobNotFound(id))?;
        job.mark_completed(outcome);
        let snapshot = job.clone();
        inner.release_dedup(&snapshot);
        Ok(snapshot)
    }

    /// Terminal failure transition; releases the dedup key in the same
    /// critical section.
    pub fn mark_failed(&self, id: Uuid, error: impl Into<String>) -> SchedulerResult<Job> {
        let mut inner = self.lock_inner();
        let job = inner
            .jobs
            .get_mut(&id)
            .ok_or(SchedulerError::JobNotFound(id))?;
        job.mark_failed(error);
        let snapshot = job.clone();
        inner.release_dedup(&snapshot);
        Ok(snapshot)
    }

    /// Cancel a Pending job. Running jobs cannot be cancelled (there is no
    /// preemption model) and terminal jobs are left alone; both return
    /// `false`. A cancelled job goes to Failed and its dedup key frees
    /// immediately.
    pub fn cancel(&self, id: Uuid) -> bool {
        let mut inner = self.lock_inner();
        let Some(job) = inner.jobs.get_mut(&id) else {
            return false;
        };
        if job.status != JobStatus::Pending {
            return false;
        }
        job.mark_failed("cancelled");
        let snapshot = job.clone();
        inner.release_dedup(&snapshot);
        true
    }

    /// Trigger scan: does any Pending/Running job remain in the
    /// `(owner, category)` group?
    pub fn has_active_in_group(&self, owner_id: i64, category: &str) -> bool {
        self.lock_inner()
            .jobs
            .values()
            .any(|j| j.status.is_active() && j.owner_id == owner_id && j.category() == category)
    }

    pub fn len(&self) -> usize {
        self.lock_inner().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
