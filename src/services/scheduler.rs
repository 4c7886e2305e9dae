//! The scheduler facade: typed submission, worker pool lifecycle, durable
//! save/restore, and the wiring between registry, queue, batches, and the
//! trigger coordinator.
//!
//! One `JobScheduler` is constructed at process start and passed explicitly
//! to every submitter; there is no global instance. Persistence is
//! best-effort everywhere: a failed mirror write is logged and never blocks
//! in-memory progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::models::{Config, Job, JobKind, JobOutcome, JobStatus};
use crate::domain::ports::{
    AnalysisHandler, ExpansionHandler, HoldingsView, JobStore, PersistedJobRecord, PolicyEvaluator,
    RiskHandler,
};
use crate::services::activity_log::{ActivityAction, ActivityEvent, ActivityLog};
use crate::services::batch_tracker::BatchTracker;
use crate::services::executors::{ExecutionOutcome, Executors};
use crate::services::queue::{JobQueue, QueueItem};
use crate::services::registry::JobRegistry;
use crate::services::trigger::TriggerCoordinator;

/// Optional knobs for an analysis submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisOptions {
    /// Skip the pre-condition filters and always invoke the domain body.
    pub bypass_filters: bool,
    /// Pre-existing analysis record to finish, for retried work.
    pub existing_analysis_id: Option<i64>,
    pub batch_id: Option<Uuid>,
}

/// Result of a recovery pass over the durable mirror.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub failed: usize,
}

/// Everything a worker task needs, shared by reference.
struct WorkerContext {
    registry: Arc<JobRegistry>,
    queue: Arc<JobQueue>,
    store: Arc<dyn JobStore>,
    batches: Arc<BatchTracker>,
    trigger: Arc<TriggerCoordinator>,
    executors: Arc<Executors>,
    activity: Arc<ActivityLog>,
    running: Arc<AtomicBool>,
    dequeue_timeout: Duration,
}

/// Background job scheduler for trading bot workloads.
pub struct JobScheduler {
    config: Config,
    registry: Arc<JobRegistry>,
    queue: Arc<JobQueue>,
    store: Arc<dyn JobStore>,
    batches: Arc<BatchTracker>,
    trigger: Arc<TriggerCoordinator>,
    executors: Arc<Executors>,
    activity: Arc<ActivityLog>,
    running: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobScheduler {
    /// Wire a scheduler from its external collaborators. Must be called from
    /// within a tokio runtime (the activity consumer spawns immediately).
    pub fn new(
        config: Config,
        store: Arc<dyn JobStore>,
        holdings: Arc<dyn HoldingsView>,
        analysis: Arc<dyn AnalysisHandler>,
        risk: Arc<dyn RiskHandler>,
        expansion: Arc<dyn ExpansionHandler>,
        policy: Arc<dyn PolicyEvaluator>,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let trigger = Arc::new(TriggerCoordinator::new(registry.clone(), policy));
        let executors = Arc::new(Executors::new(holdings, analysis, risk, expansion));
        let activity = Arc::new(ActivityLog::start(config.activity_log.buffer));

        Self {
            registry,
            queue: Arc::new(JobQueue::new()),
            store,
            batches: Arc::new(BatchTracker::new()),
            trigger,
            executors,
            activity,
            running: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Spawn the worker pool. Idempotent; a second call is a logged no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler already running");
            return;
        }

        let mut workers = self.workers.lock().expect("worker handle lock poisoned");
        for worker_idx in 0..self.config.workers.count {
            let ctx = Arc::new(WorkerContext {
                registry: self.registry.clone(),
                queue: self.queue.clone(),
                store: self.store.clone(),
                batches: self.batches.clone(),
                trigger: self.trigger.clone(),
                executors: self.executors.clone(),
                activity: self.activity.clone(),
                running: self.running.clone(),
                dequeue_timeout: Duration::from_millis(self.config.workers.dequeue_timeout_ms),
            });
            workers.push(tokio::spawn(worker_loop(ctx, worker_idx)));
        }
        info!(worker_count = self.config.workers.count, "scheduler started");
    }

    /// Stop the worker pool: enqueue one sentinel per worker, flip the
    /// running flag, and join workers up to `timeout`. Workers that do not
    /// finish in time are logged and left to die with the runtime.
    pub async fn stop(&self, timeout: Duration) {
        let handles: Vec<_> = {
            let mut workers = self.workers.lock().expect("worker handle lock poisoned");
            workers.drain(..).collect()
        };
        if handles.is_empty() {
            self.running.store(false, Ordering::SeqCst);
            return;
        }

        // Sentinels first so a worker blocked in dequeue wakes into one
        // instead of timing out against a still-true running flag.
        for _ in &handles {
            self.queue.enqueue_shutdown();
        }
        self.running.store(false, Ordering::SeqCst);

        let deadline = tokio::time::Instant::now() + timeout;
        for (worker_idx, handle) in handles.into_iter().enumerate() {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    error!(worker = worker_idx, error = %join_err, "worker ended abnormally");
                }
                Err(_) => {
                    warn!(worker = worker_idx, "worker did not stop within timeout");
                }
            }
        }

        // A worker that exited on the flag instead of its sentinel leaves
        // that sentinel behind; sweep so the queue holds only jobs.
        let swept = self.queue.drain_shutdown();
        if swept > 0 {
            debug!(swept, "removed unconsumed shutdown sentinels");
        }
        info!("scheduler stopped");
    }

    /// Submit a market-analysis job for `(owner, symbol)`.
    #[instrument(skip(self, options), err)]
    pub async fn submit_analysis(
        &self,
        owner_id: i64,
        symbol: impl Into<String> + std::fmt::Debug,
        use_case: impl Into<String> + std::fmt::Debug,
        priority: i32,
        options: AnalysisOptions,
    ) -> SchedulerResult<Uuid> {
        self.submit_job(
            owner_id,
            JobKind::Analysis {
                symbol: symbol.into(),
                use_case: use_case.into(),
                bypass_filters: options.bypass_filters,
                existing_analysis_id: options.existing_analysis_id,
                batch_id: options.batch_id,
            },
            priority,
        )
        .await
    }

    /// Submit a portfolio risk evaluation. One active slot per owner.
    #[instrument(skip(self), err)]
    pub async fn submit_risk_evaluation(
        &self,
        owner_id: i64,
        account_id: i64,
        priority: i32,
    ) -> SchedulerResult<Uuid> {
        self.submit_job(owner_id, JobKind::RiskEvaluation { account_id }, priority)
            .await
    }

    /// Submit an instrument-discovery scan.
    #[instrument(skip(self), err)]
    pub async fn submit_expansion(
        &self,
        owner_id: i64,
        scan_kind: impl Into<String> + std::fmt::Debug,
        use_case: impl Into<String> + std::fmt::Debug,
        priority: i32,
        batch_id: Option<Uuid>,
    ) -> SchedulerResult<Uuid> {
        self.submit_job(
            owner_id,
            JobKind::Expansion {
                scan_kind: scan_kind.into(),
                use_case: use_case.into(),
                batch_id,
            },
            priority,
        )
        .await
    }

    async fn submit_job(
        &self,
        owner_id: i64,
        kind: JobKind,
        priority: i32,
    ) -> SchedulerResult<Uuid> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        let job = Job::new(owner_id, kind, priority);
        let id = self.registry.submit(job)?;
        let sequence = self.queue.enqueue(id, priority);
        self.registry.set_sequence(id, sequence);

        // Mirror write is best-effort: losing it costs a recovery
        // resubmission, not the job.
        if let Some(job) = self.registry.get(id) {
            if job.status.is_active() {
                let record = PersistedJobRecord::from_job(&job);
                if let Err(err) = self.store.persist(&record).await {
                    warn!(job_id = %id, error = %err, "failed to persist submitted job");
                } else if self.registry.get(id).is_some_and(|j| j.is_terminal()) {
                    // A worker finished the job while the row was being
                    // written; drop the row it can no longer remove itself.
                    if let Err(err) = self.store.remove(id).await {
                        warn!(job_id = %id, error = %err, "failed to drop row for finished job");
                    }
                }
            }
        }

        self.activity.record(
            ActivityEvent::new(ActivityAction::JobSubmitted, "job submitted")
                .with_job(id)
                .with_owner(owner_id),
        );
        debug!(job_id = %id, sequence, "job enqueued");
        Ok(id)
    }

    pub fn get_job(&self, id: Uuid) -> Option<Job> {
        self.registry.get(id)
    }

    pub fn list_all_jobs(&self) -> Vec<Job> {
        self.registry.list_all()
    }

    pub fn list_pending(&self) -> Vec<Job> {
        self.registry.list_by_status(JobStatus::Pending)
    }

    pub fn list_running(&self) -> Vec<Job> {
        self.registry.list_by_status(JobStatus::Running)
    }

    /// Cancel a Pending job. Returns `false` for Running or terminal jobs.
    pub async fn cancel_job(&self, id: Uuid) -> bool {
        if !self.registry.cancel(id) {
            return false;
        }
        self.queue.remove(id);
        if let Err(err) = self.store.remove(id).await {
            warn!(job_id = %id, error = %err, "failed to remove cancelled job from mirror");
        }
        if let Some(job) = self.registry.get(id) {
            self.activity.record(
                ActivityEvent::new(ActivityAction::JobCancelled, "job cancelled")
                    .with_job(id)
                    .with_owner(job.owner_id),
            );
        }
        true
    }

    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }

    /// Number of live worker tasks.
    pub fn worker_count(&self) -> usize {
        self.workers
            .lock()
            .expect("worker handle lock poisoned")
            .len()
    }

    /// Persist every non-terminal in-memory job to the durable mirror.
    /// Returns how many rows were written.
    #[instrument(skip(self), err)]
    pub async fn save_queue_state(&self) -> SchedulerResult<usize> {
        let mut jobs: Vec<Job> = self
            .registry
            .list_all()
            .into_iter()
            .filter(|j| j.status.is_active())
            .collect();
        jobs.sort_by_key(|j| (j.priority, j.sequence));

        let mut saved = 0;
        for job in &jobs {
            match self.store.persist(&PersistedJobRecord::from_job(job)).await {
                Ok(()) => saved += 1,
                Err(err) => warn!(job_id = %job.id, error = %err, "failed to save job state"),
            }
        }
        info!(saved, "queue state saved");
        Ok(saved)
    }

    /// Recover jobs from the durable mirror after a restart.
    ///
    /// Records whose status was Running are treated as interrupted and
    /// restart fresh. Each record is resubmitted through the normal submit
    /// path; a `DuplicateJob` rejection means a live job already owns the
    /// dedup key, so the stale record is silently dropped and counted under
    /// `failed`.
    #[instrument(skip(self), err)]
    pub async fn restore_persisted_jobs(&self) -> SchedulerResult<RestoreReport> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        let records = self.store.list_non_terminal().await?;
        let mut report = RestoreReport::default();

        for record in records {
            let stale_id = record.job_id;
            if record.status == JobStatus::Running {
                debug!(job_id = %stale_id, "interrupted running job restarts fresh");
            }
            let (owner_id, kind, priority) = match record.into_job_parts() {
                Ok(parts) => parts,
                Err(err) => {
                    // Unrecognized kind is a programming-error signal, not a
                    // recoverable condition.
                    error!(job_id = %stale_id, error = %err, "unrecognized persisted record");
                    report.failed += 1;
                    continue;
                }
            };

            match self.submit_job(owner_id, kind, priority).await {
                Ok(new_id) => {
                    if let Err(err) = self.store.remove(stale_id).await {
                        warn!(job_id = %stale_id, error = %err, "failed to drop stale record");
                    }
                    debug!(stale = %stale_id, fresh = %new_id, "persisted job restored");
                    report.restored += 1;
                }
                Err(SchedulerError::DuplicateJob(key)) => {
                    debug!(job_id = %stale_id, dedup_key = %key, "stale record superseded by live job");
                    if let Err(err) = self.store.remove(stale_id).await {
                        warn!(job_id = %stale_id, error = %err, "failed to drop stale record");
                    }
                    report.failed += 1;
                }
                Err(err) => {
                    warn!(job_id = %stale_id, error = %err, "failed to restore persisted job");
                    report.failed += 1;
                }
            }
        }

        self.activity.record(ActivityEvent::new(
            ActivityAction::RecoveryRun,
            format!("restored {} failed {}", report.restored, report.failed),
        ));
        info!(restored = report.restored, failed = report.failed, "recovery pass finished");
        Ok(report)
    }

    /// Sweep persisted rows older than `max_age_hours`. Returns rows removed.
    #[instrument(skip(self), err)]
    pub async fn clear_stale_persisted_jobs(&self, max_age_hours: u64) -> SchedulerResult<u64> {
        let removed = self
            .store
            .remove_older_than(chrono::Duration::hours(max_age_hours as i64))
            .await?;
        if removed > 0 {
            info!(removed, "stale persisted jobs cleared");
        }
        Ok(removed)
    }

    /// Register a batch of `total` related jobs for completion accounting.
    pub fn track_batch_start(&self, batch_id: Uuid, total: u32) {
        self.batches.track_start(batch_id, total);
    }

    /// Purge batches abandoned past the configured staleness age.
    pub fn cleanup_stale_batches(&self) -> usize {
        self.batches.cleanup_stale(self.config.batches.stale_age_hours)
    }

    /// Activity events dropped because the bounded channel was full.
    pub fn dropped_activity_events(&self) -> u64 {
        self.activity.dropped()
    }
}

async fn worker_loop(ctx: Arc<WorkerContext>, worker_idx: usize) {
    debug!(worker = worker_idx, "worker started");
    loop {
        match ctx.queue.dequeue(ctx.dequeue_timeout).await {
            Some(QueueItem::Shutdown) => break,
            Some(QueueItem::Job(id)) => process_job(&ctx, id).await,
            None => {
                if !ctx.running.load(Ordering::SeqCst) {
                    break;
                }
            }
        }
    }
    debug!(worker = worker_idx, "worker exited");
}

/// Run one dequeued job to a terminal state. Nothing in here may propagate an
/// error out of the worker loop; a failing job is recorded and the worker
/// moves on.
async fn process_job(ctx: &WorkerContext, id: Uuid) {
    let Some(job) = ctx.registry.begin_run(id) else {
        // Cancelled (or otherwise finished) between enqueue and dispatch.
        debug!(job_id = %id, "dequeued job no longer pending, skipping");
        return;
    };

    if let Err(err) = ctx
        .store
        .update_status(id, JobStatus::Running, job.started_at)
        .await
    {
        warn!(job_id = %id, error = %err, "failed to persist running transition");
    }
    ctx.activity.record(
        ActivityEvent::new(ActivityAction::JobStarted, job.kind.as_str())
            .with_job(id)
            .with_owner(job.owner_id),
    );

    let finished = match ctx.executors.execute(&job).await {
        Ok(ExecutionOutcome::Skipped(reason)) => {
            ctx.activity.record(
                ActivityEvent::new(ActivityAction::JobSkipped, reason.clone())
                    .with_job(id)
                    .with_owner(job.owner_id),
            );
            ctx.registry.mark_completed(id, JobOutcome::skipped(reason))
        }
        Ok(ExecutionOutcome::Completed(outcome)) => {
            ctx.activity.record(
                ActivityEvent::new(ActivityAction::JobCompleted, job.kind.as_str())
                    .with_job(id)
                    .with_owner(job.owner_id),
            );
            ctx.registry.mark_completed(
                id,
                JobOutcome {
                    record_id: outcome.record_id,
                    detail: outcome.detail,
                    skip_reason: None,
                },
            )
        }
        Err(err) => {
            // Full detail; the captured text is what callers see on the job.
            error!(job_id = %id, error = %err, "domain body failed");
            ctx.activity.record(
                ActivityEvent::new(ActivityAction::JobFailed, err.to_string())
                    .with_job(id)
                    .with_owner(job.owner_id),
            );
            ctx.registry.mark_failed(id, err.to_string())
        }
    };

    let finished = match finished {
        Ok(job) => job,
        Err(err) => {
            error!(job_id = %id, error = %err, "terminal transition failed");
            return;
        }
    };

    if let Err(err) = ctx.store.remove(id).await {
        warn!(job_id = %id, error = %err, "failed to remove finished job from mirror");
    }

    if let Some(batch_id) = finished.kind.batch_id() {
        if let Some(summary) = ctx.batches.track_completion(batch_id) {
            info!(
                batch_id = %batch_id,
                total = summary.total,
                elapsed_secs = summary.elapsed_secs,
                "batch finished"
            );
            ctx.activity.record(
                ActivityEvent::new(
                    ActivityAction::BatchFinished,
                    format!("{} jobs in {:.3}s", summary.total, summary.elapsed_secs),
                )
                .with_owner(finished.owner_id),
            );
        }
    }

    let fired = ctx
        .trigger
        .on_job_finished(finished.owner_id, finished.category())
        .await;
    if fired {
        ctx.activity.record(
            ActivityEvent::new(ActivityAction::TriggerFired, finished.category())
                .with_owner(finished.owner_id),
        );
    }
}
