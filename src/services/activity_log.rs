//! Background activity channel for scheduler observability.
//!
//! Producers record events without blocking: a bounded channel feeds one
//! dedicated consumer task that writes events through `tracing`. When the
//! channel is full the event is dropped and counted; scheduling progress is
//! never gated on logging throughput, and the drop policy is an explicit,
//! observable behavior rather than an accident.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

/// What happened, for the activity stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityAction {
    JobSubmitted,
    JobStarted,
    JobCompleted,
    JobFailed,
    JobCancelled,
    JobSkipped,
    BatchFinished,
    TriggerFired,
    RecoveryRun,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobSubmitted => "job_submitted",
            Self::JobStarted => "job_started",
            Self::JobCompleted => "job_completed",
            Self::JobFailed => "job_failed",
            Self::JobCancelled => "job_cancelled",
            Self::JobSkipped => "job_skipped",
            Self::BatchFinished => "batch_finished",
            Self::TriggerFired => "trigger_fired",
            Self::RecoveryRun => "recovery_run",
        }
    }
}

/// One entry in the activity stream.
#[derive(Debug, Clone)]
pub struct ActivityEvent {
    pub at: DateTime<Utc>,
    pub action: ActivityAction,
    pub job_id: Option<Uuid>,
    pub owner_id: Option<i64>,
    pub detail: String,
}

impl ActivityEvent {
    pub fn new(action: ActivityAction, detail: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            action,
            job_id: None,
            owner_id: None,
            detail: detail.into(),
        }
    }

    pub fn with_job(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_owner(mut self, owner_id: i64) -> Self {
        self.owner_id = Some(owner_id);
        self
    }
}

/// Bounded activity channel with a dedicated single consumer.
pub struct ActivityLog {
    tx: Mutex<Option<mpsc::Sender<ActivityEvent>>>,
    dropped: AtomicU64,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl ActivityLog {
    /// Start the consumer task. `capacity` bounds the channel; producers drop
    /// once it is full.
    pub fn start(capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<ActivityEvent>(capacity);
        let consumer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                info!(
                    target: "tradequeue::activity",
                    action = event.action.as_str(),
                    job_id = ?event.job_id,
                    owner_id = ?event.owner_id,
                    at = %event.at,
                    "{}",
                    event.detail
                );
            }
        });

        Self {
            tx: Mutex::new(Some(tx)),
            dropped: AtomicU64::new(0),
            consumer: Mutex::new(Some(consumer)),
        }
    }

    /// Non-blocking record; drops the event (and counts the drop) when the
    /// channel is full or already shut down.
    pub fn record(&self, event: ActivityEvent) {
        let tx = self.tx.lock().expect("activity sender lock poisoned");
        let Some(tx) = tx.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Number of events dropped on the producer side so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the channel and wait for the consumer to drain the backlog.
    pub async fn shutdown(&self) {
        // Dropping the sender closes the channel; the consumer exits once the
        // backlog is drained.
        self.tx
            .lock()
            .expect("activity sender lock poisoned")
            .take();
        let handle = self
            .consumer
            .lock()
            .expect("activity consumer lock poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
