//! Job domain model.
//!
//! A job is one unit of schedulable background work: a market analysis for a
//! single instrument, a portfolio risk evaluation for an account, or an
//! instrument-discovery (expansion) scan. Job kinds form a closed tagged
//! union so the worker dispatch step is exhaustively checked at compile time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a job in the scheduling pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Submitted and waiting in the queue.
    Pending,
    /// Picked up by a worker and currently executing.
    Running,
    /// Finished successfully (including completed-with-skip).
    Completed,
    /// Finished with an error, or cancelled before dispatch.
    Failed,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if this is an active (non-terminal) state.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// Type-specific payload for a job.
///
/// Closed union: adding a kind is a compile-time-checked change everywhere
/// the scheduler dispatches on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobKind {
    /// Market analysis for one instrument.
    Analysis {
        symbol: String,
        /// Use-case tag grouping sibling analyses (e.g. "entry-scan").
        use_case: String,
        /// Skip the pre-condition filters and always invoke the domain body.
        #[serde(default)]
        bypass_filters: bool,
        /// Pre-existing analysis record to finish, for retried work.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        existing_analysis_id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        batch_id: Option<Uuid>,
    },
    /// Portfolio risk evaluation for one account.
    RiskEvaluation { account_id: i64 },
    /// Instrument-discovery scan that expands the tradable universe.
    Expansion {
        scan_kind: String,
        use_case: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        batch_id: Option<Uuid>,
    },
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis { .. } => "analysis",
            Self::RiskEvaluation { .. } => "risk_evaluation",
            Self::Expansion { .. } => "expansion",
        }
    }

    /// Compute the dedup key for this payload.
    ///
    /// At most one active job may exist per key: `(owner, symbol)` for
    /// analysis, `(owner, scan kind)` for expansion, and the owner alone for
    /// risk evaluation.
    pub fn dedup_key(&self, owner_id: i64) -> String {
        match self {
            Self::Analysis { symbol, .. } => format!("analysis:{owner_id}:{symbol}"),
            Self::RiskEvaluation { .. } => format!("risk:{owner_id}"),
            Self::Expansion { scan_kind, .. } => format!("expansion:{owner_id}:{scan_kind}"),
        }
    }

    /// Category used for trigger grouping: sibling jobs sharing
    /// `(owner, category)` gate the downstream policy evaluation.
    pub fn category(&self) -> &str {
        match self {
            Self::Analysis { use_case, .. } | Self::Expansion { use_case, .. } => use_case,
            Self::RiskEvaluation { .. } => "risk",
        }
    }

    /// Subject of the job for the durable row: the analyzed symbol or the
    /// expansion scan kind.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::Analysis { symbol, .. } => Some(symbol),
            Self::Expansion { scan_kind, .. } => Some(scan_kind),
            Self::RiskEvaluation { .. } => None,
        }
    }

    pub fn account_id(&self) -> Option<i64> {
        match self {
            Self::RiskEvaluation { account_id } => Some(*account_id),
            _ => None,
        }
    }

    pub fn batch_id(&self) -> Option<Uuid> {
        match self {
            Self::Analysis { batch_id, .. } | Self::Expansion { batch_id, .. } => *batch_id,
            Self::RiskEvaluation { .. } => None,
        }
    }
}

/// What a finished job produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Identifier of a record the domain body created (e.g. an analysis row).
    pub record_id: Option<i64>,
    /// Short human-readable summary from the domain body.
    pub detail: Option<String>,
    /// Set when a skip pre-condition held and the domain body never ran.
    pub skip_reason: Option<String>,
}

impl JobOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            record_id: None,
            detail: None,
            skip_reason: Some(reason.into()),
        }
    }
}

/// A unit of schedulable background work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier, assigned at submission.
    pub id: Uuid,
    /// Logical owner (user or strategy) the job works on behalf of.
    pub owner_id: i64,
    /// Type-specific payload.
    pub kind: JobKind,
    /// Lower value = served first.
    pub priority: i32,
    /// Monotonically increasing counter assigned at enqueue time; breaks
    /// priority ties in submission order.
    pub sequence: u64,
    /// Dedup slot this job occupies while non-terminal.
    pub dedup_key: String,
    pub status: JobStatus,
    /// Populated on successful terminal transition.
    pub result: Option<JobOutcome>,
    /// Populated on failed terminal transition.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(owner_id: i64, kind: JobKind, priority: i32) -> Self {
        let dedup_key = kind.dedup_key(owner_id);
        Self {
            id: Uuid::new_v4(),
            owner_id,
            kind,
            priority,
            sequence: 0,
            dedup_key,
            status: JobStatus::default(),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Check if the job reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Category used for trigger grouping.
    pub fn category(&self) -> &str {
        self.kind.category()
    }

    pub(crate) fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_completed(&mut self, outcome: JobOutcome) {
        self.status = JobStatus::Completed;
        self.result = Some(outcome);
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}
