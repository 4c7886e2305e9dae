//! Accounting for groups of jobs submitted together.
//!
//! A batch is created lazily, incremented on each sibling completion, and
//! removed the instant the count reaches the expected total, at which point
//! the summary is handed back exactly once. Batches abandoned by an upstream
//! crash are purged by the staleness sweep.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

/// Returned exactly once per batch, on the completion that closes it.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub total: u32,
}

struct BatchEntry {
    started_at: DateTime<Utc>,
    total: u32,
    completed: u32,
}

/// Tracks `(batch_id, start, expected, completed)` for in-flight batches.
#[derive(Default)]
pub struct BatchTracker {
    batches: Mutex<HashMap<Uuid, BatchEntry>>,
}

impl BatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch of `total` jobs. Re-registering an in-flight batch id
    /// only raises the expected total; completions already counted stay.
    pub fn track_start(&self, batch_id: Uuid, total: u32) {
        let mut batches = self.batches.lock().expect("batch lock poisoned");
        let entry = batches.entry(batch_id).or_insert_with(|| BatchEntry {
            started_at: Utc::now(),
            total,
            completed: 0,
        });
        if entry.total < total {
            entry.total = total;
        }
    }

    /// Count one sibling completion.
    ///
    /// An unknown batch id is initialized lazily with `total = 1` and
    /// evaluated immediately, which self-heals out-of-order start signals.
    /// Returns `Some` exactly once, on the call that brings the count to the
    /// total; the bookkeeping is removed at that point, so a later completion
    /// for the same id starts a fresh batch.
    pub fn track_completion(&self, batch_id: Uuid) -> Option<BatchSummary> {
        let mut batches = self.batches.lock().expect("batch lock poisoned");
        let entry = batches.entry(batch_id).or_insert_with(|| {
            debug!(%batch_id, "completion for unknown batch, initializing with total=1");
            BatchEntry {
                started_at: Utc::now(),
                total: 1,
                completed: 0,
            }
        });

        entry.completed += 1;
        if entry.completed < entry.total {
            return None;
        }

        let entry = batches.remove(&batch_id).expect("entry just touched");
        let elapsed = Utc::now() - entry.started_at;
        Some(BatchSummary {
            batch_id,
            started_at: entry.started_at,
            elapsed_secs: elapsed.num_milliseconds() as f64 / 1_000.0,
            total: entry.total,
        })
    }

    /// Purge batches whose start time exceeds the age threshold. Returns how
    /// many were removed.
    pub fn cleanup_stale(&self, max_age_hours: u64) -> usize {
        let cutoff = Utc::now() - Duration::hours(max_age_hours as i64);
        let mut batches = self.batches.lock().expect("batch lock poisoned");
        let before = batches.len();
        batches.retain(|_, entry| entry.started_at >= cutoff);
        before - batches.len()
    }

    pub fn len(&self) -> usize {
        self.batches.lock().expect("batch lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
