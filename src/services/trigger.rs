//! Exactly-once downstream trigger evaluation.
//!
//! After a job finishes, the coordinator decides whether its whole
//! `(owner, category)` group is done and, if so, runs the downstream policy
//! evaluator once. The two-phase check (scan the registry, then hold a guard
//! entry while evaluating) tolerates sibling jobs completing
//! near-simultaneously: whichever task observes "zero remaining" first wins
//! the single evaluation, the other either still sees a sibling or finds the
//! guard held.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::domain::ports::PolicyEvaluator;
use crate::services::registry::JobRegistry;

type GroupKey = (i64, String);

/// Removes the in-flight guard entry on drop, success or failure.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<GroupKey>>,
    key: GroupKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .expect("trigger guard lock poisoned")
            .remove(&self.key);
    }
}

pub struct TriggerCoordinator {
    registry: Arc<JobRegistry>,
    evaluator: Arc<dyn PolicyEvaluator>,
    in_flight: Mutex<HashSet<GroupKey>>,
}

impl TriggerCoordinator {
    pub fn new(registry: Arc<JobRegistry>, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        Self {
            registry,
            evaluator,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Called after every job completion with the job's owner and category.
    /// Returns whether the evaluator actually ran.
    ///
    /// The evaluator runs with no scheduler lock held; its errors are logged,
    /// never propagated into the worker loop.
    pub async fn on_job_finished(&self, owner_id: i64, category: &str) -> bool {
        let key: GroupKey = (owner_id, category.to_string());

        let guard = {
            let mut in_flight = self.in_flight.lock().expect("trigger guard lock poisoned");
            if in_flight.contains(&key) {
                debug!(owner_id, category, "group evaluation already in flight");
                return false;
            }
            if self.registry.has_active_in_group(owner_id, category) {
                return false;
            }
            in_flight.insert(key.clone());
            InFlightGuard {
                in_flight: &self.in_flight,
                key,
            }
        };

        match self.evaluator.evaluate(owner_id, category).await {
            Ok(actions) => {
                info!(
                    owner_id,
                    category,
                    action_count = actions.len(),
                    "downstream policy evaluated"
                );
            }
            Err(err) => {
                warn!(owner_id, category, error = %err, "downstream policy evaluation failed");
            }
        }
        drop(guard);
        true
    }
}
