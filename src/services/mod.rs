pub mod activity_log;
pub mod batch_tracker;
pub mod executors;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod trigger;

pub use activity_log::{ActivityAction, ActivityEvent, ActivityLog};
pub use batch_tracker::{BatchSummary, BatchTracker};
pub use executors::{analysis_precheck, ExecutionOutcome, Executors, Precheck};
pub use queue::{JobQueue, QueueItem};
pub use registry::JobRegistry;
pub use scheduler::{AnalysisOptions, JobScheduler, RestoreReport};
pub use trigger::TriggerCoordinator;
