//! Tradequeue - Background Job Scheduler
//!
//! Tradequeue is the job-processing core of a trading bot: it schedules
//! market-analysis, portfolio-risk-evaluation, and instrument-discovery jobs
//! across a pool of workers, deduplicates concurrent work per logical owner,
//! mirrors queued work into SQLite so a restart loses nothing, and fires
//! follow-on policy evaluation exactly once when an owner/category group of
//! jobs finishes.
//!
//! # Architecture
//!
//! The crate follows a hexagonal layout:
//!
//! - **Domain Layer** (`domain`): job model, error taxonomy, and the port
//!   traits for external collaborators
//! - **Service Layer** (`services`): registry, queue, batch tracker, trigger
//!   coordinator, executors, and the `JobScheduler` facade
//! - **Adapter Layer** (`adapters`): SQLite implementation of the durable
//!   job mirror
//!
//! # Example
//!
//! ```ignore
//! use tradequeue::{AnalysisOptions, Config, JobScheduler};
//!
//! # async fn example(scheduler: JobScheduler) -> anyhow::Result<()> {
//! scheduler.start();
//! let id = scheduler
//!     .submit_analysis(5, "AAPL", "entry-scan", 0, AnalysisOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod domain;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{SchedulerError, SchedulerResult};
pub use domain::models::{Config, ConfigError, Job, JobKind, JobOutcome, JobStatus};
pub use domain::ports::{
    AnalysisHandler, AnalysisRequest, DownstreamAction, ExpansionHandler, ExpansionRequest,
    HandlerOutcome, HoldingsView, JobStore, PersistedJobRecord, PolicyEvaluator, RiskHandler,
    RiskRequest,
};
pub use services::{AnalysisOptions, BatchSummary, JobScheduler, RestoreReport};
