pub mod config;
pub mod job;

pub use config::{
    ActivityLogConfig, BatchConfig, Config, ConfigError, DatabaseConfig, LoggingConfig,
    PersistenceConfig, RetryProfileConfig, WorkerConfig,
};
pub use job::{Job, JobKind, JobOutcome, JobStatus};
