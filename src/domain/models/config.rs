//! Configuration for the tradequeue scheduler.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed for {field}: {reason}")]
    ValidationError { field: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub workers: WorkerConfig,
    pub database: DatabaseConfig,
    pub persistence: PersistenceConfig,
    pub batches: BatchConfig,
    pub activity_log: ActivityLogConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of worker tasks pulling from the queue.
    pub count: usize,
    /// How long a worker blocks on an empty queue before re-checking the
    /// running flag.
    pub dequeue_timeout_ms: u64,
    /// How long `stop` waits for workers to drain before giving up on them.
    pub stop_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 4,
            dequeue_timeout_ms: 1_000,
            stop_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ".tradequeue/tradequeue.db".to_string(),
            max_connections: 5,
            connect_timeout_secs: 30,
        }
    }
}

/// Retry/backoff settings for one class of durable writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryProfileConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryProfileConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryProfileConfig {
    /// More patient profile for writes whose loss is unacceptable, e.g. the
    /// terminal-state removal that would otherwise resurrect finished work.
    pub fn critical_default() -> Self {
        Self {
            max_retries: 8,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Profile for ordinary bookkeeping writes (submit, status updates).
    pub bookkeeping: RetryProfileConfig,
    /// Profile for critical writes (terminal-state removal).
    pub critical: RetryProfileConfig,
    /// Persisted rows older than this are sweepable as stale.
    pub stale_age_hours: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            bookkeeping: RetryProfileConfig::default(),
            critical: RetryProfileConfig::critical_default(),
            stale_age_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Batches idle since their start for longer than this are purged.
    pub stale_age_hours: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { stale_age_hours: 24 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityLogConfig {
    /// Bounded channel capacity; producers drop events once it is full.
    pub buffer: usize,
}

impl Default for ActivityLogConfig {
    fn default() -> Self {
        Self { buffer: 1_024 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn load() -> Result<Self, ConfigError> {
        let path = Path::new("tradequeue.toml");
        if path.exists() {
            Self::from_file(path)
        } else {
            let mut config = Config::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TRADEQUEUE_WORKER_COUNT") {
            if let Ok(v) = val.parse() {
                self.workers.count = v;
            }
        }
        if let Ok(val) = std::env::var("TRADEQUEUE_DATABASE_PATH") {
            self.database.path = val;
        }
        if let Ok(val) = std::env::var("TRADEQUEUE_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers.count == 0 {
            return Err(ConfigError::ValidationError {
                field: "workers.count".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        for (field, profile) in [
            ("persistence.bookkeeping", &self.persistence.bookkeeping),
            ("persistence.critical", &self.persistence.critical),
        ] {
            if profile.max_backoff_ms < profile.initial_backoff_ms {
                return Err(ConfigError::ValidationError {
                    field: format!("{field}.max_backoff_ms"),
                    reason: "must be >= initial_backoff_ms".to_string(),
                });
            }
        }
        if self.activity_log.buffer == 0 {
            return Err(ConfigError::ValidationError {
                field: "activity_log.buffer".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn sample_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}
