//! Retry policy for durable writes.
//!
//! SQLite raises transient contention errors (`SQLITE_BUSY`, `SQLITE_LOCKED`)
//! under concurrent access; the write path retries those with exponential
//! backoff plus random jitter. Two named profiles exist: `bookkeeping` for
//! ordinary mirror writes, and a more patient `critical` profile for writes
//! whose loss is unacceptable. Every store method picks its profile
//! explicitly; there is no default for new write paths.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::models::RetryProfileConfig;

/// One named backoff profile.
#[derive(Debug, Clone)]
pub struct RetryProfile {
    name: &'static str,
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl RetryProfile {
    pub fn new(name: &'static str, config: &RetryProfileConfig) -> Self {
        Self {
            name,
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Execute an operation, retrying transient contention errors.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, sqlx::Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(profile = self.name, attempt, "write succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if attempt >= self.max_retries || !is_transient(&err) {
                        return Err(err);
                    }
                    let backoff = self.backoff_with_jitter(attempt);
                    warn!(
                        profile = self.name,
                        attempt = attempt + 1,
                        error = %err,
                        "transient write contention, retrying in {:?}",
                        backoff
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// `min(initial * 2^attempt, max)` plus up to 50% random jitter, still
    /// capped at the profile ceiling.
    fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let base = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        Duration::from_millis(base.saturating_add(jitter).min(self.max_backoff_ms))
    }
}

/// Retry on lock contention and pool exhaustion; everything else is
/// permanent.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_lowercase();
            message.contains("database is locked") || message.contains("database table is locked")
        }
        _ => false,
    }
}
