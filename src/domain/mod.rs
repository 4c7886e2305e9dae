//! Domain layer for the tradequeue scheduler.
//!
//! Core models, error taxonomy, and the port traits that external
//! collaborators (durable store, domain bodies, policy evaluator, holdings
//! view) implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{SchedulerError, SchedulerResult};
