//! Port trait definitions (hexagonal architecture).
//!
//! Async trait interfaces the scheduler consumes without knowing the
//! implementation behind them:
//! - `JobStore`: durable mirror of non-terminal jobs
//! - `AnalysisHandler` / `RiskHandler` / `ExpansionHandler`: domain bodies
//! - `PolicyEvaluator`: downstream trigger evaluation
//! - `HoldingsView`: read-only data feeding skip pre-conditions

pub mod handlers;
pub mod holdings;
pub mod job_store;
pub mod policy;

pub use handlers::{
    AnalysisHandler, AnalysisRequest, ExpansionHandler, ExpansionRequest, HandlerOutcome,
    RiskHandler, RiskRequest,
};
pub use holdings::HoldingsView;
pub use job_store::{JobStore, PersistedJobRecord};
pub use policy::{DownstreamAction, PolicyEvaluator};
