//! Domain-body callbacks, one per job kind.
//!
//! The scheduler never inspects what a handler does; it only records the
//! returned outcome or error and performs all state transitions itself.

use async_trait::async_trait;

/// Request handed to the analysis domain body.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub owner_id: i64,
    pub symbol: String,
    pub use_case: String,
    pub bypass_filters: bool,
    /// Pre-existing analysis record to finish, for retried work.
    pub existing_analysis_id: Option<i64>,
}

/// Request handed to the risk-evaluation domain body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskRequest {
    pub owner_id: i64,
    pub account_id: i64,
}

/// Request handed to the instrument-expansion domain body.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionRequest {
    pub owner_id: i64,
    pub scan_kind: String,
    pub use_case: String,
}

/// What a domain body reports back on success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandlerOutcome {
    /// Identifier of a record the body created (e.g. an analysis row).
    pub record_id: Option<i64>,
    /// Short human-readable summary.
    pub detail: Option<String>,
}

#[async_trait]
pub trait AnalysisHandler: Send + Sync {
    async fn execute(&self, request: AnalysisRequest) -> anyhow::Result<HandlerOutcome>;
}

#[async_trait]
pub trait RiskHandler: Send + Sync {
    async fn execute(&self, request: RiskRequest) -> anyhow::Result<HandlerOutcome>;
}

#[async_trait]
pub trait ExpansionHandler: Send + Sync {
    async fn execute(&self, request: ExpansionRequest) -> anyhow::Result<HandlerOutcome>;
}
