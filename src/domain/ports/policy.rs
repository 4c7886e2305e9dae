//! Downstream policy evaluation, fired exactly once per finished
//! `(owner, category)` group.

use async_trait::async_trait;

/// One follow-on action the policy evaluator decided on.
#[derive(Debug, Clone, PartialEq)]
pub struct DownstreamAction {
    pub owner_id: i64,
    /// What to do, e.g. "rebalance" or "open-position".
    pub action: String,
    pub symbol: Option<String>,
}

#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluate follow-on processing for an owner/category group whose jobs
    /// have all finished. Invoked with no scheduler lock held.
    async fn evaluate(
        &self,
        owner_id: i64,
        category: &str,
    ) -> anyhow::Result<Vec<DownstreamAction>>;
}
