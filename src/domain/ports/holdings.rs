//! Read-only view over the owner's holdings and analysis records, consumed by
//! executor skip pre-conditions.

use async_trait::async_trait;

#[async_trait]
pub trait HoldingsView: Send + Sync {
    /// Whether the owner currently holds an open position in the symbol.
    async fn has_open_position(&self, owner_id: i64, symbol: &str) -> anyhow::Result<bool>;

    /// Whether an analysis produced in the current cycle already covers
    /// `(owner, symbol, use_case)`.
    async fn has_recent_analysis(
        &self,
        owner_id: i64,
        symbol: &str,
        use_case: &str,
    ) -> anyhow::Result<bool>;
}
