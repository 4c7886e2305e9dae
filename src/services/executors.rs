//! Per-kind execution adapters.
//!
//! Each executor evaluates its skip pre-conditions as a pure decision over
//! data fetched beforehand, then either short-circuits with the skip reason
//! or invokes the external domain body. The scheduler performs all state
//! transitions from the returned outcome; nothing here touches the registry
//! or the durable store.

use std::sync::Arc;

use tracing::debug;

use crate::domain::errors::{SchedulerError, SchedulerResult};
use crate::domain::models::{Job, JobKind};
use crate::domain::ports::{
    AnalysisHandler, AnalysisRequest, ExpansionHandler, ExpansionRequest, HandlerOutcome,
    HoldingsView, RiskHandler, RiskRequest,
};

/// Outcome of pre-condition evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precheck {
    Proceed,
    Skip(String),
}

/// Result of running one job through its executor.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// A pre-condition held; the domain body never ran.
    Skipped(String),
    /// The domain body ran and reported success.
    Completed(HandlerOutcome),
}

/// Decide whether an analysis job should run, from already-fetched facts.
///
/// Pure so the decision table is testable without any store: an owner that
/// already holds the symbol, or already has a fresh analysis for the use
/// case, gets a skip unless the caller asked to bypass the filters.
pub fn analysis_precheck(
    bypass_filters: bool,
    has_open_position: bool,
    has_recent_analysis: bool,
) -> Precheck {
    if bypass_filters {
        return Precheck::Proceed;
    }
    if has_open_position {
        return Precheck::Skip("open position exists for symbol".to_string());
    }
    if has_recent_analysis {
        return Precheck::Skip("recent analysis already covers symbol".to_string());
    }
    Precheck::Proceed
}

/// Bundles the domain-body handlers and the holdings view behind one
/// dispatch surface for the worker loop.
pub struct Executors {
    holdings: Arc<dyn HoldingsView>,
    analysis: Arc<dyn AnalysisHandler>,
    risk: Arc<dyn RiskHandler>,
    expansion: Arc<dyn ExpansionHandler>,
}

impl Executors {
    pub fn new(
        holdings: Arc<dyn HoldingsView>,
        analysis: Arc<dyn AnalysisHandler>,
        risk: Arc<dyn RiskHandler>,
        expansion: Arc<dyn ExpansionHandler>,
    ) -> Self {
        Self {
            holdings,
            analysis,
            risk,
            expansion,
        }
    }

    /// Run one job to its domain outcome. Any error from the holdings view
    /// or the domain body is wrapped as `Execution` and captured at the
    /// worker boundary as the job's failure.
    pub async fn execute(&self, job: &Job) -> SchedulerResult<ExecutionOutcome> {
        self.run(job)
            .await
            .map_err(|err| SchedulerError::Execution(format!("{err:#}")))
    }

    async fn run(&self, job: &Job) -> anyhow::Result<ExecutionOutcome> {
        match &job.kind {
            JobKind::Analysis {
                symbol,
                use_case,
                bypass_filters,
                existing_analysis_id,
                ..
            } => {
                let has_open_position = self
                    .holdings
                    .has_open_position(job.owner_id, symbol)
                    .await?;
                let has_recent_analysis = self
                    .holdings
                    .has_recent_analysis(job.owner_id, symbol, use_case)
                    .await?;

                match analysis_precheck(*bypass_filters, has_open_position, has_recent_analysis) {
                    Precheck::Skip(reason) => {
                        debug!(job_id = %job.id, %reason, "analysis job skipped");
                        Ok(ExecutionOutcome::Skipped(reason))
                    }
                    Precheck::Proceed => {
                        let outcome = self
                            .analysis
                            .execute(AnalysisRequest {
                                owner_id: job.owner_id,
                                symbol: symbol.clone(),
                                use_case: use_case.clone(),
                                bypass_filters: *bypass_filters,
                                existing_analysis_id: *existing_analysis_id,
                            })
                            .await?;
                        Ok(ExecutionOutcome::Completed(outcome))
                    }
                }
            }
            JobKind::RiskEvaluation { account_id } => {
                let outcome = self
                    .risk
                    .execute(RiskRequest {
                        owner_id: job.owner_id,
                        account_id: *account_id,
                    })
                    .await?;
                Ok(ExecutionOutcome::Completed(outcome))
            }
            JobKind::Expansion {
                scan_kind,
                use_case,
                ..
            } => {
                let outcome = self
                    .expansion
                    .execute(ExpansionRequest {
                        owner_id: job.owner_id,
                        scan_kind: scan_kind.clone(),
                        use_case: use_case.clone(),
                    })
                    .await?;
                Ok(ExecutionOutcome::Completed(outcome))
            }
        }
    }
}
