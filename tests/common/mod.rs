//! Shared fixtures for the integration suite: stub collaborators and a
//! scheduler harness wired against an in-memory SQLite mirror.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use tradequeue::adapters::sqlite::{all_embedded_migrations, create_test_pool, Migrator, SqliteJobStore};
use tradequeue::domain::models::Config;
use tradequeue::{
    AnalysisHandler, AnalysisRequest, DownstreamAction, ExpansionHandler, ExpansionRequest,
    HandlerOutcome, HoldingsView, JobScheduler, PolicyEvaluator, RiskHandler, RiskRequest,
};

/// Handlers that count invocations, optionally fail chosen symbols, and
/// optionally block on a semaphore until the test releases them.
#[derive(Default)]
pub struct StubHandlers {
    pub analysis_calls: AtomicUsize,
    pub risk_calls: AtomicUsize,
    pub expansion_calls: AtomicUsize,
    pub executed_symbols: Mutex<Vec<String>>,
    pub fail_symbols: Mutex<HashSet<String>>,
    /// When present, every handler call acquires one permit first.
    pub gate: Option<Arc<Semaphore>>,
}

impl StubHandlers {
    pub fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let handlers = Arc::new(Self {
            gate: Some(gate.clone()),
            ..Self::default()
        });
        (handlers, gate)
    }

    pub fn fail_symbol(&self, symbol: &str) {
        self.fail_symbols.lock().unwrap().insert(symbol.to_string());
    }

    async fn wait_gate(&self) {
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }
    }
}

#[async_trait]
impl AnalysisHandler for StubHandlers {
    async fn execute(&self, request: AnalysisRequest) -> anyhow::Result<HandlerOutcome> {
        self.wait_gate().await;
        self.analysis_calls.fetch_add(1, Ordering::SeqCst);
        self.executed_symbols
            .lock()
            .unwrap()
            .push(request.symbol.clone());
        if self.fail_symbols.lock().unwrap().contains(&request.symbol) {
            anyhow::bail!("provider error for {}", request.symbol);
        }
        Ok(HandlerOutcome {
            record_id: Some(1),
            detail: Some(format!("analysis of {}", request.symbol)),
        })
    }
}

#[async_trait]
impl RiskHandler for StubHandlers {
    async fn execute(&self, _request: RiskRequest) -> anyhow::Result<HandlerOutcome> {
        self.wait_gate().await;
        self.risk_calls.fetch_add(1, Ordering::SeqCst);
        Ok(HandlerOutcome::default())
    }
}

#[async_trait]
impl ExpansionHandler for StubHandlers {
    async fn execute(&self, _request: ExpansionRequest) -> anyhow::Result<HandlerOutcome> {
        self.wait_gate().await;
        self.expansion_calls.fetch_add(1, Ordering::SeqCst);
        Ok(HandlerOutcome::default())
    }
}

/// Holdings view backed by plain sets.
#[derive(Default)]
pub struct StaticHoldings {
    pub open_positions: Mutex<HashSet<(i64, String)>>,
    pub recent_analyses: Mutex<HashSet<(i64, String, String)>>,
}

impl StaticHoldings {
    pub fn add_position(&self, owner_id: i64, symbol: &str) {
        self.open_positions
            .lock()
            .unwrap()
            .insert((owner_id, symbol.to_string()));
    }
}

#[async_trait]
impl HoldingsView for StaticHoldings {
    async fn has_open_position(&self, owner_id: i64, symbol: &str) -> anyhow::Result<bool> {
        Ok(self
            .open_positions
            .lock()
            .unwrap()
            .contains(&(owner_id, symbol.to_string())))
    }

    async fn has_recent_analysis(
        &self,
        owner_id: i64,
        symbol: &str,
        use_case: &str,
    ) -> anyhow::Result<bool> {
        Ok(self
            .recent_analyses
            .lock()
            .unwrap()
            .contains(&(owner_id, symbol.to_string(), use_case.to_string())))
    }
}

/// Policy evaluator that records every invocation, with a configurable delay
/// to widen race windows in concurrency tests.
pub struct RecordingPolicy {
    pub calls: Mutex<Vec<(i64, String)>>,
    pub delay: Duration,
}

impl RecordingPolicy {
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            delay,
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PolicyEvaluator for RecordingPolicy {
    async fn evaluate(
        &self,
        owner_id: i64,
        category: &str,
    ) -> anyhow::Result<Vec<DownstreamAction>> {
        self.calls
            .lock()
            .unwrap()
            .push((owner_id, category.to_string()));
        tokio::time::sleep(self.delay).await;
        Ok(vec![])
    }
}

pub struct Harness {
    pub scheduler: JobScheduler,
    pub store: Arc<SqliteJobStore>,
    pub handlers: Arc<StubHandlers>,
    pub holdings: Arc<StaticHoldings>,
    pub policy: Arc<RecordingPolicy>,
}

/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Test-friendly config: small pool, fast dequeue timeout.
pub fn test_config(worker_count: usize) -> Config {
    let mut config = Config::default();
    config.workers.count = worker_count;
    config.workers.dequeue_timeout_ms = 25;
    config
}

pub async fn fresh_store() -> Arc<SqliteJobStore> {
    let pool = create_test_pool().await.unwrap();
    Migrator::new(pool.clone())
        .run_embedded_migrations(all_embedded_migrations())
        .await
        .unwrap();
    Arc::new(SqliteJobStore::new(
        pool,
        &Config::default().persistence,
    ))
}

pub async fn build_harness(worker_count: usize, handlers: Arc<StubHandlers>) -> Harness {
    let store = fresh_store().await;
    build_harness_with_store(worker_count, handlers, store).await
}

pub async fn build_harness_with_store(
    worker_count: usize,
    handlers: Arc<StubHandlers>,
    store: Arc<SqliteJobStore>,
) -> Harness {
    let policy = Arc::new(RecordingPolicy::new(Duration::from_millis(10)));
    build_harness_full(worker_count, handlers, store, policy)
}

pub fn build_harness_full(
    worker_count: usize,
    handlers: Arc<StubHandlers>,
    store: Arc<SqliteJobStore>,
    policy: Arc<RecordingPolicy>,
) -> Harness {
    setup_test_logging();
    let holdings = Arc::new(StaticHoldings::default());
    let scheduler = JobScheduler::new(
        test_config(worker_count),
        store.clone(),
        holdings.clone(),
        handlers.clone(),
        handlers.clone(),
        handlers.clone(),
        policy.clone(),
    );
    Harness {
        scheduler,
        store,
        handlers,
        holdings,
        policy,
    }
}

/// Poll until the condition holds or the deadline passes.
pub async fn wait_for<F>(mut condition: F, timeout: Duration)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {timeout:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
