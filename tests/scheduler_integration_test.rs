//! End-to-end scheduler behavior: dedup, ordering, shutdown, failure
//! isolation, skip pre-conditions, cancellation, and the exactly-once
//! trigger under concurrent sibling completion.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{
    build_harness, build_harness_full, fresh_store, wait_for, RecordingPolicy, StubHandlers,
};
use tradequeue::{AnalysisOptions, JobStatus, SchedulerError};

#[tokio::test]
async fn test_submit_before_start_is_rejected() {
    let harness = build_harness(1, Arc::new(StubHandlers::default())).await;

    let err = harness
        .scheduler
        .submit_analysis(5, "AAPL", "entry-scan", 0, AnalysisOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::NotRunning));
}

#[tokio::test]
async fn test_duplicate_submission_rejected_until_terminal() {
    let (handlers, gate) = StubHandlers::gated();
    let harness = build_harness(1, handlers).await;
    harness.scheduler.start();

    let first = harness
        .scheduler
        .submit_analysis(5, "AAPL", "entry-scan", 0, AnalysisOptions::default())
        .await
        .unwrap();

    // Second submission for the same (owner, symbol) while the first is
    // Pending or Running must be refused.
    let err = harness
        .scheduler
        .submit_analysis(5, "AAPL", "entry-scan", 0, AnalysisOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::DuplicateJob(_)));

    // A different owner owns a different slot.
    harness
        .scheduler
        .submit_analysis(6, "AAPL", "entry-scan", 0, AnalysisOptions::default())
        .await
        .unwrap();

    gate.add_permits(8);
    wait_for(
        || {
            harness
                .scheduler
                .get_job(first)
                .is_some_and(|j| j.is_terminal())
        },
        Duration::from_secs(5),
    )
    .await;

    // Terminal job freed the slot.
    harness
        .scheduler
        .submit_analysis(5, "AAPL", "entry-scan", 0, AnalysisOptions::default())
        .await
        .unwrap();

    gate.add_permits(8);
    harness.scheduler.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_dequeue_order_priority_then_fifo() {
    let (handlers, gate) = StubHandlers::gated();
    let harness = build_harness(1, handlers.clone()).await;
    harness.scheduler.start();

    // Plug the single worker so the next three jobs queue up behind it.
    harness
        .scheduler
        .submit_analysis(9, "PLUG", "entry-scan", -1, AnalysisOptions::default())
        .await
        .unwrap();
    wait_for(
        || harness.scheduler.list_running().len() == 1,
        Duration::from_secs(5),
    )
    .await;

    // Priorities 5, 0, 5 submitted in order A, B, C → dequeue order B, A, C.
    for (symbol, priority) in [("A", 5), ("B", 0), ("C", 5)] {
        harness
            .scheduler
            .submit_analysis(9, symbol, "entry-scan", priority, AnalysisOptions::default())
            .await
            .unwrap();
    }

    gate.add_permits(16);
    wait_for(
        || {
            harness
                .scheduler
                .list_all_jobs()
                .iter()
                .all(|j| j.is_terminal())
        },
        Duration::from_secs(5),
    )
    .await;

    let order = handlers.executed_symbols.lock().unwrap().clone();
    assert_eq!(order, vec!["PLUG", "B", "A", "C"]);

    harness.scheduler.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_stop_leaves_no_workers_and_no_sentinels() {
    let harness = build_harness(3, Arc::new(StubHandlers::default())).await;
    harness.scheduler.start();
    assert_eq!(harness.scheduler.worker_count(), 3);

    harness.scheduler.stop(Duration::from_secs(5)).await;
    assert_eq!(harness.scheduler.worker_count(), 0);
    assert_eq!(harness.scheduler.queue_size(), 0);
}

#[tokio::test]
async fn test_handler_failure_does_not_kill_worker() {
    let handlers = Arc::new(StubHandlers::default());
    handlers.fail_symbol("BAD");
    let harness = build_harness(1, handlers.clone()).await;
    harness.scheduler.start();

    let bad = harness
        .scheduler
        .submit_analysis(5, "BAD", "entry-scan", 0, AnalysisOptions::default())
        .await
        .unwrap();
    let good = harness
        .scheduler
        .submit_analysis(5, "GOOD", "entry-scan", 1, AnalysisOptions::default())
        .await
        .unwrap();

    wait_for(
        || {
            [bad, good]
                .iter()
                .all(|id| harness.scheduler.get_job(*id).is_some_and(|j| j.is_terminal()))
        },
        Duration::from_secs(5),
    )
    .await;

    let failed = harness.scheduler.get_job(bad).unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.error.unwrap().contains("provider error for BAD"));

    // The same worker went on to finish the next job.
    let completed = harness.scheduler.get_job(good).unwrap();
    assert_eq!(completed.status, JobStatus::Completed);

    harness.scheduler.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_open_position_skips_domain_body() {
    let handlers = Arc::new(StubHandlers::default());
    let harness = build_harness(1, handlers.clone()).await;
    harness.holdings.add_position(5, "AAPL");
    harness.scheduler.start();

    let id = harness
        .scheduler
        .submit_analysis(5, "AAPL", "entry-scan", 0, AnalysisOptions::default())
        .await
        .unwrap();

    wait_for(
        || harness.scheduler.get_job(id).is_some_and(|j| j.is_terminal()),
        Duration::from_secs(5),
    )
    .await;

    let job = harness.scheduler.get_job(id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.result.unwrap().skip_reason.is_some());
    assert_eq!(handlers.analysis_calls.load(Ordering::SeqCst), 0);

    harness.scheduler.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_cancel_pending_frees_slot_cancel_running_refused() {
    let (handlers, gate) = StubHandlers::gated();
    let harness = build_harness(1, handlers).await;
    harness.scheduler.start();

    let running = harness
        .scheduler
        .submit_analysis(5, "AAPL", "entry-scan", 0, AnalysisOptions::default())
        .await
        .unwrap();
    wait_for(
        || harness.scheduler.list_running().len() == 1,
        Duration::from_secs(5),
    )
    .await;

    let pending = harness
        .scheduler
        .submit_analysis(5, "MSFT", "entry-scan", 0, AnalysisOptions::default())
        .await
        .unwrap();

    // Running jobs cannot be cancelled.
    assert!(!harness.scheduler.cancel_job(running).await);
    assert_eq!(
        harness.scheduler.get_job(running).unwrap().status,
        JobStatus::Running
    );

    // Pending jobs can, and the dedup key frees immediately.
    assert!(harness.scheduler.cancel_job(pending).await);
    let cancelled = harness.scheduler.get_job(pending).unwrap();
    assert_eq!(cancelled.status, JobStatus::Failed);
    assert_eq!(cancelled.error.as_deref(), Some("cancelled"));

    harness
        .scheduler
        .submit_analysis(5, "MSFT", "entry-scan", 0, AnalysisOptions::default())
        .await
        .unwrap();

    gate.add_permits(8);
    harness.scheduler.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_trigger_fires_exactly_once_for_concurrent_siblings() {
    let (handlers, gate) = StubHandlers::gated();
    let store = fresh_store().await;
    // A slow evaluator widens the race window between the two completions.
    let policy = Arc::new(RecordingPolicy::new(Duration::from_millis(250)));
    let harness = build_harness_full(2, handlers, store, policy);
    harness.scheduler.start();

    let a = harness
        .scheduler
        .submit_analysis(5, "AAPL", "entry-scan", 0, AnalysisOptions::default())
        .await
        .unwrap();
    let b = harness
        .scheduler
        .submit_analysis(5, "MSFT", "entry-scan", 0, AnalysisOptions::default())
        .await
        .unwrap();

    // Both workers blocked inside their handler.
    wait_for(
        || harness.scheduler.list_running().len() == 2,
        Duration::from_secs(5),
    )
    .await;

    // Release both at once so the siblings complete near-simultaneously.
    gate.add_permits(2);
    wait_for(
        || {
            [a, b]
                .iter()
                .all(|id| harness.scheduler.get_job(*id).is_some_and(|j| j.is_terminal()))
        },
        Duration::from_secs(5),
    )
    .await;
    // Let any in-flight evaluation finish.
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(harness.policy.call_count(), 1);
    assert_eq!(harness.policy.calls.lock().unwrap()[0], (5, "entry-scan".to_string()));

    harness.scheduler.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_trigger_waits_for_whole_group() {
    let (handlers, gate) = StubHandlers::gated();
    let harness = build_harness(1, handlers).await;
    harness.scheduler.start();

    let first = harness
        .scheduler
        .submit_analysis(5, "AAPL", "entry-scan", 0, AnalysisOptions::default())
        .await
        .unwrap();
    let second = harness
        .scheduler
        .submit_analysis(5, "MSFT", "entry-scan", 0, AnalysisOptions::default())
        .await
        .unwrap();

    // Finish only the first; its sibling is still queued.
    gate.add_permits(1);
    wait_for(
        || harness.scheduler.get_job(first).is_some_and(|j| j.is_terminal()),
        Duration::from_secs(5),
    )
    .await;
    assert_eq!(harness.policy.call_count(), 0);

    gate.add_permits(1);
    wait_for(
        || harness.scheduler.get_job(second).is_some_and(|j| j.is_terminal()),
        Duration::from_secs(5),
    )
    .await;
    wait_for(|| harness.policy.call_count() == 1, Duration::from_secs(5)).await;

    harness.scheduler.stop(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_risk_evaluation_dedups_per_owner() {
    let (handlers, gate) = StubHandlers::gated();
    let harness = build_harness(1, handlers.clone()).await;
    harness.scheduler.start();

    harness
        .scheduler
        .submit_risk_evaluation(5, 100, 0)
        .await
        .unwrap();
    // Same owner, different account: still one active risk slot.
    let err = harness
        .scheduler
        .submit_risk_evaluation(5, 200, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::DuplicateJob(_)));

    harness.scheduler.submit_risk_evaluation(6, 100, 0).await.unwrap();

    gate.add_permits(8);
    wait_for(
        || handlers.risk_calls.load(Ordering::SeqCst) == 2,
        Duration::from_secs(5),
    )
    .await;
    harness.scheduler.stop(Duration::from_secs(5)).await;
}
