use std::sync::Arc;
use std::time::Duration;
use stigsmith_core::simulator::{Operation, Script, Step, ValidationStep};
use stigsmith_core::{
    CancellationToken, FailureReason, InMemoryKnowledgeStore, OrchestratorConfig, RetryConfig,
    TaskRequest, TimeoutConfig, ToolError, WorkflowEngine,
};
use stigsmith_test_utils::{
    assert_failed_with, assert_succeeded, fast_config, init_test_tracing, rhel9_request,
    setup_engine_with, setup_shared_engine, setup_test_engine, ubuntu22_request,
};

fn cancel_after(cancel: &CancellationToken, after: Duration) {
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        trigger.cancel();
    });
}

#[tokio::test]
async fn repeated_acquisition_downloads_once() {
    let (engine, tools) = setup_test_engine(Script::discovered());
    let first = engine.submit(rhel9_request()).await;
    let second = engine.submit(rhel9_request()).await;

    assert_succeeded(&first);
    assert_succeeded(&second);
    assert_eq!(tools.calls(Operation::AcquireStig), 2);
    assert_eq!(tools.downloads(), 1);
}

#[tokio::test]
async fn transient_acquire_failures_are_retried() {
    let (engine, tools) = setup_test_engine(Script::discovered().with_acquire(vec![
        Step::transport(),
        Step::transport(),
        Step::Succeed,
    ]));
    let report = engine.submit(rhel9_request()).await;

    assert_succeeded(&report);
    assert_eq!(tools.calls(Operation::AcquireStig), 3);
}

#[tokio::test]
async fn exhausted_transport_fails_run() {
    let (engine, tools) =
        setup_test_engine(Script::discovered().with_find(vec![Step::transport()]));
    let report = engine.submit(rhel9_request()).await;

    assert_failed_with(&report, FailureReason::Transport);
    assert_eq!(tools.calls(Operation::FindBaseline), 3);
    assert_eq!(tools.calls(Operation::GenerateStub), 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_consumes_one_attempt() {
    let (engine, tools) =
        setup_test_engine(Script::discovered().with_acquire(vec![Step::Hang, Step::Succeed]));
    let report = engine.submit(rhel9_request()).await;

    assert_succeeded(&report);
    assert_eq!(tools.calls(Operation::AcquireStig), 2);
}

#[tokio::test(start_paused = true)]
async fn repeated_timeouts_exhaust_budget() {
    let (engine, tools) = setup_test_engine(Script::discovered().with_find(vec![Step::Hang]));
    let report = engine.submit(rhel9_request()).await;

    assert_failed_with(&report, FailureReason::Transport);
    assert_eq!(tools.calls(Operation::FindBaseline), 3);
    assert!(report.failure.unwrap().detail.contains("timed out"));
}

#[tokio::test]
async fn cancelled_before_start_calls_nothing() {
    let (engine, tools) = setup_test_engine(Script::discovered());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = engine.submit_with_cancellation(rhel9_request(), cancel).await;

    assert_failed_with(&report, FailureReason::Cancelled);
    assert_eq!(tools.calls(Operation::AcquireStig), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_validation_releases_target() {
    init_test_tracing();
    let (engine, tools) = setup_engine_with(
        Script::generated().with_validation(vec![ValidationStep::Hang]),
        OrchestratorConfig::new(),
    );
    let cancel = CancellationToken::new();
    cancel_after(&cancel, Duration::from_secs(30));

    let report = engine.submit_with_cancellation(ubuntu22_request(), cancel).await;

    assert_failed_with(&report, FailureReason::Cancelled);
    assert_eq!(tools.calls(Operation::ProvisionTarget), 1);
    assert_eq!(tools.calls(Operation::ReleaseTarget), 1);
    assert_eq!(tools.live_containers(), 0);
    let partial = report.artifact.expect("partial artifact on cancellation");
    assert!(!partial.validated);
    assert_eq!(partial.kind, "implemented");
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_stops_retrying() {
    let (engine, tools) = setup_engine_with(
        Script::discovered().with_find(vec![Step::transport()]),
        fast_config().with_retry(RetryConfig {
            max_attempts: 5,
            initial_backoff_ms: 10_000,
            max_backoff_ms: 10_000,
            multiplier: 1.0,
        }),
    );
    let cancel = CancellationToken::new();
    cancel_after(&cancel, Duration::from_secs(1));

    let report = engine.submit_with_cancellation(rhel9_request(), cancel).await;

    assert_failed_with(&report, FailureReason::Cancelled);
    assert_eq!(tools.calls(Operation::FindBaseline), 1);
    assert_eq!(tools.downstream_calls(), 1);
    assert_eq!(tools.calls(Operation::ProvisionTarget), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_while_committing_keeps_validated_result() {
    let (engine, tools) = setup_engine_with(
        Script::discovered().with_commit(vec![Step::Hang]),
        fast_config().with_timeouts(TimeoutConfig::uniform(60)),
    );
    let cancel = CancellationToken::new();
    cancel_after(&cancel, Duration::from_secs(5));

    let report = engine.submit_with_cancellation(rhel9_request(), cancel).await;

    assert_succeeded(&report);
    assert_eq!(tools.calls(Operation::CommitMemory), 1);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("commit cancelled"));
}

#[tokio::test(start_paused = true)]
async fn overrun_release_is_finished_in_background() {
    let (engine, tools) = setup_test_engine(
        Script::discovered().with_release(vec![Step::Hang, Step::Succeed]),
    );
    let report = engine.submit(rhel9_request()).await;

    assert_succeeded(&report);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("timed out"));

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(tools.calls(Operation::ReleaseTarget), 2);
    assert_eq!(tools.live_containers(), 0);
}

#[tokio::test]
async fn execution_errors_still_release_target() {
    let (engine, tools) = setup_test_engine(Script::discovered().with_validation(vec![
        ValidationStep::Fail(ToolError::Execution("inspec exited 2".into())),
    ]));
    let report = engine.submit(rhel9_request()).await;

    assert_failed_with(&report, FailureReason::Execution);
    assert_eq!(tools.calls(Operation::RunValidation), 3);
    assert_eq!(tools.calls(Operation::ProvisionTarget), 1);
    assert_eq!(tools.calls(Operation::ReleaseTarget), 1);
    assert_eq!(tools.live_containers(), 0);
}

#[tokio::test]
async fn release_failure_becomes_warning() {
    let (engine, tools) =
        setup_test_engine(Script::discovered().with_release(vec![Step::transport()]));
    let report = engine.submit(rhel9_request()).await;

    assert_succeeded(&report);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("failed to release target"));
    assert_eq!(tools.calls(Operation::ReleaseTarget), 1);
}

#[tokio::test]
async fn every_validation_pass_gets_its_own_target() {
    let (engine, tools) = setup_test_engine(Script::generated().with_validation(vec![
        ValidationStep::failing(["V-230221"]),
        ValidationStep::failing(["V-230223"]),
        ValidationStep::PassAll,
    ]));
    let report = engine.submit(ubuntu22_request()).await;

    assert_succeeded(&report);
    assert_eq!(report.remediation_attempts, 2);
    assert_eq!(tools.calls(Operation::ProvisionTarget), 3);
    assert_eq!(tools.calls(Operation::ReleaseTarget), 3);
    assert_eq!(tools.live_containers(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_share_one_store() {
    let store = Arc::new(InMemoryKnowledgeStore::default());
    let products = ["RHEL 8", "RHEL 9", "Ubuntu 20", "Ubuntu 22"];

    let handles: Vec<_> = products
        .into_iter()
        .map(|product| {
            let (engine, tools) = setup_shared_engine(Script::discovered(), store.clone());
            tokio::spawn(async move {
                let report = engine.submit(TaskRequest::new(product, "V1R1")).await;
                (report, tools)
            })
        })
        .collect();

    for handle in handles {
        let (report, tools) = handle.await.unwrap();
        assert_succeeded(&report);
        assert_eq!(tools.calls(Operation::CommitMemory), 1);
    }

    assert_eq!(store.commit_count(), 4);
    assert_eq!(store.control_count(), 3);
    assert_eq!(store.len(), 12);
}

#[tokio::test]
async fn later_runs_learn_from_earlier_ones() {
    let store = Arc::new(InMemoryKnowledgeStore::default());
    let (first, _) = setup_shared_engine(Script::discovered(), store.clone());
    assert_succeeded(&first.submit(rhel9_request()).await);

    let (second, tools) = setup_shared_engine(Script::generated(), store.clone());
    let report = second.submit(TaskRequest::new("RHEL 9 Server", "V1R1")).await;

    assert_succeeded(&report);
    assert!(tools.calls(Operation::QueryMemory) >= 3);
    let latest = store
        .latest(&"V-230221".into())
        .expect("control learned by first run");
    assert!(latest.implementation.contains("published"));
}

#[tokio::test]
async fn engine_is_reusable_across_configs() {
    let tools = stigsmith_core::simulator::ScriptedTools::new(Script::generated().with_validation(
        vec![ValidationStep::failing(["V-230222"])],
    ));
    let strict = WorkflowEngine::new(
        OrchestratorConfig::new().with_max_remediation_attempts(0),
        tools.suite(),
    );
    let lenient = WorkflowEngine::new(
        OrchestratorConfig::new().with_max_remediation_attempts(2),
        tools.suite(),
    );

    let strict_report = strict.submit(ubuntu22_request()).await;
    let lenient_report = lenient.submit(ubuntu22_request()).await;

    assert_eq!(strict_report.remediation_attempts, 0);
    assert_eq!(lenient_report.remediation_attempts, 2);
    assert_failed_with(&strict_report, FailureReason::ValidationExhausted);
    assert_failed_with(&lenient_report, FailureReason::ValidationExhausted);
}
