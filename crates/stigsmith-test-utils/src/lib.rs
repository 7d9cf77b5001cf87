//! Testing utilities for the Stigsmith workspace
//!
//! Shared fixtures, engine setup and assertions.

#![allow(missing_docs)]

use std::sync::Arc;
use stigsmith_artifact::{BaselineHandle, BaselineKind, ControlEntry, StigHandle};
use stigsmith_core::simulator::{Script, ScriptedTools};
use stigsmith_core::{
    FailureReason, InMemoryKnowledgeStore, OrchestratorConfig, RetryConfig, RunReport, RunStatus,
    TaskRequest, TimeoutConfig, WorkflowEngine,
};

pub const RHEL9_PROFILE: &str = "\
control 'V-230221' do
  title 'RHEL 9 must be a vendor-supported release.'
  impact 0.7
  describe file('/etc/redhat-release') do
    its('content') { should match /Red Hat Enterprise Linux release 9/ }
  end
end

control 'V-230223' do
  title 'RHEL 9 must implement NIST FIPS-validated cryptography.'
  impact 0.7
  describe command('fips-mode-setup --check') do
    its('stdout') { should match /FIPS mode is enabled/ }
  end
end
";

pub fn rhel9_request() -> TaskRequest {
    TaskRequest::new("RHEL 9", "V1R1")
}

pub fn ubuntu22_request() -> TaskRequest {
    TaskRequest::new("Ubuntu 22", "V1R1")
}

/// Retries with millisecond backoff and one-second deadlines
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig::new()
        .with_retry(RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            multiplier: 2.0,
        })
        .with_timeouts(TimeoutConfig::uniform(1))
}

pub fn sample_controls() -> Vec<ControlEntry> {
    vec![
        ControlEntry::stub("V-230221", "RHEL 9 must be a vendor-supported release."),
        ControlEntry::stub("V-230223", "RHEL 9 must implement NIST FIPS-validated cryptography."),
    ]
}

pub fn sample_stig() -> StigHandle {
    StigHandle::new("RHEL 9", "V1R1", "downloads/rhel-9/V1R1", sample_controls())
}

pub fn stub_baseline() -> BaselineHandle {
    BaselineHandle::new(
        "rhel-9-baseline",
        "artifacts/generated/rhel-9",
        BaselineKind::Stub,
        sample_controls(),
    )
}

pub fn implemented_baseline() -> BaselineHandle {
    let controls = stigsmith_artifact::inspec::parse_controls(RHEL9_PROFILE)
        .into_iter()
        .map(stigsmith_artifact::inspec::ParsedControl::into_entry)
        .collect();
    BaselineHandle::new(
        "rhel-9-baseline",
        "artifacts/generated/rhel-9",
        BaselineKind::Implemented,
        controls,
    )
}

/// Engine over a fresh simulator, fast retry settings
pub fn setup_test_engine(script: Script) -> (WorkflowEngine, Arc<ScriptedTools>) {
    setup_engine_with(script, fast_config())
}

pub fn setup_engine_with(
    script: Script,
    config: OrchestratorConfig,
) -> (WorkflowEngine, Arc<ScriptedTools>) {
    let tools = ScriptedTools::new(script);
    let engine = WorkflowEngine::new(config, tools.suite());
    (engine, tools)
}

/// Engine whose simulator writes into `store`
pub fn setup_shared_engine(
    script: Script,
    store: Arc<InMemoryKnowledgeStore>,
) -> (WorkflowEngine, Arc<ScriptedTools>) {
    let tools = ScriptedTools::with_store(script, store);
    let engine = WorkflowEngine::new(fast_config(), tools.suite());
    (engine, tools)
}

pub fn assert_succeeded(report: &RunReport) {
    assert_eq!(
        report.status,
        RunStatus::Succeeded,
        "expected success, got {:?}",
        report.failure
    );
    let artifact = report.artifact.as_ref().expect("succeeded run carries an artifact");
    assert!(artifact.validated);
}

pub fn assert_failed_with(report: &RunReport, reason: FailureReason) {
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.failure_reason(), Some(reason), "{:?}", report.failure);
}

/// Log to the test harness, filtered by `RUST_LOG`
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
