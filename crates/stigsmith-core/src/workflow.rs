//! Workflow Engine
//!
//! Drives one [`RunState`] through the phase graph, one phase at a time:
//!
//! ```text
//! ACQUIRING_STIG        acquire_stig
//! DISCOVERING_BASELINE  find_baseline, or generate_stub when none is published
//! IMPLEMENTING          implement_controls (generated baselines only)
//! SKIP_TO_VALIDATION    discovered baselines go straight to validation
//! VALIDATING            provision_target + run_validation + release_target
//! REMEDIATING           remediate failing controls, then validate again
//! COMMITTING            commit_memory; failure is a warning, not a failed run
//! ```
//!
//! Every tool call runs under the retry policy and the phase timeout, and
//! the task's cancellation token is checked at every phase boundary.

use crate::config::OrchestratorConfig;
use crate::container::ContainerLease;
use crate::error::{ErrorClass, FailureReason, PhaseError, RunStateError};
use crate::knowledge::KnowledgeWriter;
use crate::reporter::RunReport;
use crate::retry::{call_with_retry, RetryPolicy};
use crate::run_state::RunState;
use crate::state_machine::Phase;
use crate::tools::{RemediationScope, StoreReader, ToolSuite};
use crate::types::{BaselineOrigin, TaskRequest, ValidationResult};
use chrono::Utc;
use stigsmith_artifact::BaselineHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Why a phase ended the run
#[derive(Debug)]
struct Halt {
    reason: FailureReason,
    detail: String,
}

impl Halt {
    fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self::new(FailureReason::Internal, detail)
    }
}

impl From<RunStateError> for Halt {
    fn from(err: RunStateError) -> Self {
        Self::internal(err.to_string())
    }
}

/// Terminal reasons for one operation's error classes
#[derive(Debug, Clone, Copy)]
struct FailureMap {
    not_found: FailureReason,
    logic: FailureReason,
    exhausted: FailureReason,
}

impl FailureMap {
    fn halt(self, error: &PhaseError) -> Halt {
        let reason = match error {
            PhaseError::Cancelled => FailureReason::Cancelled,
            PhaseError::Exhausted { .. } => self.exhausted,
            PhaseError::Tool { source, .. } => match source.class() {
                ErrorClass::NotApplicable => self.not_found,
                ErrorClass::Logic => self.logic,
                ErrorClass::Transient => self.exhausted,
            },
        };
        Halt::new(reason, error.to_string())
    }
}

const ACQUIRE: FailureMap = FailureMap {
    not_found: FailureReason::StigUnavailable,
    logic: FailureReason::Internal,
    exhausted: FailureReason::Transport,
};

const FIND: FailureMap = FailureMap {
    not_found: FailureReason::Internal,
    logic: FailureReason::Internal,
    exhausted: FailureReason::Transport,
};

const GENERATE: FailureMap = FailureMap {
    not_found: FailureReason::Generation,
    logic: FailureReason::Generation,
    exhausted: FailureReason::Transport,
};

const IMPLEMENT: FailureMap = FailureMap {
    not_found: FailureReason::Implementation,
    logic: FailureReason::Implementation,
    exhausted: FailureReason::Transport,
};

const PROVISION: FailureMap = FailureMap {
    not_found: FailureReason::NoTargetImage,
    logic: FailureReason::Internal,
    exhausted: FailureReason::Transport,
};

const VALIDATE: FailureMap = FailureMap {
    not_found: FailureReason::Execution,
    logic: FailureReason::Execution,
    exhausted: FailureReason::Execution,
};

/// The orchestrator: one engine, many concurrent runs
///
/// The engine itself holds no per-run state; each `submit` owns its
/// [`RunState`] exclusively. The only thing runs share is the knowledge
/// store behind `tools.memory`.
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    config: OrchestratorConfig,
    tools: ToolSuite,
    retry: RetryPolicy,
    writer: KnowledgeWriter,
}

impl WorkflowEngine {
    #[must_use]
    pub fn new(config: OrchestratorConfig, tools: ToolSuite) -> Self {
        let retry = RetryPolicy::from(config.retry);
        Self {
            config,
            tools,
            retry,
            writer: KnowledgeWriter::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn tools(&self) -> &ToolSuite {
        &self.tools
    }

    /// Run one task to completion
    pub async fn submit(&self, request: TaskRequest) -> RunReport {
        self.submit_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Run one task, stopping at the next suspension point once `cancel` fires
    ///
    /// A cancelled run still releases any target it provisioned and reports
    /// `FAILED(cancelled)` with the newest baseline as partial output. Once
    /// validation has passed, cancellation only skips the knowledge commit.
    pub async fn submit_with_cancellation(
        &self,
        request: TaskRequest,
        cancel: CancellationToken,
    ) -> RunReport {
        let mut state = RunState::new(request, self.config.remediation.max_attempts);
        let span = tracing::info_span!(
            "run",
            run_id = %state.run_id(),
            product = %state.request().product(),
            version = %state.request().version(),
            correlation_id = state.request().correlation_id().unwrap_or(""),
        );

        self.drive(&mut state, &cancel).instrument(span.clone()).await;

        let report = RunReport::from_state(&state);
        span.in_scope(|| {
            tracing::info!(
                status = ?report.status,
                remediation_attempts = report.remediation_attempts,
                elapsed_ms = report.elapsed_ms,
                warnings = report.warnings.len(),
                "run finished"
            );
        });
        report
    }

    async fn drive(&self, state: &mut RunState, cancel: &CancellationToken) {
        if let Err(problem) = state.request().validate() {
            state.fail(FailureReason::Internal, format!("invalid request: {problem}"));
            return;
        }
        tracing::info!(bundle = %state.request().bundle_name(), "run started");

        while !state.phase().is_terminal() {
            let phase = state.phase();
            // a validated baseline is already the result; commit turns
            // cancellation into a warning
            if cancel.is_cancelled() && phase != Phase::Committing {
                state.fail(FailureReason::Cancelled, format!("cancelled before {phase}"));
                break;
            }
            tracing::info!(%phase, "entering phase");

            let step = match phase {
                Phase::AcquiringStig => self.acquire(state, cancel).await,
                Phase::DiscoveringBaseline => self.discover(state, cancel).await,
                Phase::Implementing => self.implement(state, cancel).await,
                Phase::SkipToValidation => state.transition(Phase::Validating).map_err(Halt::from),
                Phase::Validating => self.validate(state, cancel).await,
                Phase::Remediating => self.remediate(state, cancel).await,
                Phase::Committing => self.commit(state, cancel).await,
                Phase::Done | Phase::Failed => break,
            };

            if let Err(halt) = step {
                state.fail(halt.reason, halt.detail);
            }
        }
    }

    async fn acquire(&self, state: &mut RunState, cancel: &CancellationToken) -> Result<(), Halt> {
        let stig = {
            let request = state.request();
            call_with_retry(
                &self.retry,
                self.config.timeouts.acquire_stig(),
                cancel,
                "acquire_stig",
                || self.tools.stig.acquire_stig(request.product(), request.version()),
            )
            .await
            .map_err(|e| ACQUIRE.halt(&e))?
        };

        tracing::info!(
            location = %stig.location,
            controls = stig.controls.len(),
            digest = %stig.digest.short(),
            "STIG acquired"
        );
        state.record_stig(stig)?;
        state.transition(Phase::DiscoveringBaseline)?;
        Ok(())
    }

    async fn discover(&self, state: &mut RunState, cancel: &CancellationToken) -> Result<(), Halt> {
        let found = {
            let request = state.request();
            call_with_retry(
                &self.retry,
                self.config.timeouts.find_baseline(),
                cancel,
                "find_baseline",
                || self.tools.catalog.find_baseline(request.product(), request.version()),
            )
            .await
        };

        match found {
            Ok(baseline) => {
                tracing::info!(baseline = %baseline.id, controls = baseline.controls.len(), "published baseline found");
                state.record_baseline(baseline, BaselineOrigin::Discovered)?;
                state.transition(Phase::SkipToValidation)?;
            }
            Err(err) if err.tool_error().is_some_and(|e| e.is_not_found()) => {
                tracing::info!("no published baseline, generating stub");
                let stub = {
                    let stig = state
                        .stig()
                        .ok_or_else(|| Halt::internal("STIG handle missing after acquisition"))?;
                    call_with_retry(
                        &self.retry,
                        self.config.timeouts.generate_stub(),
                        cancel,
                        "generate_stub",
                        || self.tools.generator.generate_stub(stig),
                    )
                    .await
                    .map_err(|e| GENERATE.halt(&e))?
                };
                tracing::info!(baseline = %stub.id, controls = stub.controls.len(), "stub generated");
                state.record_baseline(stub, BaselineOrigin::Generated)?;
                state.transition(Phase::Implementing)?;
            }
            Err(err) => return Err(FIND.halt(&err)),
        }
        Ok(())
    }

    async fn implement(&self, state: &mut RunState, cancel: &CancellationToken) -> Result<(), Halt> {
        let implemented = {
            let baseline = state
                .baseline()
                .ok_or_else(|| Halt::internal("no baseline to implement"))?;
            let stig = state
                .stig()
                .ok_or_else(|| Halt::internal("STIG handle missing"))?;
            let memory = StoreReader(self.tools.memory.as_ref());
            call_with_retry(
                &self.retry,
                self.config.timeouts.implement(),
                cancel,
                "implement_controls",
                || self.tools.implementer.implement_controls(baseline, stig, &memory),
            )
            .await
            .map_err(|e| IMPLEMENT.halt(&e))?
        };

        tracing::info!(
            baseline = %implemented.id,
            implemented = implemented.implemented_count(),
            controls = implemented.controls.len(),
            "controls implemented"
        );
        state.record_implemented(implemented)?;
        state.transition(Phase::Validating)?;
        Ok(())
    }

    async fn validate(&self, state: &mut RunState, cancel: &CancellationToken) -> Result<(), Halt> {
        let (result, release_warning) = {
            let baseline = state
                .current_baseline()
                .ok_or_else(|| Halt::internal("no baseline to validate"))?;
            self.validation_pass(state.request(), baseline, cancel).await
        };
        if let Some(warning) = release_warning {
            state.warn(warning);
        }
        let result = result?;

        let summary = result.summary();
        let passing = result.is_passing();
        let failing = result.failing_controls();
        tracing::info!(
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            "validation complete"
        );
        state.record_validation(result);

        if passing {
            state.transition(Phase::Committing)?;
            return Ok(());
        }

        if state.can_remediate() {
            let attempt = state.begin_remediation()?;
            tracing::info!(
                attempt,
                max = state.max_remediation_attempts(),
                failing = failing.len(),
                "scheduling remediation"
            );
            state.transition(Phase::Remediating)?;
            return Ok(());
        }

        let detail = if failing.is_empty() {
            format!(
                "validation produced no passing verdicts after {} remediation attempt(s)",
                state.remediation_attempts()
            )
        } else {
            let ids: Vec<&str> = failing.iter().map(|id| id.as_str()).collect();
            format!(
                "{} control(s) still failing after {} remediation attempt(s): {}",
                failing.len(),
                state.remediation_attempts(),
                ids.join(", ")
            )
        };
        Err(Halt::new(FailureReason::ValidationExhausted, detail))
    }

    /// Provision, run, release. The target is released on every path.
    async fn validation_pass(
        &self,
        request: &TaskRequest,
        baseline: &BaselineHandle,
        cancel: &CancellationToken,
    ) -> (Result<ValidationResult, Halt>, Option<String>) {
        let provisioned = call_with_retry(
            &self.retry,
            self.config.timeouts.provision(),
            cancel,
            "provision_target",
            || self.tools.provisioner.provision_target(request.product(), request.version()),
        )
        .await;
        let container = match provisioned {
            Ok(container) => container,
            Err(e) => return (Err(PROVISION.halt(&e)), None),
        };
        tracing::debug!(container = %container.id, image = %container.image, "target provisioned");
        let lease = ContainerLease::new(container, self.tools.provisioner.clone());

        let result = call_with_retry(
            &self.retry,
            self.config.timeouts.validation(),
            cancel,
            "run_validation",
            || self.tools.runner.run_validation(baseline, lease.container()),
        )
        .await
        .map_err(|e| VALIDATE.halt(&e));

        let container_id = lease.container().id.clone();
        let warning = match lease.release(self.config.timeouts.release()).await {
            Ok(()) => None,
            Err(err) => Some(format!("failed to release target {container_id}: {err}")),
        };
        (result, warning)
    }

    async fn remediate(&self, state: &mut RunState, cancel: &CancellationToken) -> Result<(), Halt> {
        let attempt = state.remediation_attempts();
        let revised = {
            let baseline = state
                .current_baseline()
                .ok_or_else(|| Halt::internal("no baseline to remediate"))?;
            let stig = state
                .stig()
                .ok_or_else(|| Halt::internal("STIG handle missing"))?;
            let prior = state
                .latest_validation()
                .ok_or_else(|| Halt::internal("remediation without a validation result"))?;
            let failing = prior.failing_controls();
            let scope = RemediationScope {
                attempt,
                failing: &failing,
                prior,
            };
            let memory = StoreReader(self.tools.memory.as_ref());
            call_with_retry(
                &self.retry,
                self.config.timeouts.implement(),
                cancel,
                "remediate",
                || self.tools.implementer.remediate(baseline, stig, scope, &memory),
            )
            .await
            .map_err(|e| IMPLEMENT.halt(&e))?
        };

        tracing::info!(attempt, baseline = %revised.id, digest = %revised.digest.short(), "remediation applied");
        state.record_remediated(revised);
        state.transition(Phase::Validating)?;
        Ok(())
    }

    async fn commit(&self, state: &mut RunState, cancel: &CancellationToken) -> Result<(), Halt> {
        let committed = {
            let baseline = state
                .current_baseline()
                .ok_or_else(|| Halt::internal("no baseline to commit"))?;
            let commit = self.writer.prepare(baseline, Utc::now());
            let store = self.tools.memory.as_ref();
            call_with_retry(
                &self.retry,
                self.config.timeouts.commit(),
                cancel,
                "commit_memory",
                || self.writer.commit(store, &commit),
            )
            .await
        };

        match committed {
            Ok(ack) => tracing::info!(records_written = ack.records_written, "knowledge store updated"),
            Err(PhaseError::Cancelled) => {
                state.warn("knowledge commit cancelled, baseline not recorded for reuse");
            }
            Err(err) => state.warn(format!("knowledge commit failed: {err}")),
        }

        state.succeed()?;
        Ok(())
    }
}
