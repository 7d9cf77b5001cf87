//! Mutable record of one run
//!
//! Owned by a single engine walk; never shared between tasks. Handles are
//! write-once so every phase's output stays available for diagnostics even
//! after later phases produce newer baselines.

use crate::error::{FailureReason, RunStateError};
use crate::state_machine::{validate_transition, Phase};
use crate::types::{BaselineOrigin, RunId, TaskRequest, ValidationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stigsmith_artifact::{BaselineHandle, StigHandle};
use tokio::time::Instant;

/// A slot that accepts exactly one value
#[derive(Debug, Clone)]
pub struct WriteOnce<T> {
    name: &'static str,
    value: Option<T>,
}

impl<T> WriteOnce<T> {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name, value: None }
    }

    /// # Errors
    /// `HandleAlreadySet` if the slot was written before.
    pub fn set(&mut self, value: T) -> Result<(), RunStateError> {
        if self.value.is_some() {
            return Err(RunStateError::HandleAlreadySet { slot: self.name });
        }
        self.value = Some(value);
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }
}

/// Wall-clock record of one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub phase: Phase,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Terminal state of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    InProgress,
    Succeeded {
        artifact: BaselineHandle,
    },
    Failed {
        reason: FailureReason,
        detail: String,
        /// Best-effort output, never validated
        partial: Option<BaselineHandle>,
    },
}

impl Outcome {
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// Progress of one task through the workflow
#[derive(Debug)]
pub struct RunState {
    run_id: RunId,
    request: TaskRequest,
    started_at: DateTime<Utc>,
    started: Instant,

    phase: Phase,
    phase_started_at: DateTime<Utc>,
    phase_started: Instant,
    timings: Vec<PhaseTiming>,

    stig: WriteOnce<StigHandle>,
    baseline: WriteOnce<BaselineHandle>,
    origin: Option<BaselineOrigin>,
    implemented: WriteOnce<BaselineHandle>,
    remediated: Vec<BaselineHandle>,
    validation_history: Vec<ValidationResult>,

    remediation_attempts: u32,
    max_remediation_attempts: u32,

    warnings: Vec<String>,
    outcome: Outcome,
}

impl RunState {
    #[must_use]
    pub fn new(request: TaskRequest, max_remediation_attempts: u32) -> Self {
        let now = Utc::now();
        let started = Instant::now();
        Self {
            run_id: RunId::new(),
            request,
            started_at: now,
            started,
            phase: Phase::AcquiringStig,
            phase_started_at: now,
            phase_started: started,
            timings: Vec::new(),
            stig: WriteOnce::new("stig"),
            baseline: WriteOnce::new("baseline"),
            origin: None,
            implemented: WriteOnce::new("implemented"),
            remediated: Vec::new(),
            validation_history: Vec::new(),
            remediation_attempts: 0,
            max_remediation_attempts,
            warnings: Vec::new(),
            outcome: Outcome::InProgress,
        }
    }

    /// Move to `to`, closing the timing record of the current phase
    ///
    /// # Errors
    /// Transition not in the phase graph, or run already terminal.
    pub fn transition(&mut self, to: Phase) -> Result<(), RunStateError> {
        validate_transition(self.phase, to)?;
        self.close_phase();
        tracing::debug!(run_id = %self.run_id, from = %self.phase, %to, "phase transition");
        self.phase = to;
        Ok(())
    }

    fn close_phase(&mut self) {
        let elapsed = self.phase_started.elapsed();
        self.timings.push(PhaseTiming {
            phase: self.phase,
            started_at: self.phase_started_at,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        });
        self.phase_started = Instant::now();
        self.phase_started_at = Utc::now();
    }

    /// # Errors
    /// STIG already recorded.
    pub fn record_stig(&mut self, stig: StigHandle) -> Result<(), RunStateError> {
        self.stig.set(stig)
    }

    /// # Errors
    /// Baseline already recorded.
    pub fn record_baseline(
        &mut self,
        baseline: BaselineHandle,
        origin: BaselineOrigin,
    ) -> Result<(), RunStateError> {
        self.baseline.set(baseline)?;
        self.origin = Some(origin);
        Ok(())
    }

    /// # Errors
    /// Implemented baseline already recorded.
    pub fn record_implemented(&mut self, baseline: BaselineHandle) -> Result<(), RunStateError> {
        self.implemented.set(baseline)
    }

    pub fn record_remediated(&mut self, baseline: BaselineHandle) {
        self.remediated.push(baseline);
    }

    pub fn record_validation(&mut self, result: ValidationResult) {
        self.validation_history.push(result);
    }

    #[inline]
    #[must_use]
    pub fn can_remediate(&self) -> bool {
        self.remediation_attempts < self.max_remediation_attempts
    }

    /// Count one more remediation attempt and return its 1-based number
    ///
    /// # Errors
    /// `RemediationCeiling` once the configured maximum is reached; the
    /// counter is left unchanged.
    pub fn begin_remediation(&mut self) -> Result<u32, RunStateError> {
        if !self.can_remediate() {
            return Err(RunStateError::RemediationCeiling {
                max: self.max_remediation_attempts,
            });
        }
        self.remediation_attempts += 1;
        Ok(self.remediation_attempts)
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(run_id = %self.run_id, "{message}");
        self.warnings.push(message);
    }

    /// Finish in `Done` with the current baseline as artifact
    ///
    /// # Errors
    /// `MissingArtifact` if no baseline was recorded, otherwise an illegal
    /// transition (e.g. not in `Committing`).
    pub fn succeed(&mut self) -> Result<(), RunStateError> {
        let artifact = self
            .current_baseline()
            .cloned()
            .ok_or(RunStateError::MissingArtifact)?;
        self.transition(Phase::Done)?;
        self.outcome = Outcome::Succeeded { artifact };
        Ok(())
    }

    /// Finish in `Failed`, attaching the newest baseline as partial output
    ///
    /// Calling this on an already-terminal run is a no-op so that the first
    /// recorded reason wins.
    pub fn fail(&mut self, reason: FailureReason, detail: impl Into<String>) {
        if self.phase.is_terminal() {
            return;
        }
        let detail = detail.into();
        tracing::error!(run_id = %self.run_id, phase = %self.phase, %reason, %detail, "run failed");
        let partial = self.current_baseline().cloned();
        // Failed is reachable from every live phase
        let _ = self.transition(Phase::Failed);
        self.outcome = Outcome::Failed {
            reason,
            detail,
            partial,
        };
    }

    /// Newest baseline: remediated, then implemented, then discovered/stub
    #[must_use]
    pub fn current_baseline(&self) -> Option<&BaselineHandle> {
        self.remediated
            .last()
            .or_else(|| self.implemented.get())
            .or_else(|| self.baseline.get())
    }

    #[inline]
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    #[inline]
    #[must_use]
    pub fn request(&self) -> &TaskRequest {
        &self.request
    }

    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[inline]
    #[must_use]
    pub fn stig(&self) -> Option<&StigHandle> {
        self.stig.get()
    }

    #[inline]
    #[must_use]
    pub fn baseline(&self) -> Option<&BaselineHandle> {
        self.baseline.get()
    }

    #[inline]
    #[must_use]
    pub fn implemented(&self) -> Option<&BaselineHandle> {
        self.implemented.get()
    }

    #[inline]
    #[must_use]
    pub fn remediated(&self) -> &[BaselineHandle] {
        &self.remediated
    }

    #[inline]
    #[must_use]
    pub fn origin(&self) -> Option<BaselineOrigin> {
        self.origin
    }

    #[inline]
    #[must_use]
    pub fn latest_validation(&self) -> Option<&ValidationResult> {
        self.validation_history.last()
    }

    #[inline]
    #[must_use]
    pub fn validation_history(&self) -> &[ValidationResult] {
        &self.validation_history
    }

    #[inline]
    #[must_use]
    pub fn remediation_attempts(&self) -> u32 {
        self.remediation_attempts
    }

    #[inline]
    #[must_use]
    pub fn max_remediation_attempts(&self) -> u32 {
        self.max_remediation_attempts
    }

    #[inline]
    #[must_use]
    pub fn timings(&self) -> &[PhaseTiming] {
        &self.timings
    }

    #[inline]
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    #[inline]
    #[must_use]
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    #[inline]
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[inline]
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
