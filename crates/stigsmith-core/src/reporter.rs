//! Run Reporter
//!
//! [`RunReport::from_state`] is a pure read of a finished [`RunState`]; it is
//! the only thing a caller ever receives from the engine.

use crate::error::FailureReason;
use crate::run_state::{Outcome, PhaseTiming, RunState};
use crate::state_machine::Phase;
use crate::types::{BaselineOrigin, RunId, ValidationSummary};
use serde::{Deserialize, Serialize};
use stigsmith_artifact::{BaselineHandle, ContentHash};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

/// The baseline handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub baseline_id: String,
    pub kind: String,
    pub location: String,
    pub digest: ContentHash,
    /// Passed a full validation run; partial output on failure is `false`
    pub validated: bool,
    pub control_count: usize,
    pub implemented_count: usize,
}

impl ArtifactSummary {
    fn of(baseline: &BaselineHandle, validated: bool) -> Self {
        Self {
            baseline_id: baseline.id.clone(),
            kind: baseline.kind.label(),
            location: baseline.location.clone(),
            digest: baseline.digest,
            validated,
            control_count: baseline.controls.len(),
            implemented_count: baseline.implemented_count(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub reason: FailureReason,
    pub detail: String,
    /// Phase that was active when the run failed
    pub phase: Option<Phase>,
}

/// Final outcome record for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub correlation_id: Option<String>,
    pub product: String,
    pub version: String,
    pub bundle_name: String,
    pub status: RunStatus,
    pub artifact: Option<ArtifactSummary>,
    pub failure: Option<FailureSummary>,
    pub baseline_origin: Option<BaselineOrigin>,
    pub remediation_attempts: u32,
    pub max_remediation_attempts: u32,
    pub validation_runs: usize,
    pub last_validation: Option<ValidationSummary>,
    pub timings: Vec<PhaseTiming>,
    pub elapsed_ms: u64,
    pub warnings: Vec<String>,
}

impl RunReport {
    #[must_use]
    pub fn from_state(state: &RunState) -> Self {
        let request = state.request();
        let (status, artifact, failure) = match state.outcome() {
            Outcome::Succeeded { artifact } => (
                RunStatus::Succeeded,
                Some(ArtifactSummary::of(artifact, true)),
                None,
            ),
            Outcome::Failed {
                reason,
                detail,
                partial,
            } => (
                RunStatus::Failed,
                partial.as_ref().map(|b| ArtifactSummary::of(b, false)),
                Some(FailureSummary {
                    reason: *reason,
                    detail: detail.clone(),
                    phase: failed_in(state.timings()),
                }),
            ),
            // A walk always ends terminal; reported as internal if it did not
            Outcome::InProgress => (
                RunStatus::Failed,
                state.current_baseline().map(|b| ArtifactSummary::of(b, false)),
                Some(FailureSummary {
                    reason: FailureReason::Internal,
                    detail: format!("run stopped in {}", state.phase()),
                    phase: Some(state.phase()),
                }),
            ),
        };

        Self {
            run_id: state.run_id(),
            correlation_id: request.correlation_id().map(str::to_string),
            product: request.product().to_string(),
            version: request.version().to_string(),
            bundle_name: request.bundle_name(),
            status,
            artifact,
            failure,
            baseline_origin: state.origin(),
            remediation_attempts: state.remediation_attempts(),
            max_remediation_attempts: state.max_remediation_attempts(),
            validation_runs: state.validation_history().len(),
            last_validation: state.latest_validation().map(|v| v.summary()),
            timings: state.timings().to_vec(),
            elapsed_ms: u64::try_from(state.elapsed().as_millis()).unwrap_or(u64::MAX),
            warnings: state.warnings().to_vec(),
        }
    }

    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    #[inline]
    #[must_use]
    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.failure.as_ref().map(|f| f.reason)
    }

    /// # Errors
    /// Serialization failure.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Plain text summary for terminals and logs
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Stigsmith Run Report ===\n\n");
        report.push_str(&format!("Run: {}\n", self.run_id));
        if let Some(correlation) = &self.correlation_id {
            report.push_str(&format!("Correlation: {correlation}\n"));
        }
        report.push_str(&format!("Product: {} {}\n", self.product, self.version));
        report.push_str(&format!("Bundle: {}\n", self.bundle_name));
        if let Some(origin) = self.baseline_origin {
            report.push_str(&format!("Baseline Origin: {origin:?}\n"));
        }
        report.push_str(&format!(
            "Remediation Attempts: {}/{}\n",
            self.remediation_attempts, self.max_remediation_attempts
        ));
        report.push_str(&format!("Validation Runs: {}\n", self.validation_runs));
        if let Some(summary) = &self.last_validation {
            report.push_str(&format!(
                "Last Validation: {} passed, {} failed, {} skipped\n",
                summary.passed, summary.failed, summary.skipped
            ));
        }
        report.push_str(&format!("Elapsed: {}ms\n", self.elapsed_ms));

        if let Some(artifact) = &self.artifact {
            report.push_str("\n=== Artifact ===\n");
            report.push_str(&format!("Baseline: {} ({})\n", artifact.baseline_id, artifact.kind));
            report.push_str(&format!("Location: {}\n", artifact.location));
            report.push_str(&format!("Digest: {}\n", artifact.digest.short()));
            report.push_str(&format!(
                "Controls: {} ({} implemented)\n",
                artifact.control_count, artifact.implemented_count
            ));
            if !artifact.validated {
                report.push_str("UNVALIDATED: best-effort output, not all controls pass\n");
            }
        }

        if !self.timings.is_empty() {
            report.push_str("\n=== Phases ===\n");
            for timing in &self.timings {
                report.push_str(&format!("{:<22} {}ms\n", timing.phase.as_str(), timing.elapsed_ms));
            }
        }

        if !self.warnings.is_empty() {
            report.push_str("\n=== Warnings ===\n");
            for (i, warning) in self.warnings.iter().enumerate() {
                report.push_str(&format!("{}. {}\n", i + 1, warning));
            }
        }

        if let Some(failure) = &self.failure {
            report.push_str(&format!("\nFailure: {} ({})\n", failure.reason, failure.detail));
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            match self.status {
                RunStatus::Succeeded => "SUCCEEDED",
                RunStatus::Failed => "FAILED",
            }
        ));

        report
    }
}

/// The last non-terminal phase is the one that was closed by the move to Failed
fn failed_in(timings: &[PhaseTiming]) -> Option<Phase> {
    timings.last().map(|t| t.phase)
}
