//! Error types for the workflow core
//!
//! Three layers:
//! - [`ToolError`]: what a tool adapter reports for one call
//! - [`PhaseError`]: what the retry executor reports for one phase operation
//! - [`FailureReason`]: the typed terminal reason a caller sees in the report
//!
//! Adapter errors never cross the engine boundary; they are folded into a
//! `FailureReason` plus a human-readable detail string.

use crate::state_machine::Phase;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Error class used by the engine's branching and retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Definitive: product, baseline or target does not exist. Never retried.
    NotApplicable,
    /// Network or process failure. Retried with bounded backoff.
    Transient,
    /// The tool ran and produced a failure of its own. Terminal for the phase.
    Logic,
}

/// Error returned by a tool adapter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// Nothing exists for the request
    #[error("not found: {what}")]
    NotFound { what: String },

    /// Transport failure talking to the tool service
    #[error("transport error: {0}")]
    Transport(String),

    /// Stub generation failed inside the generator
    #[error("generation error: {0}")]
    Generation(String),

    /// Control implementation or remediation failed
    #[error("implementation error: {0}")]
    Implementation(String),

    /// The test runner process could not complete a run
    #[error("execution error: {0}")]
    Execution(String),
}

impl ToolError {
    #[inline]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    #[inline]
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transport(detail.into())
    }

    /// Classify for branching
    #[inline]
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotApplicable,
            Self::Transport(_) | Self::Execution(_) => ErrorClass::Transient,
            Self::Generation(_) | Self::Implementation(_) => ErrorClass::Logic,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Error from one phase operation after retry policy was applied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhaseError {
    /// Non-retryable adapter error, surfaced on first occurrence
    #[error("{operation}: {source}")]
    Tool {
        operation: &'static str,
        #[source]
        source: ToolError,
    },

    /// Attempt ceiling reached on transient failures or timeouts
    #[error("{operation}: gave up after {attempts} attempts (last: {last})")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        last: String,
    },

    /// Task-level cancellation observed
    #[error("operation cancelled")]
    Cancelled,
}

impl PhaseError {
    /// The adapter error behind this failure, if it was a definitive one
    #[inline]
    #[must_use]
    pub fn tool_error(&self) -> Option<&ToolError> {
        match self {
            Self::Tool { source, .. } => Some(source),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Timeout marker used when an attempt overruns its phase deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut {
    pub after: Duration,
}

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timed out after {}ms", self.after.as_millis())
    }
}

/// Illegal phase transition on a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition { from: Phase, to: Phase },

    #[error("run is already terminal ({0})")]
    AlreadyTerminal(Phase),
}

/// Errors from recording progress on a run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunStateError {
    #[error(transparent)]
    Transition(#[from] StateMachineError),

    /// A write-once handle slot was written twice
    #[error("{slot} handle already recorded")]
    HandleAlreadySet { slot: &'static str },

    /// Remediation counter would exceed its ceiling
    #[error("remediation ceiling of {max} reached")]
    RemediationCeiling { max: u32 },

    /// Run tried to finish without any baseline recorded
    #[error("no baseline recorded")]
    MissingArtifact,
}

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render TOML: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Typed terminal failure reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// No STIG published for the product/version
    StigUnavailable,
    /// Transient failures exhausted the attempt budget
    Transport,
    /// Stub generation failed
    Generation,
    /// Implementation or remediation failed
    Implementation,
    /// No container image exists for the target
    NoTargetImage,
    /// Remediation budget spent with controls still failing
    ValidationExhausted,
    /// The test runner could not complete a run within the attempt budget
    Execution,
    /// Caller withdrew the task
    Cancelled,
    /// Malformed request or broken run invariant
    Internal,
}

impl FailureReason {
    /// Stable snake_case code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::StigUnavailable => "stig_unavailable",
            Self::Transport => "transport",
            Self::Generation => "generation",
            Self::Implementation => "implementation",
            Self::NoTargetImage => "no_target_image",
            Self::ValidationExhausted => "validation_exhausted",
            Self::Execution => "execution",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
