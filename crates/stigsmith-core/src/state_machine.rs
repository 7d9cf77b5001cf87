//! Workflow phases and their legal transitions
//!
//! ```text
//! AcquiringStig -> DiscoveringBaseline -> {Implementing | SkipToValidation}
//!   -> Validating -> {Remediating -> Validating}* -> Committing -> Done
//! ```
//!
//! `Failed` is absorbing and reachable from every non-terminal phase.

use crate::error::StateMachineError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    AcquiringStig,
    DiscoveringBaseline,
    Implementing,
    SkipToValidation,
    Validating,
    Remediating,
    Committing,
    Done,
    Failed,
}

impl Phase {
    pub const ALL: [Phase; 9] = [
        Phase::AcquiringStig,
        Phase::DiscoveringBaseline,
        Phase::Implementing,
        Phase::SkipToValidation,
        Phase::Validating,
        Phase::Remediating,
        Phase::Committing,
        Phase::Done,
        Phase::Failed,
    ];

    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::AcquiringStig => "ACQUIRING_STIG",
            Phase::DiscoveringBaseline => "DISCOVERING_BASELINE",
            Phase::Implementing => "IMPLEMENTING",
            Phase::SkipToValidation => "SKIP_TO_VALIDATION",
            Phase::Validating => "VALIDATING",
            Phase::Remediating => "REMEDIATING",
            Phase::Committing => "COMMITTING",
            Phase::Done => "DONE",
            Phase::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[must_use]
pub fn allowed_transitions(from: Phase) -> Vec<Phase> {
    use Phase::*;
    match from {
        AcquiringStig => vec![DiscoveringBaseline, Failed],
        DiscoveringBaseline => vec![Implementing, SkipToValidation, Failed],
        Implementing => vec![Validating, Failed],
        SkipToValidation => vec![Validating, Failed],
        Validating => vec![Remediating, Committing, Failed],
        Remediating => vec![Validating, Failed],
        Committing => vec![Done, Failed],
        Done | Failed => vec![],
    }
}

/// Check a transition against the phase graph
///
/// # Errors
/// `AlreadyTerminal` when leaving `Done`/`Failed`, `IllegalTransition` for
/// any other edge not in the graph.
pub fn validate_transition(from: Phase, to: Phase) -> Result<(), StateMachineError> {
    if from.is_terminal() {
        return Err(StateMachineError::AlreadyTerminal(from));
    }
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateMachineError::IllegalTransition { from, to })
    }
}
