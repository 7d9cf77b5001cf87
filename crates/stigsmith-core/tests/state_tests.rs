use proptest::prelude::*;
use stigsmith_core::{allowed_transitions, validate_transition, Phase, StateMachineError};

fn any_phase() -> impl Strategy<Value = Phase> {
    prop_oneof![
        Just(Phase::AcquiringStig),
        Just(Phase::DiscoveringBaseline),
        Just(Phase::Implementing),
        Just(Phase::SkipToValidation),
        Just(Phase::Validating),
        Just(Phase::Remediating),
        Just(Phase::Committing),
        Just(Phase::Done),
        Just(Phase::Failed),
    ]
}

#[test]
fn test_acquiring_transitions() {
    assert!(validate_transition(Phase::AcquiringStig, Phase::DiscoveringBaseline).is_ok());
    assert!(validate_transition(Phase::AcquiringStig, Phase::Failed).is_ok());

    // Invalid
    assert!(validate_transition(Phase::AcquiringStig, Phase::Implementing).is_err());
    assert!(validate_transition(Phase::AcquiringStig, Phase::Validating).is_err());
}

#[test]
fn test_validation_loop_transitions() {
    assert!(validate_transition(Phase::Validating, Phase::Remediating).is_ok());
    assert!(validate_transition(Phase::Remediating, Phase::Validating).is_ok());
    assert!(validate_transition(Phase::Validating, Phase::Committing).is_ok());

    assert!(validate_transition(Phase::Remediating, Phase::Committing).is_err());
    assert!(validate_transition(Phase::Validating, Phase::Done).is_err());
}

#[test]
fn test_commit_never_skipped() {
    for phase in Phase::ALL {
        if phase != Phase::Committing {
            assert!(validate_transition(phase, Phase::Done).is_err(), "{phase} -> DONE");
        }
    }
}

proptest! {
    #[test]
    fn prop_validation_agrees_with_allowed(from in any_phase(), to in any_phase()) {
        let res = validate_transition(from, to);
        let allowed = allowed_transitions(from);

        if res.is_ok() {
            prop_assert!(allowed.contains(&to));
        } else {
            prop_assert!(!allowed.contains(&to));
        }
    }

    #[test]
    fn prop_terminal_phases_absorb(to in any_phase()) {
        prop_assert_eq!(
            validate_transition(Phase::Done, to),
            Err(StateMachineError::AlreadyTerminal(Phase::Done))
        );
        prop_assert_eq!(
            validate_transition(Phase::Failed, to),
            Err(StateMachineError::AlreadyTerminal(Phase::Failed))
        );
    }

    #[test]
    fn prop_failed_reachable_from_live_phases(from in any_phase()) {
        prop_assume!(!from.is_terminal());
        prop_assert!(validate_transition(from, Phase::Failed).is_ok());
    }

    #[test]
    fn prop_random_walk_ends_terminal(choices in proptest::collection::vec(0usize..8, 1..64)) {
        let mut phase = Phase::AcquiringStig;
        for choice in choices {
            let next = allowed_transitions(phase);
            if next.is_empty() {
                break;
            }
            let to = next[choice % next.len()];
            prop_assert!(validate_transition(phase, to).is_ok());
            phase = to;
        }
        prop_assert!(!allowed_transitions(phase).is_empty() || phase.is_terminal());
    }
}
