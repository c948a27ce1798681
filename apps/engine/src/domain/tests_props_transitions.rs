//! Property tests for the transition tables (pure domain).

use proptest::prelude::*;

use crate::domain::state::{Phase, SubPhase};
use crate::domain::transitions::{
    is_valid_phase_transition, is_valid_transition, SUB_PHASE_TABLE,
};

fn any_sub_phase() -> impl Strategy<Value = SubPhase> {
    prop::sample::select(SubPhase::ALL.to_vec())
}

fn any_phase() -> impl Strategy<Value = Phase> {
    prop::sample::select(Phase::ALL.to_vec())
}

/// Independent restatement of the authored table as (from, to) pairs.
fn listed(from: SubPhase, to: SubPhase) -> bool {
    use SubPhase::*;
    matches!(
        (from, to),
        (Cupid, Seer | Protector | Wolves)
            | (Seer, Protector | Wolves)
            | (Protector, Wolves)
            | (Wolves, Witch | Dawn)
            | (Witch, Dawn)
            | (Dawn, Hunter | LeaderElection | Deliberation)
            | (Hunter, LeaderElection | Deliberation | Seer | Protector | Wolves)
            | (LeaderElection, Deliberation)
            | (Deliberation, Vote)
            | (Vote, Tiebreak | Hunter | Seer | Protector | Wolves)
            | (Tiebreak, Hunter | Seer | Protector | Wolves)
    )
}

proptest! {
    /// Same-state is always valid.
    #[test]
    fn prop_same_state_is_valid(step in any_sub_phase(), phase in any_phase()) {
        prop_assert!(is_valid_transition(step, step));
        prop_assert!(is_valid_phase_transition(phase, phase));
    }

    /// Every pair agrees with the authored table.
    #[test]
    fn prop_matches_authored_table(from in any_sub_phase(), to in any_sub_phase()) {
        let expected = from == to || listed(from, to);
        prop_assert_eq!(is_valid_transition(from, to), expected,
            "{} -> {}", from, to);
    }

    /// Nothing leaves Ended.
    #[test]
    fn prop_ended_is_terminal(to in any_phase()) {
        prop_assert_eq!(is_valid_phase_transition(Phase::Ended, to), to == Phase::Ended);
    }

    /// Changing sub-phase kind implies a legal phase move.
    #[test]
    fn prop_sub_phase_moves_respect_phase_table(from in any_sub_phase(), to in any_sub_phase()) {
        if is_valid_transition(from, to) {
            prop_assert!(is_valid_phase_transition(from.phase(), to.phase()));
        }
    }
}

#[test]
fn exhaustive_pair_count_matches_table() {
    let listed_pairs: usize = SUB_PHASE_TABLE.iter().map(|(_, next)| next.len()).sum();
    let mut valid_moves = 0;
    for from in SubPhase::ALL {
        for to in SubPhase::ALL {
            if from != to && is_valid_transition(from, to) {
                valid_moves += 1;
            }
        }
    }
    assert_eq!(valid_moves, listed_pairs);
}
