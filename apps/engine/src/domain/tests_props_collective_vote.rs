//! Property tests for the collective decision engine (pure domain).

use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::domain::collective_vote::{
    majority, plurality, CastResult, CollectiveVoteState, Plurality, VoteOutcome,
};
use crate::domain::state::ParticipantId;

proptest! {
    /// A resolved target always had at least a majority of eligible voters.
    #[test]
    fn prop_resolution_needs_majority(
        votes in prop::collection::vec((1u64..=7, 100u64..=103), 1..30),
        eligible in 1usize..=7,
    ) {
        let mut state = CollectiveVoteState::new();
        for (voter, target) in votes {
            let voter = ParticipantId(voter.min(eligible as u64));
            match state.cast(voter, ParticipantId(target), eligible) {
                CastResult::Resolved(VoteOutcome::Target { count, .. }) => {
                    prop_assert!(count >= majority(eligible));
                    break;
                }
                CastResult::Resolved(VoteOutcome::NoTarget) => {
                    prop_assert_eq!(state.round, 2);
                    break;
                }
                CastResult::NextRound => {
                    prop_assert_eq!(state.round, 2);
                    prop_assert!(state.tally.is_empty());
                }
                CastResult::Pending => prop_assert!(!state.resolved),
            }
        }
        prop_assert!(state.round <= 2);
    }

    /// The timeout path picks the strict top count or nothing.
    #[test]
    fn prop_timeout_is_strict_plurality(
        tally in prop::collection::btree_map(1u64..=9, 100u64..=103, 0..9),
    ) {
        let mut state = CollectiveVoteState::new();
        state.tally = tally
            .into_iter()
            .map(|(v, t)| (ParticipantId(v), ParticipantId(t)))
            .collect();
        let counts = state.counts();
        let outcome = state.resolve_on_timeout();
        prop_assert!(state.resolved);
        match outcome {
            VoteOutcome::Target { target, count } => {
                prop_assert_eq!(counts.get(&target).copied(), Some(count));
                prop_assert!(counts.iter().all(|(t, c)| *t == target || *c < count));
            }
            VoteOutcome::NoTarget => {
                let top = counts.values().copied().max().unwrap_or(0);
                let leaders = counts.values().filter(|c| **c == top).count();
                prop_assert!(top == 0 || leaders > 1);
            }
        }
    }
}

#[test]
fn plurality_reports_tied_leaders_in_order() {
    let counts: BTreeMap<u32, usize> = [(3, 2), (1, 2), (2, 1)].into_iter().collect();
    assert_eq!(plurality(&counts), Plurality::Tie(vec![1, 3]));
    assert_eq!(plurality(&BTreeMap::<u32, usize>::new()), Plurality::Empty);
}
