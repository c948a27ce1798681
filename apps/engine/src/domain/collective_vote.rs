//! Two-round majority vote used by the wolves, with a plurality fallback
//! when the round's timer expires first.
//!
//! In-round resolution needs a strict majority; timeout resolution accepts
//! a plurality. The two paths are intentionally different.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::state::ParticipantId;

/// ⌊n/2⌋ + 1
pub const fn majority(eligible: usize) -> usize {
    eligible / 2 + 1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VoteOutcome {
    Target { target: ParticipantId, count: usize },
    NoTarget,
}

impl VoteOutcome {
    pub fn target(&self) -> Option<ParticipantId> {
        match self {
            VoteOutcome::Target { target, .. } => Some(*target),
            VoteOutcome::NoTarget => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastResult {
    /// Recorded; waiting on more votes.
    Pending,
    /// Everyone voted in round 1 without a majority; tally cleared.
    NextRound,
    Resolved(VoteOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectiveVoteState {
    pub round: u8,
    /// voter -> target
    pub tally: BTreeMap<ParticipantId, ParticipantId>,
    pub resolved: bool,
    pub outcome: Option<VoteOutcome>,
}

impl Default for CollectiveVoteState {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectiveVoteState {
    pub fn new() -> Self {
        Self {
            round: 1,
            tally: BTreeMap::new(),
            resolved: false,
            outcome: None,
        }
    }

    /// Votes per target in the current round.
    pub fn counts(&self) -> BTreeMap<ParticipantId, usize> {
        let mut counts = BTreeMap::new();
        for target in self.tally.values() {
            *counts.entry(*target).or_insert(0) += 1;
        }
        counts
    }

    /// Record (or overwrite) `voter`'s choice among `eligible` voters.
    pub fn cast(
        &mut self,
        voter: ParticipantId,
        target: ParticipantId,
        eligible: usize,
    ) -> CastResult {
        if let Some(outcome) = self.outcome.filter(|_| self.resolved) {
            return CastResult::Resolved(outcome);
        }

        self.tally.insert(voter, target);
        let count = self.tally.values().filter(|t| **t == target).count();
        if count >= majority(eligible) {
            return self.finish(VoteOutcome::Target { target, count });
        }

        if self.tally.len() < eligible {
            return CastResult::Pending;
        }

        if self.round == 1 {
            self.round = 2;
            self.tally.clear();
            CastResult::NextRound
        } else {
            self.finish(VoteOutcome::NoTarget)
        }
    }

    /// Timer fired before the vote settled: strict plurality or nothing.
    pub fn resolve_on_timeout(&mut self) -> VoteOutcome {
        if let Some(outcome) = self.outcome.filter(|_| self.resolved) {
            return outcome;
        }
        let outcome = match plurality(&self.counts()) {
            Plurality::Winner(target, count) => VoteOutcome::Target { target, count },
            Plurality::Tie(_) | Plurality::Empty => VoteOutcome::NoTarget,
        };
        self.resolved = true;
        self.outcome = Some(outcome);
        outcome
    }

    fn finish(&mut self, outcome: VoteOutcome) -> CastResult {
        self.resolved = true;
        self.outcome = Some(outcome);
        CastResult::Resolved(outcome)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plurality<K> {
    Winner(K, usize),
    /// Top candidates sharing the highest count, ascending.
    Tie(Vec<K>),
    Empty,
}

pub fn plurality<K: Ord + Copy>(counts: &BTreeMap<K, usize>) -> Plurality<K> {
    let Some(top) = counts.values().copied().max().filter(|c| *c > 0) else {
        return Plurality::Empty;
    };
    let leaders: Vec<K> = counts
        .iter()
        .filter(|(_, c)| **c == top)
        .map(|(k, _)| *k)
        .collect();
    match leaders.as_slice() {
        [only] => Plurality::Winner(*only, top),
        _ => Plurality::Tie(leaders),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(raw: u64) -> ParticipantId {
        ParticipantId(raw)
    }

    const A: ParticipantId = ParticipantId(100);
    const B: ParticipantId = ParticipantId(200);
    const C: ParticipantId = ParticipantId(300);

    #[test]
    fn majority_is_floor_half_plus_one() {
        assert_eq!(majority(1), 1);
        assert_eq!(majority(2), 2);
        assert_eq!(majority(3), 2);
        assert_eq!(majority(4), 3);
        assert_eq!(majority(5), 3);
    }

    #[test]
    fn two_of_three_resolves_immediately() {
        let mut vote = CollectiveVoteState::new();
        assert_eq!(vote.cast(p(1), A, 3), CastResult::Pending);
        assert_eq!(
            vote.cast(p(2), A, 3),
            CastResult::Resolved(VoteOutcome::Target {
                target: A,
                count: 2
            })
        );
        assert!(vote.resolved);
    }

    #[test]
    fn split_round_one_moves_to_round_two() {
        let mut vote = CollectiveVoteState::new();
        assert_eq!(vote.cast(p(1), A, 2), CastResult::Pending);
        assert_eq!(vote.cast(p(2), B, 2), CastResult::NextRound);
        assert_eq!(vote.round, 2);
        assert!(vote.tally.is_empty());
        assert!(!vote.resolved);
    }

    #[test]
    fn split_round_two_resolves_without_target() {
        let mut vote = CollectiveVoteState::new();
        vote.round = 2;
        vote.cast(p(1), A, 3);
        vote.cast(p(2), B, 3);
        assert_eq!(
            vote.cast(p(3), C, 3),
            CastResult::Resolved(VoteOutcome::NoTarget)
        );
        assert!(vote.resolved);
        assert_eq!(vote.outcome, Some(VoteOutcome::NoTarget));
    }

    #[test]
    fn overwritten_vote_counts_once() {
        let mut vote = CollectiveVoteState::new();
        vote.cast(p(1), A, 3);
        vote.cast(p(1), B, 3);
        assert_eq!(vote.counts().get(&A), None);
        assert_eq!(vote.counts().get(&B), Some(&1));
    }

    #[test]
    fn timeout_takes_strict_plurality() {
        let mut vote = CollectiveVoteState::new();
        vote.tally.insert(p(1), A);
        vote.tally.insert(p(2), A);
        vote.tally.insert(p(3), B);
        assert_eq!(
            vote.resolve_on_timeout(),
            VoteOutcome::Target {
                target: A,
                count: 2
            }
        );
    }

    #[test]
    fn timeout_tie_or_silence_chooses_nobody() {
        let mut tied = CollectiveVoteState::new();
        tied.tally.insert(p(1), A);
        tied.tally.insert(p(2), B);
        assert_eq!(tied.resolve_on_timeout(), VoteOutcome::NoTarget);

        let mut empty = CollectiveVoteState::new();
        assert_eq!(empty.resolve_on_timeout(), VoteOutcome::NoTarget);
        assert!(empty.resolved);
    }

    #[test]
    fn resolved_state_ignores_further_casts() {
        let mut vote = CollectiveVoteState::new();
        vote.cast(p(1), A, 1);
        assert_eq!(
            vote.cast(p(1), B, 1),
            CastResult::Resolved(VoteOutcome::Target {
                target: A,
                count: 1
            })
        );
    }
}
