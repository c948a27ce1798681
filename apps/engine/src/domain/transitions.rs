//! Authored adjacency tables for phases and sub-phases.
//!
//! Night order depends on which roles are alive, so the table lists every
//! step that could possibly come next; the game flow picks among them.

use crate::domain::state::{Phase, SubPhase};

/// Every permitted sub-phase move other than staying put.
pub const SUB_PHASE_TABLE: [(SubPhase, &[SubPhase]); 11] = [
    (
        SubPhase::Cupid,
        &[SubPhase::Seer, SubPhase::Protector, SubPhase::Wolves],
    ),
    (SubPhase::Seer, &[SubPhase::Protector, SubPhase::Wolves]),
    (SubPhase::Protector, &[SubPhase::Wolves]),
    (SubPhase::Wolves, &[SubPhase::Witch, SubPhase::Dawn]),
    (SubPhase::Witch, &[SubPhase::Dawn]),
    (
        SubPhase::Dawn,
        &[
            SubPhase::Hunter,
            SubPhase::LeaderElection,
            SubPhase::Deliberation,
        ],
    ),
    (
        SubPhase::Hunter,
        &[
            SubPhase::LeaderElection,
            SubPhase::Deliberation,
            SubPhase::Seer,
            SubPhase::Protector,
            SubPhase::Wolves,
        ],
    ),
    (SubPhase::LeaderElection, &[SubPhase::Deliberation]),
    (SubPhase::Deliberation, &[SubPhase::Vote]),
    (
        SubPhase::Vote,
        &[
            SubPhase::Tiebreak,
            SubPhase::Hunter,
            SubPhase::Seer,
            SubPhase::Protector,
            SubPhase::Wolves,
        ],
    ),
    (
        SubPhase::Tiebreak,
        &[
            SubPhase::Hunter,
            SubPhase::Seer,
            SubPhase::Protector,
            SubPhase::Wolves,
        ],
    ),
];

/// Allowed successors of `from` (excluding `from` itself).
pub fn successors(from: SubPhase) -> &'static [SubPhase] {
    SUB_PHASE_TABLE
        .iter()
        .find(|(step, _)| *step == from)
        .map(|(_, next)| *next)
        .unwrap_or(&[])
}

/// Total over both domains; same-state is always valid.
pub fn is_valid_transition(from: SubPhase, to: SubPhase) -> bool {
    from == to || successors(from).contains(&to)
}

pub fn is_valid_phase_transition(from: Phase, to: Phase) -> bool {
    if from == to {
        return true;
    }
    matches!(
        (from, to),
        (Phase::Night, Phase::Day)
            | (Phase::Day, Phase::Night)
            | (Phase::Night, Phase::Ended)
            | (Phase::Day, Phase::Ended)
    )
}
