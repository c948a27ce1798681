//! Seed derivation for deterministic random choices within a session.
//!
//! Every random decision is derived from the session's `rng_seed` so that
//! replays and recovered sessions make the same picks.

use crate::domain::state::SubPhase;

/// Seed for dealing roles at start.
pub fn derive_assignment_seed(session_seed: u64) -> u64 {
    session_seed.wrapping_add(1)
}

/// Seed for breaking a tie in `step` on day `day`.
///
/// Distinct per (day, step) so that an election tie and a vote tie on the
/// same day do not mirror each other.
pub fn derive_tiebreak_seed(session_seed: u64, day: u32, step: SubPhase) -> u64 {
    session_seed
        .wrapping_add((day as u64).wrapping_mul(1_000_003))
        .wrapping_add((step as u64).wrapping_mul(101))
        .wrapping_add(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiebreak_seeds_differ_by_day_and_step() {
        let base = 12_345;
        assert_eq!(
            derive_tiebreak_seed(base, 2, SubPhase::Vote),
            derive_tiebreak_seed(base, 2, SubPhase::Vote)
        );
        assert_ne!(
            derive_tiebreak_seed(base, 1, SubPhase::Vote),
            derive_tiebreak_seed(base, 2, SubPhase::Vote)
        );
        assert_ne!(
            derive_tiebreak_seed(base, 1, SubPhase::Vote),
            derive_tiebreak_seed(base, 1, SubPhase::LeaderElection)
        );
        assert_ne!(derive_assignment_seed(base), base);
    }
}
