//! Domain layer: pure session types, transition tables and game rules.

pub mod collective_vote;
pub mod roles;
pub mod rules;
pub mod runtime;
pub mod seed_derivation;
pub mod state;
pub mod transitions;

#[cfg(test)]
pub(crate) mod test_state_helpers;
#[cfg(test)]
mod tests_props_collective_vote;
#[cfg(test)]
mod tests_props_transitions;
#[cfg(test)]
mod tests_rules;

pub use collective_vote::{majority, CastResult, CollectiveVoteState, VoteOutcome};
pub use roles::{Faction, Potion, Role};
pub use runtime::{RoleExtension, RuntimeState};
pub use state::{
    ActionLogEntry, ChannelId, NightTargets, Participant, ParticipantId, Phase, RevealLevel,
    Session, SessionChannels, SessionFlags, SessionId, SubPhase, Winner,
};
pub use transitions::{is_valid_phase_transition, is_valid_transition};
