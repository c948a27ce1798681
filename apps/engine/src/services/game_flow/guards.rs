//! Stateless admission checks for player actions.
//!
//! Pure reads over a session; they run before an action queues for the
//! session lock and again inside the atomic section.

use crate::domain::roles::{Potion, Role};
use crate::domain::rules::can_vote;
use crate::domain::state::{ParticipantId, Session, SubPhase};
use crate::errors::domain::{DomainError, GuardKind};

use super::{ActionRequest, Origin, PlayerAction};

/// The step an action belongs to. `Skip` is accepted in any step with a
/// single acting role.
fn expected_step(action: &PlayerAction) -> Option<SubPhase> {
    match action {
        PlayerAction::Bond { .. } => Some(SubPhase::Cupid),
        PlayerAction::Inspect { .. } => Some(SubPhase::Seer),
        PlayerAction::Protect { .. } => Some(SubPhase::Protector),
        PlayerAction::WolfVote { .. } => Some(SubPhase::Wolves),
        PlayerAction::UsePotion { .. } => Some(SubPhase::Witch),
        PlayerAction::HunterShot { .. } => Some(SubPhase::Hunter),
        PlayerAction::LeaderBallot { .. } => Some(SubPhase::LeaderElection),
        PlayerAction::OpenVote => Some(SubPhase::Deliberation),
        PlayerAction::DayVote { .. } => Some(SubPhase::Vote),
        PlayerAction::Tiebreak { .. } => Some(SubPhase::Tiebreak),
        PlayerAction::Skip => None,
    }
}

/// Role that acts alone in a night step.
pub fn acting_role(step: SubPhase) -> Option<Role> {
    match step {
        SubPhase::Cupid => Some(Role::Cupid),
        SubPhase::Seer => Some(Role::Seer),
        SubPhase::Protector => Some(Role::Protector),
        SubPhase::Witch => Some(Role::Witch),
        SubPhase::Hunter => Some(Role::Hunter),
        _ => None,
    }
}

pub fn admit(session: &Session, request: &ActionRequest) -> Result<(), DomainError> {
    let actor = request.actor;
    if session.is_ended() {
        return Err(DomainError::guard(GuardKind::SessionEnded, "The game is over"));
    }
    if !session.started {
        return Err(DomainError::guard(
            GuardKind::NotStarted,
            "The game has not started",
        ));
    }
    let Some(participant) = session.participant(actor) else {
        return Err(DomainError::guard(
            GuardKind::NotParticipant,
            format!("{actor} is not playing in this session"),
        ));
    };

    check_step(session, &request.action)?;
    check_channel(session, request)?;

    let shooting = matches!(request.action, PlayerAction::HunterShot { .. })
        || (matches!(request.action, PlayerAction::Skip)
            && session.sub_phase() == SubPhase::Hunter);
    if shooting {
        if session.runtime.pending_hunter.map(|p| p.hunter) != Some(actor) {
            return Err(DomainError::guard(
                GuardKind::WrongRole,
                "Only the fallen hunter may shoot now",
            ));
        }
    } else if !participant.alive {
        return Err(DomainError::guard(
            GuardKind::ActorDead,
            "Dead participants cannot act",
        ));
    }

    check_role(session, actor, &request.action)?;

    if let Some(target) = request.action.target() {
        if session.runtime.is_recorded(actor, Some(target)) {
            return Err(DomainError::guard(
                GuardKind::AlreadyActed,
                format!("{actor} already chose {target} in this step"),
            ));
        }
    } else if session.runtime.is_recorded(actor, None) {
        return Err(DomainError::guard(
            GuardKind::AlreadyActed,
            format!("{actor} already acted in this step"),
        ));
    }

    check_target(session, actor, &request.action)
}

fn check_step(session: &Session, action: &PlayerAction) -> Result<(), DomainError> {
    let current = session.sub_phase();
    let fits = match expected_step(action) {
        Some(step) => step == current,
        None => acting_role(current).is_some(),
    };
    if fits {
        Ok(())
    } else {
        Err(DomainError::guard(
            GuardKind::WrongPhase,
            format!("{} is not allowed during {current}", action.as_str()),
        ))
    }
}

fn check_channel(session: &Session, request: &ActionRequest) -> Result<(), DomainError> {
    let expected = match request.action {
        PlayerAction::WolfVote { .. } => Origin::Channel(session.channels.wolves),
        PlayerAction::LeaderBallot { .. }
        | PlayerAction::OpenVote
        | PlayerAction::DayVote { .. }
        | PlayerAction::Tiebreak { .. } => Origin::Channel(session.channels.village),
        PlayerAction::Bond { .. }
        | PlayerAction::Inspect { .. }
        | PlayerAction::Protect { .. }
        | PlayerAction::UsePotion { .. }
        | PlayerAction::HunterShot { .. }
        | PlayerAction::Skip => Origin::Direct,
    };
    if request.origin == expected {
        Ok(())
    } else {
        Err(DomainError::guard(
            GuardKind::WrongChannel,
            format!("{} must be sent via {expected:?}", request.action.as_str()),
        ))
    }
}

fn check_role(
    session: &Session,
    actor: ParticipantId,
    action: &PlayerAction,
) -> Result<(), DomainError> {
    let holds = |role: Role| session.participant(actor).is_some_and(|p| p.has_role(role));
    let needed = match action {
        PlayerAction::Bond { .. } => Some(Role::Cupid),
        PlayerAction::Inspect { .. } => Some(Role::Seer),
        PlayerAction::Protect { .. } => Some(Role::Protector),
        PlayerAction::UsePotion { .. } => Some(Role::Witch),
        PlayerAction::Skip => acting_role(session.sub_phase()),
        PlayerAction::WolfVote { .. } => {
            if !session.participant(actor).is_some_and(|p| p.is_wolf()) {
                return Err(DomainError::guard(
                    GuardKind::WrongRole,
                    "Only wolves vote at night",
                ));
            }
            None
        }
        PlayerAction::OpenVote => {
            if session.leader != Some(actor) && session.host != actor {
                return Err(DomainError::guard(
                    GuardKind::WrongRole,
                    "Only the leader or the host can open the vote",
                ));
            }
            None
        }
        PlayerAction::Tiebreak { .. } => {
            if session.leader != Some(actor) {
                return Err(DomainError::guard(
                    GuardKind::WrongRole,
                    "Only the leader breaks a tie",
                ));
            }
            None
        }
        PlayerAction::LeaderBallot { .. } | PlayerAction::DayVote { .. } => {
            if !can_vote(session, actor) {
                return Err(DomainError::guard(
                    GuardKind::CannotVote,
                    format!("{actor} has lost the right to vote"),
                ));
            }
            None
        }
        PlayerAction::HunterShot { .. } => None,
    };
    let Some(role) = needed else {
        return Ok(());
    };
    if !holds(role) {
        return Err(DomainError::guard(
            GuardKind::WrongRole,
            format!("Only the {role} can do that"),
        ));
    }
    if session.flags.powers_disabled && role.is_village_power() {
        return Err(DomainError::guard(
            GuardKind::PowersDisabled,
            "Village powers were lost with the elder",
        ));
    }
    Ok(())
}

fn living_target(session: &Session, target: ParticipantId) -> Result<(), DomainError> {
    if session.is_alive(target) {
        Ok(())
    } else {
        Err(DomainError::guard(
            GuardKind::InvalidTarget,
            format!("{target} is not a living participant"),
        ))
    }
}

fn check_target(
    session: &Session,
    actor: ParticipantId,
    action: &PlayerAction,
) -> Result<(), DomainError> {
    match *action {
        PlayerAction::Bond { first, second } => {
            living_target(session, first)?;
            living_target(session, second)?;
            if first == second {
                return Err(DomainError::guard(
                    GuardKind::InvalidTarget,
                    "A bond needs two different participants",
                ));
            }
            Ok(())
        }
        PlayerAction::Inspect { target } => {
            living_target(session, target)?;
            if target == actor {
                return Err(DomainError::guard(
                    GuardKind::InvalidTarget,
                    "The seer already knows their own role",
                ));
            }
            Ok(())
        }
        PlayerAction::Protect { target } => {
            living_target(session, target)?;
            if session.runtime.last_protected() == Some(target) {
                return Err(DomainError::guard(
                    GuardKind::InvalidTarget,
                    "Cannot protect the same participant two nights running",
                ));
            }
            Ok(())
        }
        PlayerAction::WolfVote { target } => {
            living_target(session, target)?;
            if session.participant(target).is_some_and(|p| p.is_wolf()) {
                return Err(DomainError::guard(
                    GuardKind::InvalidTarget,
                    "Wolves cannot target a wolf",
                ));
            }
            Ok(())
        }
        PlayerAction::UsePotion { potion, target } => {
            if session.runtime.potion_used(potion) {
                return Err(DomainError::guard(
                    GuardKind::AbilityUsed,
                    format!("The {} potion is gone", potion.as_str()),
                ));
            }
            match potion {
                Potion::Heal if session.night.victim != Some(target) => Err(DomainError::guard(
                    GuardKind::InvalidTarget,
                    "The healing potion only saves tonight's victim",
                )),
                Potion::Heal => Ok(()),
                Potion::Poison => living_target(session, target),
            }
        }
        PlayerAction::HunterShot { target } => {
            living_target(session, target)?;
            if target == actor {
                return Err(DomainError::guard(
                    GuardKind::InvalidTarget,
                    "The hunter cannot shoot themselves",
                ));
            }
            Ok(())
        }
        PlayerAction::LeaderBallot { candidate } => living_target(session, candidate),
        PlayerAction::DayVote { target } => living_target(session, target),
        PlayerAction::Tiebreak { target } => {
            if session.runtime.tiebreak_candidates.contains(&target) {
                Ok(())
            } else {
                Err(DomainError::guard(
                    GuardKind::InvalidTarget,
                    format!("{target} is not among the tied candidates"),
                ))
            }
        }
        PlayerAction::OpenVote | PlayerAction::Skip => Ok(()),
    }
}
