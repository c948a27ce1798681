//! Game rules over a session: night order, deaths, executions and win
//! detection. Pure with respect to I/O; functions that change state take
//! `&mut Session` and touch only plain fields.

use std::collections::BTreeMap;

use rand::seq::IndexedRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::domain::roles::{Faction, Role};
use crate::domain::state::{ParticipantId, RevealLevel, Session, SubPhase, Winner};

/// Night steps that can open a night, in order. Wolves always act.
const NIGHT_ORDER: [SubPhase; 4] = [
    SubPhase::Cupid,
    SubPhase::Seer,
    SubPhase::Protector,
    SubPhase::Wolves,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathCause {
    Wolves,
    Poison,
    Heartbreak,
    Execution,
    HunterShot,
}

impl DeathCause {
    pub const fn as_str(self) -> &'static str {
        match self {
            DeathCause::Wolves => "wolves",
            DeathCause::Poison => "poison",
            DeathCause::Heartbreak => "heartbreak",
            DeathCause::Execution => "execution",
            DeathCause::HunterShot => "hunter_shot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Death {
    pub id: ParticipantId,
    pub cause: DeathCause,
}

/// Result of the village executing someone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// The idiot is revealed instead of dying.
    Spared(ParticipantId),
    Killed(Vec<Death>),
}

fn step_applies(session: &Session, step: SubPhase) -> bool {
    match step {
        SubPhase::Cupid => {
            session.day_count == 0 && session.bonds.is_empty() && session.power_available(Role::Cupid)
        }
        SubPhase::Seer => session.power_available(Role::Seer),
        SubPhase::Protector => session.power_available(Role::Protector),
        SubPhase::Wolves => true,
        SubPhase::Witch => {
            session.power_available(Role::Witch) && session.runtime.potions_left()
        }
        _ => false,
    }
}

/// The first applicable night step strictly after `after` (or the first of
/// the night when `after` is `None`).
pub fn next_night_step(session: &Session, after: Option<SubPhase>) -> SubPhase {
    NIGHT_ORDER
        .into_iter()
        .filter(|step| after.map_or(true, |a| *step > a))
        .find(|step| step_applies(session, *step))
        .unwrap_or(SubPhase::Wolves)
}

/// Witch if she can still act, otherwise straight to dawn.
pub fn step_after_wolves(session: &Session) -> SubPhase {
    if step_applies(session, SubPhase::Witch) {
        SubPhase::Witch
    } else {
        SubPhase::Dawn
    }
}

/// Kill `id` and anyone bonded to them. Returns the deaths in order;
/// empty when `id` was already dead.
pub fn kill(session: &mut Session, id: ParticipantId, cause: DeathCause) -> Vec<Death> {
    let mut deaths = Vec::new();
    let mut pending = vec![(id, cause)];
    while let Some((next, why)) = pending.pop() {
        let Some(p) = session.participant_mut(next) else {
            continue;
        };
        if !p.alive {
            continue;
        }
        p.alive = false;
        deaths.push(Death { id: next, cause: why });
        if let Some(lover) = session.lover_of(next) {
            pending.push((lover, DeathCause::Heartbreak));
        }
    }
    if session.leader.is_some_and(|l| !session.is_alive(l)) {
        session.leader = None;
    }
    deaths
}

/// Apply the night's targets: wolves' victim unless protected, healed or
/// saved by the elder's spare life; poison always lands.
pub fn resolve_dawn(session: &mut Session) -> Vec<Death> {
    let night = session.night;
    let mut deaths = Vec::new();

    if let Some(victim) = night.victim {
        let shielded = night.protected == Some(victim) || night.healed == Some(victim);
        if !shielded {
            let spare = session
                .participant(victim)
                .is_some_and(|p| p.has_role(Role::Elder) && p.extra_life);
            if spare {
                if let Some(p) = session.participant_mut(victim) {
                    p.extra_life = false;
                }
            } else {
                deaths.extend(kill(session, victim, DeathCause::Wolves));
            }
        }
    }
    if let Some(poisoned) = night.poisoned {
        deaths.extend(kill(session, poisoned, DeathCause::Poison));
    }
    deaths
}

/// The village's verdict on `target`.
pub fn execute(session: &mut Session, target: ParticipantId) -> Execution {
    let (is_idiot, is_elder) = match session.participant(target) {
        Some(p) => (p.has_role(Role::Idiot) && !p.revealed, p.has_role(Role::Elder)),
        None => return Execution::Killed(Vec::new()),
    };
    if is_idiot {
        if let Some(p) = session.participant_mut(target) {
            p.revealed = true;
        }
        return Execution::Spared(target);
    }
    if is_elder {
        session.flags.powers_disabled = true;
    }
    Execution::Killed(kill(session, target, DeathCause::Execution))
}

/// A hunter among `deaths` who is still owed a shot.
pub fn hunter_owed(session: &Session, deaths: &[Death]) -> Option<ParticipantId> {
    if session.flags.powers_disabled || session.runtime.hunter_shot_used() {
        return None;
    }
    deaths
        .iter()
        .find(|d| session.participant(d.id).is_some_and(|p| p.has_role(Role::Hunter)))
        .map(|d| d.id)
}

pub fn check_winner(session: &Session) -> Option<Winner> {
    let living: Vec<_> = session.living().collect();
    if living.is_empty() {
        return Some(Winner::Nobody);
    }
    if let [a, b] = living.as_slice() {
        let bonded = session.lover_of(a.id) == Some(b.id);
        if bonded && a.faction() != b.faction() {
            return Some(Winner::Lovers);
        }
    }
    let wolves = living.iter().filter(|p| p.is_wolf()).count();
    if wolves == 0 {
        return Some(Winner::Village);
    }
    if wolves >= living.len() - wolves {
        return Some(Winner::Wolves);
    }
    None
}

/// Living and not a revealed idiot.
pub fn can_vote(session: &Session, id: ParticipantId) -> bool {
    session
        .participant(id)
        .is_some_and(|p| p.alive && !(p.has_role(Role::Idiot) && p.revealed))
}

pub fn eligible_voters(session: &Session) -> Vec<ParticipantId> {
    session
        .living()
        .map(|p| p.id)
        .filter(|id| can_vote(session, *id))
        .collect()
}

/// Day-vote counts; the leader's ballot weighs two.
pub fn tally_day_votes(session: &Session) -> BTreeMap<ParticipantId, usize> {
    let mut counts = BTreeMap::new();
    for (voter, target) in &session.runtime.day_votes {
        let weight = if session.leader == Some(*voter) { 2 } else { 1 };
        *counts.entry(*target).or_insert(0) += weight;
    }
    counts
}

pub fn tally_ballots(
    ballots: &BTreeMap<ParticipantId, ParticipantId>,
) -> BTreeMap<ParticipantId, usize> {
    let mut counts = BTreeMap::new();
    for target in ballots.values() {
        *counts.entry(*target).or_insert(0) += 1;
    }
    counts
}

pub fn seeded_pick(candidates: &[ParticipantId], seed: u64) -> Option<ParticipantId> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    candidates.choose(&mut rng).copied()
}

/// Suffix for a death announcement at the session's reveal level.
pub fn reveal_suffix(session: &Session, id: ParticipantId) -> String {
    let Some(role) = session.participant(id).and_then(|p| p.role) else {
        return String::new();
    };
    match session.flags.reveal {
        RevealLevel::Hidden => String::new(),
        RevealLevel::Faction => match role.faction() {
            Faction::Wolves => " (wolves)".to_string(),
            Faction::Village => " (village)".to_string(),
        },
        RevealLevel::Role => format!(" ({role})"),
    }
}
