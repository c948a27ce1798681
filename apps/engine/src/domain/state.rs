//! Session aggregate and the plain data it is made of.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::roles::{Faction, Role};
use crate::domain::runtime::RuntimeState;
use crate::error::EngineError;
use crate::services::coordinator::SectionToken;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

snowflake_id!(
    /// Lobby channel id; doubles as the session key.
    SessionId
);
snowflake_id!(ParticipantId);
snowflake_id!(ChannelId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Night,
    Day,
    Ended,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Night, Phase::Day, Phase::Ended];

    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Night => "night",
            Phase::Day => "day",
            Phase::Ended => "ended",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| EngineError::invalid_transition(format!("unknown phase '{s}'")))
    }
}

/// Fine-grained steps, night first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubPhase {
    Cupid,
    Seer,
    Protector,
    Wolves,
    Witch,
    Dawn,
    Hunter,
    LeaderElection,
    Deliberation,
    Vote,
    Tiebreak,
}

impl SubPhase {
    pub const ALL: [SubPhase; 11] = [
        SubPhase::Cupid,
        SubPhase::Seer,
        SubPhase::Protector,
        SubPhase::Wolves,
        SubPhase::Witch,
        SubPhase::Dawn,
        SubPhase::Hunter,
        SubPhase::LeaderElection,
        SubPhase::Deliberation,
        SubPhase::Vote,
        SubPhase::Tiebreak,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            SubPhase::Cupid => "cupid",
            SubPhase::Seer => "seer",
            SubPhase::Protector => "protector",
            SubPhase::Wolves => "wolves",
            SubPhase::Witch => "witch",
            SubPhase::Dawn => "dawn",
            SubPhase::Hunter => "hunter",
            SubPhase::LeaderElection => "leader_election",
            SubPhase::Deliberation => "deliberation",
            SubPhase::Vote => "vote",
            SubPhase::Tiebreak => "tiebreak",
        }
    }

    pub const fn phase(self) -> Phase {
        match self {
            SubPhase::Cupid
            | SubPhase::Seer
            | SubPhase::Protector
            | SubPhase::Wolves
            | SubPhase::Witch => Phase::Night,
            _ => Phase::Day,
        }
    }
}

impl fmt::Display for SubPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubPhase {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubPhase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| EngineError::invalid_transition(format!("unknown sub-phase '{s}'")))
    }
}

/// How much a death announcement exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealLevel {
    Hidden,
    Faction,
    #[default]
    Role,
}

impl RevealLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            RevealLevel::Hidden => "hidden",
            RevealLevel::Faction => "faction",
            RevealLevel::Role => "role",
        }
    }
}

impl FromStr for RevealLevel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hidden" => Ok(RevealLevel::Hidden),
            "faction" => Ok(RevealLevel::Faction),
            "role" => Ok(RevealLevel::Role),
            other => Err(EngineError::invalid_transition(format!(
                "unknown reveal level '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Village,
    Wolves,
    Lovers,
    Nobody,
    Abandoned,
}

impl Winner {
    pub const ALL: [Winner; 5] = [
        Winner::Village,
        Winner::Wolves,
        Winner::Lovers,
        Winner::Nobody,
        Winner::Abandoned,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Winner::Village => "village",
            Winner::Wolves => "wolves",
            Winner::Lovers => "lovers",
            Winner::Nobody => "nobody",
            Winner::Abandoned => "abandoned",
        }
    }
}

impl FromStr for Winner {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Winner::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| EngineError::invalid_transition(format!("unknown winner '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    /// `None` until the session starts.
    pub role: Option<Role>,
    pub alive: bool,
    /// Elder's spare life against the first wolf attack.
    pub extra_life: bool,
    /// Idiot survived an execution and lost the vote.
    pub revealed: bool,
    pub joined_order: u32,
}

impl Participant {
    pub fn new(id: ParticipantId, display_name: impl Into<String>, joined_order: u32) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            role: None,
            alive: true,
            extra_life: false,
            revealed: false,
            joined_order,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    pub fn faction(&self) -> Option<Faction> {
        self.role.map(Role::faction)
    }

    pub fn is_wolf(&self) -> bool {
        self.faction() == Some(Faction::Wolves)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NightTargets {
    pub victim: Option<ParticipantId>,
    pub protected: Option<ParticipantId>,
    pub healed: Option<ParticipantId>,
    pub poisoned: Option<ParticipantId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionFlags {
    pub powers_disabled: bool,
    pub reveal: RevealLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionChannels {
    pub village: ChannelId,
    pub wolves: ChannelId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub seq: u32,
    pub day: u32,
    pub sub_phase: SubPhase,
    pub actor: Option<ParticipantId>,
    pub kind: String,
    pub detail: String,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub channels: SessionChannels,
    pub host: ParticipantId,
    pub started: bool,
    phase: Phase,
    sub_phase: SubPhase,
    pub day_count: u32,
    pub participants: Vec<Participant>,
    pub leader: Option<ParticipantId>,
    pub night: NightTargets,
    pub bonds: Vec<(ParticipantId, ParticipantId)>,
    pub flags: SessionFlags,
    pub runtime: RuntimeState,
    pub winner: Option<Winner>,
    pub action_log: Vec<ActionLogEntry>,
    pub rng_seed: u64,
    pub created_at: OffsetDateTime,
    pub last_mutation_at: OffsetDateTime,
}

impl Session {
    /// A fresh lobby with the host as its only participant.
    pub fn new(
        id: SessionId,
        channels: SessionChannels,
        host: ParticipantId,
        host_name: impl Into<String>,
        rng_seed: u64,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            channels,
            host,
            started: false,
            phase: Phase::Night,
            sub_phase: SubPhase::Cupid,
            day_count: 0,
            participants: vec![Participant::new(host, host_name, 0)],
            leader: None,
            night: NightTargets::default(),
            bonds: Vec::new(),
            flags: SessionFlags::default(),
            runtime: RuntimeState::default(),
            winner: None,
            action_log: Vec::new(),
            rng_seed,
            created_at: now,
            last_mutation_at: now,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn sub_phase(&self) -> SubPhase {
        self.sub_phase
    }

    pub fn is_ended(&self) -> bool {
        self.phase == Phase::Ended
    }

    /// Started and not yet over.
    pub fn is_running(&self) -> bool {
        self.started && !self.is_ended()
    }

    /// Only callable with a token minted by an active atomic section.
    pub fn assign_phase(&mut self, phase: Phase, _section: &SectionToken) {
        self.phase = phase;
    }

    /// Only callable with a token minted by an active atomic section.
    pub fn assign_sub_phase(&mut self, sub_phase: SubPhase, _section: &SectionToken) {
        self.sub_phase = sub_phase;
    }

    /// Rebuilding from durable storage; never used on a live session.
    pub(crate) fn restore_position(&mut self, phase: Phase, sub_phase: SubPhase) {
        self.phase = phase;
        self.sub_phase = sub_phase;
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn participant_mut(&mut self, id: ParticipantId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == id)
    }

    pub fn is_alive(&self, id: ParticipantId) -> bool {
        self.participant(id).is_some_and(|p| p.alive)
    }

    pub fn living(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.alive)
    }

    pub fn living_ids(&self) -> Vec<ParticipantId> {
        self.living().map(|p| p.id).collect()
    }

    pub fn living_wolves(&self) -> Vec<ParticipantId> {
        self.living().filter(|p| p.is_wolf()).map(|p| p.id).collect()
    }

    /// The living holder of `role`, if any.
    pub fn living_with_role(&self, role: Role) -> Option<&Participant> {
        self.living().find(|p| p.has_role(role))
    }

    pub fn holder_of(&self, role: Role) -> Option<&Participant> {
        self.participants.iter().find(|p| p.has_role(role))
    }

    /// True when `role` is alive and its power has not been switched off.
    pub fn power_available(&self, role: Role) -> bool {
        if self.flags.powers_disabled && role.is_village_power() {
            return false;
        }
        self.living_with_role(role).is_some()
    }

    pub fn lover_of(&self, id: ParticipantId) -> Option<ParticipantId> {
        self.bonds.iter().find_map(|(a, b)| {
            if *a == id {
                Some(*b)
            } else if *b == id {
                Some(*a)
            } else {
                None
            }
        })
    }

    pub fn display_name(&self, id: ParticipantId) -> String {
        self.participant(id)
            .map(|p| p.display_name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn next_log_seq(&self) -> u32 {
        self.action_log.last().map(|e| e.seq + 1).unwrap_or(0)
    }

    /// Structural invariants re-checked before every persist.
    pub fn check_invariants(&self) -> Result<(), EngineError> {
        if let Some(leader) = self.leader {
            if !self.is_alive(leader) {
                return Err(EngineError::invalid_transition(format!(
                    "leader {leader} is not a living participant"
                )));
            }
        }
        if self.started && !self.is_ended() && self.sub_phase.phase() != self.phase {
            return Err(EngineError::invalid_transition(format!(
                "sub-phase {} does not belong to phase {}",
                self.sub_phase, self.phase
            )));
        }
        for (i, p) in self.participants.iter().enumerate() {
            if self.participants[..i].iter().any(|q| q.id == p.id) {
                return Err(EngineError::invalid_transition(format!(
                    "participant {} listed twice",
                    p.id
                )));
            }
        }
        for (a, b) in &self.bonds {
            if a == b || self.participant(*a).is_none() || self.participant(*b).is_none() {
                return Err(EngineError::invalid_transition(format!(
                    "bond ({a}, {b}) does not reference two participants"
                )));
            }
        }
        if self.is_ended() && self.winner.is_none() {
            return Err(EngineError::invalid_transition(
                "ended session has no recorded outcome",
            ));
        }
        Ok(())
    }
}
