//! Roles, factions and deterministic role assignment.

use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::domain::state::ParticipantId;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Villager,
    Werewolf,
    Seer,
    Witch,
    Protector,
    Hunter,
    Cupid,
    Elder,
    Idiot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Village,
    Wolves,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Potion {
    Heal,
    Poison,
}

/// Specials handed out in this order as the table grows.
const SPECIALS: [Role; 7] = [
    Role::Seer,
    Role::Witch,
    Role::Protector,
    Role::Hunter,
    Role::Cupid,
    Role::Elder,
    Role::Idiot,
];

impl Role {
    pub const ALL: [Role; 9] = [
        Role::Villager,
        Role::Werewolf,
        Role::Seer,
        Role::Witch,
        Role::Protector,
        Role::Hunter,
        Role::Cupid,
        Role::Elder,
        Role::Idiot,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Villager => "villager",
            Role::Werewolf => "werewolf",
            Role::Seer => "seer",
            Role::Witch => "witch",
            Role::Protector => "protector",
            Role::Hunter => "hunter",
            Role::Cupid => "cupid",
            Role::Elder => "elder",
            Role::Idiot => "idiot",
        }
    }

    pub const fn faction(self) -> Faction {
        match self {
            Role::Werewolf => Faction::Wolves,
            _ => Faction::Village,
        }
    }

    /// Village roles whose ability is lost once the elder is executed.
    pub const fn is_village_power(self) -> bool {
        matches!(
            self,
            Role::Seer | Role::Witch | Role::Protector | Role::Hunter | Role::Cupid
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| EngineError::invalid_transition(format!("unknown role '{s}'")))
    }
}

impl Faction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Faction::Village => "village",
            Faction::Wolves => "wolves",
        }
    }
}

impl Potion {
    pub const fn as_str(self) -> &'static str {
        match self {
            Potion::Heal => "heal",
            Potion::Poison => "poison",
        }
    }
}

/// Role multiset for a table of `players`.
///
/// One wolf per four players (at least one), then specials in a fixed
/// order while at least one plain villager remains.
pub fn composition(players: usize) -> Vec<Role> {
    if players == 0 {
        return Vec::new();
    }
    let wolves = (players / 4).max(1).min(players);
    let special_room = players.saturating_sub(wolves + 1);
    let specials = special_room.min(SPECIALS.len());

    let mut roles = Vec::with_capacity(players);
    roles.extend(std::iter::repeat(Role::Werewolf).take(wolves));
    roles.extend(SPECIALS.iter().copied().take(specials));
    roles.resize(players, Role::Villager);
    roles
}

/// Deterministically deal roles to `participants` (in join order).
pub fn assign(participants: &[ParticipantId], seed: u64) -> Vec<(ParticipantId, Role)> {
    let mut roles = composition(participants.len());
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    roles.shuffle(&mut rng);
    participants.iter().copied().zip(roles).collect()
}
