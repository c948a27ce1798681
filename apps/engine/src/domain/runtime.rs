//! Per-round runtime fields and role-specific extensions.
//!
//! Serialized as one JSON blob next to the session record.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::collective_vote::CollectiveVoteState;
use crate::domain::roles::{Potion, Role};
use crate::domain::state::{ParticipantId, Phase};

/// Role abilities that carry state across nights. Only materialized for
/// roles dealt into the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "ability", rename_all = "snake_case")]
pub enum RoleExtension {
    Witch {
        heal_used: bool,
        poison_used: bool,
    },
    Protector {
        last_protected: Option<ParticipantId>,
    },
    Seer {
        inspected: Vec<ParticipantId>,
    },
    Hunter {
        shot_used: bool,
    },
}

/// A night action that has already been taken in the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordedAction {
    pub actor: ParticipantId,
    pub target: Option<ParticipantId>,
}

/// A dead hunter owed a shot, and where play resumes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingShot {
    pub hunter: ParticipantId,
    pub resume: Phase,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeState {
    #[serde(default)]
    pub wolf_vote: Option<CollectiveVoteState>,
    #[serde(default)]
    pub day_votes: BTreeMap<ParticipantId, ParticipantId>,
    #[serde(default)]
    pub leader_ballots: BTreeMap<ParticipantId, ParticipantId>,
    #[serde(default)]
    pub tiebreak_candidates: Vec<ParticipantId>,
    #[serde(default)]
    pub recorded: BTreeSet<RecordedAction>,
    #[serde(default)]
    pub pending_hunter: Option<PendingShot>,
    #[serde(default)]
    pub extensions: Vec<RoleExtension>,
}

impl RuntimeState {
    /// Fresh runtime with extensions for the abilities present in `roles`.
    pub fn for_roles(roles: &[Role]) -> Self {
        let mut extensions = Vec::new();
        if roles.contains(&Role::Witch) {
            extensions.push(RoleExtension::Witch {
                heal_used: false,
                poison_used: false,
            });
        }
        if roles.contains(&Role::Protector) {
            extensions.push(RoleExtension::Protector {
                last_protected: None,
            });
        }
        if roles.contains(&Role::Seer) {
            extensions.push(RoleExtension::Seer {
                inspected: Vec::new(),
            });
        }
        if roles.contains(&Role::Hunter) {
            extensions.push(RoleExtension::Hunter { shot_used: false });
        }
        Self {
            extensions,
            ..Self::default()
        }
    }

    /// Forget actions taken in the previous step.
    pub fn enter_step(&mut self) {
        self.recorded.clear();
    }

    /// Clear per-day ballots.
    pub fn reset_day(&mut self) {
        self.day_votes.clear();
        self.leader_ballots.clear();
        self.tiebreak_candidates.clear();
    }

    pub fn is_recorded(&self, actor: ParticipantId, target: Option<ParticipantId>) -> bool {
        self.recorded.contains(&RecordedAction { actor, target })
    }

    /// Returns false when the same actor and target were already recorded.
    pub fn record(&mut self, actor: ParticipantId, target: Option<ParticipantId>) -> bool {
        self.recorded.insert(RecordedAction { actor, target })
    }

    pub fn potion_used(&self, potion: Potion) -> bool {
        self.extensions.iter().any(|ext| match (ext, potion) {
            (RoleExtension::Witch { heal_used, .. }, Potion::Heal) => *heal_used,
            (RoleExtension::Witch { poison_used, .. }, Potion::Poison) => *poison_used,
            _ => false,
        })
    }

    pub fn potions_left(&self) -> bool {
        !self.potion_used(Potion::Heal) || !self.potion_used(Potion::Poison)
    }

    pub fn mark_potion(&mut self, potion: Potion) {
        for ext in &mut self.extensions {
            if let RoleExtension::Witch {
                heal_used,
                poison_used,
            } = ext
            {
                match potion {
                    Potion::Heal => *heal_used = true,
                    Potion::Poison => *poison_used = true,
                }
            }
        }
    }

    pub fn last_protected(&self) -> Option<ParticipantId> {
        self.extensions.iter().find_map(|ext| match ext {
            RoleExtension::Protector { last_protected } => *last_protected,
            _ => None,
        })
    }

    pub fn set_last_protected(&mut self, target: ParticipantId) {
        for ext in &mut self.extensions {
            if let RoleExtension::Protector { last_protected } = ext {
                *last_protected = Some(target);
            }
        }
    }

    pub fn inspected(&self) -> &[ParticipantId] {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                RoleExtension::Seer { inspected } => Some(inspected.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn record_inspection(&mut self, target: ParticipantId) {
        for ext in &mut self.extensions {
            if let RoleExtension::Seer { inspected } = ext {
                inspected.push(target);
            }
        }
    }

    pub fn hunter_shot_used(&self) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, RoleExtension::Hunter { shot_used: true }))
    }

    pub fn mark_hunter_shot(&mut self) {
        for ext in &mut self.extensions {
            if let RoleExtension::Hunter { shot_used } = ext {
                *shot_used = true;
            }
        }
    }
}
