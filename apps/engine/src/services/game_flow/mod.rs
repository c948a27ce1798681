//! Game flow orchestration - bridges pure rules with the atomic coordinator.
//!
//! Player actions and fired timers both land here. Each is checked by the
//! read-only guards, then applied inside one atomic section. The per-step
//! helpers in `night` and `day` run inside that section and never await.

mod day;
pub mod guards;
mod lobby;
mod night;
mod timeouts;

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::config::engine::EngineConfig;
use crate::domain::roles::Potion;
use crate::domain::state::{ChannelId, ParticipantId, SessionId};
use crate::error::EngineError;
use crate::services::coordinator::Coordinator;
use crate::services::dispatch::EffectDispatcher;
use crate::services::timers::TimerScheduler;

pub use lobby::NewSession;
pub use timeouts::timer_for;

/// Where an inbound action was posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Channel(ChannelId),
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlayerAction {
    Bond {
        first: ParticipantId,
        second: ParticipantId,
    },
    Inspect {
        target: ParticipantId,
    },
    Protect {
        target: ParticipantId,
    },
    WolfVote {
        target: ParticipantId,
    },
    UsePotion {
        potion: Potion,
        target: ParticipantId,
    },
    HunterShot {
        target: ParticipantId,
    },
    LeaderBallot {
        candidate: ParticipantId,
    },
    OpenVote,
    DayVote {
        target: ParticipantId,
    },
    Tiebreak {
        target: ParticipantId,
    },
    Skip,
}

impl PlayerAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PlayerAction::Bond { .. } => "bond",
            PlayerAction::Inspect { .. } => "inspect",
            PlayerAction::Protect { .. } => "protect",
            PlayerAction::WolfVote { .. } => "wolf_vote",
            PlayerAction::UsePotion { .. } => "use_potion",
            PlayerAction::HunterShot { .. } => "hunter_shot",
            PlayerAction::LeaderBallot { .. } => "leader_ballot",
            PlayerAction::OpenVote => "open_vote",
            PlayerAction::DayVote { .. } => "day_vote",
            PlayerAction::Tiebreak { .. } => "tiebreak",
            PlayerAction::Skip => "skip",
        }
    }

    /// The participant the action is aimed at, if any.
    pub const fn target(&self) -> Option<ParticipantId> {
        match *self {
            PlayerAction::Bond { first, .. } => Some(first),
            PlayerAction::Inspect { target }
            | PlayerAction::Protect { target }
            | PlayerAction::WolfVote { target }
            | PlayerAction::UsePotion { target, .. }
            | PlayerAction::HunterShot { target }
            | PlayerAction::DayVote { target }
            | PlayerAction::Tiebreak { target } => Some(target),
            PlayerAction::LeaderBallot { candidate } => Some(candidate),
            PlayerAction::OpenVote | PlayerAction::Skip => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ActionRequest {
    pub session_id: SessionId,
    pub origin: Origin,
    pub actor: ParticipantId,
    pub action: PlayerAction,
}

/// Game flow service. Owns nothing but handles to shared infrastructure.
pub struct GameFlow {
    coordinator: Coordinator,
    dispatcher: Arc<dyn EffectDispatcher>,
    timers: TimerScheduler,
    config: Arc<EngineConfig>,
}

impl GameFlow {
    pub fn new(
        coordinator: Coordinator,
        dispatcher: Arc<dyn EffectDispatcher>,
        timers: TimerScheduler,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            coordinator,
            dispatcher,
            timers,
            config,
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<dyn EffectDispatcher> {
        &self.dispatcher
    }

    pub fn timers(&self) -> &TimerScheduler {
        &self.timers
    }

    /// Validate and apply one player action.
    ///
    /// Guards run once against a read-only view before queueing for the
    /// lock, and again inside the section where they are authoritative.
    pub async fn handle_action(&self, request: ActionRequest) -> Result<(), EngineError> {
        debug!(
            session_id = %request.session_id,
            actor = %request.actor,
            action = request.action.as_str(),
            "handling action"
        );

        let slot = self.coordinator.registry().require(request.session_id)?;
        {
            let session = slot.read();
            guards::admit(&session, &request)?;
        }

        let config = self.config.as_ref();
        self.coordinator
            .run_atomic(request.session_id, |ctx| {
                guards::admit(ctx.session(), &request)?;
                let actor = request.actor;
                match request.action {
                    PlayerAction::Bond { first, second } => {
                        night::bond(ctx, config, actor, first, second)
                    }
                    PlayerAction::Inspect { target } => night::inspect(ctx, config, actor, target),
                    PlayerAction::Protect { target } => night::protect(ctx, config, actor, target),
                    PlayerAction::WolfVote { target } => {
                        night::wolf_vote(ctx, config, actor, target)
                    }
                    PlayerAction::UsePotion { potion, target } => {
                        night::use_potion(ctx, config, actor, potion, target)
                    }
                    PlayerAction::HunterShot { target } => {
                        day::hunter_shot(ctx, config, actor, target)
                    }
                    PlayerAction::LeaderBallot { candidate } => {
                        day::leader_ballot(ctx, config, actor, candidate)
                    }
                    PlayerAction::OpenVote => day::open_vote(ctx, config, Some(actor)),
                    PlayerAction::DayVote { target } => day::day_vote(ctx, config, actor, target),
                    PlayerAction::Tiebreak { target } => day::tiebreak(ctx, config, actor, target),
                    PlayerAction::Skip => night::skip(ctx, config, actor),
                }
            })
            .await
    }
}
