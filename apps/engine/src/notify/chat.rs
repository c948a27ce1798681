//! Chat platform seam. Payloads are structured; wording and localization
//! belong to the front end.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::domain::roles::Role;
use crate::domain::state::{ChannelId, ParticipantId, SubPhase, Winner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Write,
    ReadOnly,
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeathNotice {
    pub participant: ParticipantId,
    pub name: String,
    pub cause: &'static str,
    /// Empty when the session hides roles.
    pub reveal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Announcement {
    LobbyOpened { host: ParticipantId },
    Joined { participant: ParticipantId, name: String },
    Left { participant: ParticipantId },
    RoleDealt { role: Role },
    NightFalls { day: u32 },
    /// Prompt to whoever acts in `step`.
    YourTurn { step: SubPhase },
    WolfRound { round: u8 },
    WolvesChose { target: Option<ParticipantId> },
    Bonded { partner: ParticipantId },
    Inspection { target: ParticipantId, role: Role },
    VictimIs { victim: Option<ParticipantId> },
    Deaths { deaths: Vec<DeathNotice> },
    QuietNight,
    IdiotRevealed { participant: ParticipantId },
    HunterMustShoot { hunter: ParticipantId },
    LeaderElectionOpened,
    LeaderElected { leader: ParticipantId },
    DeliberationOpened { day: u32 },
    VoteOpened,
    VoteTied { candidates: Vec<ParticipantId> },
    NoExecution,
    GameOver { winner: Winner },
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat platform unavailable: {0}")]
    Unavailable(String),
    #[error("chat platform rejected request: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send(&self, channel: ChannelId, message: Announcement) -> Result<(), ChatError>;
    async fn direct(&self, user: ParticipantId, message: Announcement) -> Result<(), ChatError>;
    async fn set_access(
        &self,
        channel: ChannelId,
        user: ParticipantId,
        access: Access,
    ) -> Result<(), ChatError>;
    async fn set_muted(&self, user: ParticipantId, muted: bool) -> Result<(), ChatError>;
}

/// Writes every intent to the log. Default when no front end is wired.
#[derive(Debug, Default, Clone)]
pub struct LoggingChatGateway;

#[async_trait]
impl ChatGateway for LoggingChatGateway {
    async fn send(&self, channel: ChannelId, message: Announcement) -> Result<(), ChatError> {
        info!(channel = %channel, message = ?message, "chat send");
        Ok(())
    }

    async fn direct(&self, user: ParticipantId, message: Announcement) -> Result<(), ChatError> {
        info!(user = %user, message = ?message, "chat direct");
        Ok(())
    }

    async fn set_access(
        &self,
        channel: ChannelId,
        user: ParticipantId,
        access: Access,
    ) -> Result<(), ChatError> {
        info!(channel = %channel, user = %user, ?access, "chat access");
        Ok(())
    }

    async fn set_muted(&self, user: ParticipantId, muted: bool) -> Result<(), ChatError> {
        info!(user = %user, muted, "voice mute");
        Ok(())
    }
}
