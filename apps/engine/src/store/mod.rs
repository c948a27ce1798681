//! Durable store contract used by the coordinator's commit step.
//!
//! A store hands out explicit transactions; everything staged on one is
//! applied atomically by `commit` or discarded by `rollback`.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::runtime::RuntimeState;
use crate::domain::state::{
    ActionLogEntry, ChannelId, NightTargets, Participant, ParticipantId, Phase, RevealLevel,
    Session, SessionChannels, SessionFlags, SessionId, SubPhase, Winner,
};
use crate::error::EngineError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("commit failed: {0}")]
    CommitFailed(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

/// Flat session row. Enum columns are strings and the runtime state is an
/// opaque JSON blob, so restore validates both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub village_channel: ChannelId,
    pub wolves_channel: ChannelId,
    pub host: ParticipantId,
    pub started: bool,
    pub phase: String,
    pub sub_phase: String,
    pub day_count: u32,
    pub leader: Option<ParticipantId>,
    pub night: NightTargets,
    pub bonds: String,
    pub powers_disabled: bool,
    pub reveal: String,
    pub winner: Option<String>,
    pub runtime: String,
    pub rng_seed: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_mutation_at: OffsetDateTime,
}

impl SessionRecord {
    pub fn capture(session: &Session) -> Result<Self, EngineError> {
        Ok(Self {
            id: session.id,
            village_channel: session.channels.village,
            wolves_channel: session.channels.wolves,
            host: session.host,
            started: session.started,
            phase: session.phase().as_str().to_string(),
            sub_phase: session.sub_phase().as_str().to_string(),
            day_count: session.day_count,
            leader: session.leader,
            night: session.night,
            bonds: serde_json::to_string(&session.bonds)?,
            powers_disabled: session.flags.powers_disabled,
            reveal: session.flags.reveal.as_str().to_string(),
            winner: session.winner.map(|w| w.as_str().to_string()),
            runtime: serde_json::to_string(&session.runtime)?,
            rng_seed: session.rng_seed,
            created_at: session.created_at,
            last_mutation_at: session.last_mutation_at,
        })
    }
}

/// Everything the store holds for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub record: SessionRecord,
    pub participants: Vec<Participant>,
    pub actions: Vec<ActionLogEntry>,
}

impl StoredSession {
    pub fn capture(session: &Session) -> Result<Self, EngineError> {
        Ok(Self {
            record: SessionRecord::capture(session)?,
            participants: session.participants.clone(),
            actions: session.action_log.clone(),
        })
    }

    /// Rebuild a live session. Unknown enum strings are invalid transitions.
    pub fn restore(self) -> Result<Session, EngineError> {
        let StoredSession {
            record,
            mut participants,
            mut actions,
        } = self;
        let phase: Phase = record.phase.parse()?;
        let sub_phase: SubPhase = record.sub_phase.parse()?;
        let reveal: RevealLevel = record.reveal.parse()?;
        let winner = record
            .winner
            .as_deref()
            .map(str::parse::<Winner>)
            .transpose()?;
        let bonds: Vec<(ParticipantId, ParticipantId)> = serde_json::from_str(&record.bonds)
            .map_err(|e| EngineError::invalid_transition(format!("bonds blob: {e}")))?;
        let runtime: RuntimeState = serde_json::from_str(&record.runtime)
            .map_err(|e| EngineError::invalid_transition(format!("runtime blob: {e}")))?;

        participants.sort_by_key(|p| p.joined_order);
        actions.sort_by_key(|a| a.seq);

        let channels = SessionChannels {
            village: record.village_channel,
            wolves: record.wolves_channel,
        };
        let mut session = Session::new(
            record.id,
            channels,
            record.host,
            String::new(),
            record.rng_seed,
            record.created_at,
        );
        session.restore_position(phase, sub_phase);
        session.started = record.started;
        session.day_count = record.day_count;
        session.participants = participants;
        session.leader = record.leader;
        session.night = record.night;
        session.bonds = bonds;
        session.flags = SessionFlags {
            powers_disabled: record.powers_disabled,
            reveal,
        };
        session.runtime = runtime;
        session.winner = winner;
        session.action_log = actions;
        session.last_mutation_at = record.last_mutation_at;
        session.check_invariants()?;
        Ok(session)
    }
}

#[async_trait]
pub trait SessionTxn: Send {
    async fn upsert_session(&mut self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Replace the roster: upsert these, drop anyone no longer listed.
    async fn upsert_participants(
        &mut self,
        session_id: SessionId,
        participants: &[Participant],
    ) -> Result<(), StoreError>;

    async fn append_actions(
        &mut self,
        session_id: SessionId,
        entries: &[ActionLogEntry],
    ) -> Result<(), StoreError>;

    /// Remove log entries with `seq >= from_seq`. Only used to compensate a
    /// commit that must be undone.
    async fn truncate_actions(
        &mut self,
        session_id: SessionId,
        from_seq: u32,
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn SessionTxn>, StoreError>;

    async fn load_all(&self) -> Result<Vec<StoredSession>, StoreError>;

    async fn delete_session(&self, session_id: SessionId) -> Result<(), StoreError>;
}
