//! Row <-> domain conversions for the sessions_sea adapter.
//!
//! Snowflake ids and the rng seed are stored bit-for-bit in signed 64-bit
//! columns.

use sea_orm::{NotSet, Set};

use crate::domain::state::{
    ActionLogEntry, ChannelId, NightTargets, Participant, ParticipantId, SessionId,
};
use crate::entities::{action_log, participants, sessions};
use crate::store::{SessionRecord, StoreError};

fn to_db(raw: u64) -> i64 {
    raw as i64
}

fn from_db(raw: i64) -> u64 {
    raw as u64
}

fn pid(raw: i64) -> ParticipantId {
    ParticipantId(from_db(raw))
}

pub fn session_model(record: &SessionRecord) -> sessions::ActiveModel {
    sessions::ActiveModel {
        id: Set(to_db(record.id.0)),
        village_channel: Set(to_db(record.village_channel.0)),
        wolves_channel: Set(to_db(record.wolves_channel.0)),
        host_id: Set(to_db(record.host.0)),
        started: Set(record.started),
        phase: Set(record.phase.clone()),
        sub_phase: Set(record.sub_phase.clone()),
        day_count: Set(record.day_count as i32),
        leader_id: Set(record.leader.map(|p| to_db(p.0))),
        victim_id: Set(record.night.victim.map(|p| to_db(p.0))),
        protected_id: Set(record.night.protected.map(|p| to_db(p.0))),
        healed_id: Set(record.night.healed.map(|p| to_db(p.0))),
        poisoned_id: Set(record.night.poisoned.map(|p| to_db(p.0))),
        bonds: Set(record.bonds.clone()),
        powers_disabled: Set(record.powers_disabled),
        reveal_level: Set(record.reveal.clone()),
        winner: Set(record.winner.clone()),
        runtime: Set(record.runtime.clone()),
        rng_seed: Set(to_db(record.rng_seed)),
        created_at: Set(record.created_at),
        last_mutation_at: Set(record.last_mutation_at),
    }
}

pub fn session_record(row: sessions::Model) -> Result<SessionRecord, StoreError> {
    let day_count = u32::try_from(row.day_count)
        .map_err(|_| StoreError::Corrupt(format!("session {}: day_count {}", row.id, row.day_count)))?;
    Ok(SessionRecord {
        id: SessionId(from_db(row.id)),
        village_channel: ChannelId(from_db(row.village_channel)),
        wolves_channel: ChannelId(from_db(row.wolves_channel)),
        host: pid(row.host_id),
        started: row.started,
        phase: row.phase,
        sub_phase: row.sub_phase,
        day_count,
        leader: row.leader_id.map(pid),
        night: NightTargets {
            victim: row.victim_id.map(pid),
            protected: row.protected_id.map(pid),
            healed: row.healed_id.map(pid),
            poisoned: row.poisoned_id.map(pid),
        },
        bonds: row.bonds,
        powers_disabled: row.powers_disabled,
        reveal: row.reveal_level,
        winner: row.winner,
        runtime: row.runtime,
        rng_seed: from_db(row.rng_seed),
        created_at: row.created_at,
        last_mutation_at: row.last_mutation_at,
    })
}

pub fn participant_model(session_id: SessionId, p: &Participant) -> participants::ActiveModel {
    participants::ActiveModel {
        session_id: Set(to_db(session_id.0)),
        user_id: Set(to_db(p.id.0)),
        display_name: Set(p.display_name.clone()),
        role: Set(p.role.map(|r| r.as_str().to_string())),
        alive: Set(p.alive),
        extra_life: Set(p.extra_life),
        revealed: Set(p.revealed),
        joined_order: Set(p.joined_order as i32),
    }
}

pub fn participant(row: participants::Model) -> Result<Participant, StoreError> {
    let role = row
        .role
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|e| StoreError::Corrupt(format!("participant {}: {e}", row.user_id)))?;
    let joined_order = u32::try_from(row.joined_order)
        .map_err(|_| StoreError::Corrupt(format!("participant {}: joined_order", row.user_id)))?;
    Ok(Participant {
        id: pid(row.user_id),
        display_name: row.display_name,
        role,
        alive: row.alive,
        extra_life: row.extra_life,
        revealed: row.revealed,
        joined_order,
    })
}

pub fn action_model(session_id: SessionId, entry: &ActionLogEntry) -> action_log::ActiveModel {
    action_log::ActiveModel {
        id: NotSet,
        session_id: Set(to_db(session_id.0)),
        seq: Set(entry.seq as i32),
        day: Set(entry.day as i32),
        sub_phase: Set(entry.sub_phase.as_str().to_string()),
        actor_id: Set(entry.actor.map(|a| to_db(a.0))),
        kind: Set(entry.kind.clone()),
        detail: Set(entry.detail.clone()),
        recorded_at: Set(entry.at),
    }
}

pub fn action(row: action_log::Model) -> Result<ActionLogEntry, StoreError> {
    let id = row.id;
    let corrupt = |what: &str| StoreError::Corrupt(format!("action {id} {what}"));
    Ok(ActionLogEntry {
        seq: u32::try_from(row.seq).map_err(|_| corrupt("seq"))?,
        day: u32::try_from(row.day).map_err(|_| corrupt("day"))?,
        sub_phase: row.sub_phase.parse().map_err(|_| corrupt("sub_phase"))?,
        actor: row.actor_id.map(pid),
        kind: row.kind,
        detail: row.detail,
        at: row.recorded_at,
    })
}
