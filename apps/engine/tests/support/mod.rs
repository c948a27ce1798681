#![allow(dead_code)]

//! Fixtures shared by the engine integration tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use engine_test_support::unique_helpers::unique_id;
use nightfall::config::engine::EngineConfig;
use nightfall::domain::roles::Role;
use nightfall::domain::runtime::RuntimeState;
use nightfall::domain::state::{
    ChannelId, NightTargets, Participant, ParticipantId, RevealLevel, Session, SessionChannels,
    SessionId, SubPhase,
};
use nightfall::notify::chat::{Access, Announcement, ChatError, ChatGateway};
use nightfall::services::faults::FaultInjector;
use nightfall::store::memory::MemoryStore;
use nightfall::store::{SessionRecord, StoredSession};
use nightfall::{build_engine, Engine, NewSession};
use parking_lot::Mutex;
use time::OffsetDateTime;

pub const VILLAGE: ChannelId = ChannelId(1_000);
pub const WOLVES: ChannelId = ChannelId(2_000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Channel(ChannelId, Announcement),
    Direct(ParticipantId, Announcement),
    Access(ChannelId, ParticipantId, Access),
    Muted(ParticipantId, bool),
}

/// Chat gateway that remembers everything it was asked to do.
#[derive(Default)]
pub struct RecordingChat {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingChat {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn directs_to(&self, user: ParticipantId) -> Vec<Announcement> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Direct(to, message) if *to == user => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn channel(&self, channel: ChannelId) -> Vec<Announcement> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Channel(to, message) if *to == channel => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatGateway for RecordingChat {
    async fn send(&self, channel: ChannelId, message: Announcement) -> Result<(), ChatError> {
        self.sent.lock().push(Sent::Channel(channel, message));
        Ok(())
    }

    async fn direct(&self, user: ParticipantId, message: Announcement) -> Result<(), ChatError> {
        self.sent.lock().push(Sent::Direct(user, message));
        Ok(())
    }

    async fn set_access(
        &self,
        channel: ChannelId,
        user: ParticipantId,
        access: Access,
    ) -> Result<(), ChatError> {
        self.sent.lock().push(Sent::Access(channel, user, access));
        Ok(())
    }

    async fn set_muted(&self, user: ParticipantId, muted: bool) -> Result<(), ChatError> {
        self.sent.lock().push(Sent::Muted(user, muted));
        Ok(())
    }
}

pub struct Harness {
    pub engine: Engine,
    pub store: MemoryStore,
    pub chat: Arc<RecordingChat>,
    pub faults: FaultInjector,
}

pub async fn harness() -> Harness {
    harness_with(MemoryStore::new()).await
}

/// Engine over `store` with an armed-able fault injector and recording chat.
pub async fn harness_with(store: MemoryStore) -> Harness {
    let chat = Arc::new(RecordingChat::default());
    let faults = FaultInjector::enabled();
    let engine = build_engine()
        .with_config(EngineConfig::for_tests())
        .with_store(Arc::new(store.clone()))
        .with_chat(chat.clone())
        .with_faults(faults.clone())
        .build()
        .await
        .expect("engine builds");
    Harness {
        engine,
        store,
        chat,
        faults,
    }
}

/// A lobby hosted by participant 1 with `players` seated (ids `1..=players`).
pub async fn open_table(engine: &Engine, players: u64, seed: u64) -> SessionId {
    let id = SessionId(unique_id());
    engine
        .create_session(NewSession {
            id,
            channels: SessionChannels {
                village: VILLAGE,
                wolves: WOLVES,
            },
            host: ParticipantId(1),
            host_name: "p1".into(),
            seed: Some(seed),
        })
        .await
        .expect("create");
    for n in 2..=players {
        engine
            .join(id, ParticipantId(n), format!("p{n}"))
            .await
            .expect("join");
    }
    id
}

pub fn session(engine: &Engine, id: SessionId) -> Session {
    engine.view(id).expect("session exists").session
}

/// Holder of `role`, dead or alive.
pub fn holder(session: &Session, role: Role) -> ParticipantId {
    session
        .holder_of(role)
        .map(|p| p.id)
        .unwrap_or_else(|| panic!("nobody holds {role}"))
}

/// A living participant who is neither a wolf nor `except`.
pub fn living_villager_other_than(session: &Session, except: &[ParticipantId]) -> ParticipantId {
    session
        .living()
        .find(|p| !p.is_wolf() && !except.contains(&p.id))
        .map(|p| p.id)
        .expect("a living villager")
}

/// Let spawned effect deliveries run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Advance (paused) time in one-second steps.
pub async fn advance(secs: u64) {
    for _ in 0..secs {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

/// A started session as the store would hold it: `roles[i]` dealt to
/// participant `i + 1`, resting at `sub_phase`.
pub fn stored_scenario(roles: &[Role], sub_phase: SubPhase) -> StoredSession {
    let id = SessionId(unique_id());
    let now = OffsetDateTime::now_utc();
    let participants = roles
        .iter()
        .enumerate()
        .map(|(i, role)| {
            let mut p = Participant::new(ParticipantId(i as u64 + 1), format!("p{}", i + 1), i as u32);
            p.role = Some(*role);
            p.extra_life = *role == Role::Elder;
            p
        })
        .collect();
    let runtime = RuntimeState::for_roles(roles);
    StoredSession {
        record: SessionRecord {
            id,
            village_channel: VILLAGE,
            wolves_channel: WOLVES,
            host: ParticipantId(1),
            started: true,
            phase: sub_phase.phase().as_str().to_string(),
            sub_phase: sub_phase.as_str().to_string(),
            day_count: if sub_phase.phase().as_str() == "day" { 1 } else { 0 },
            leader: None,
            night: NightTargets::default(),
            bonds: "[]".to_string(),
            powers_disabled: false,
            reveal: RevealLevel::default().as_str().to_string(),
            winner: None,
            runtime: serde_json::to_string(&runtime).expect("runtime json"),
            rng_seed: 7,
            created_at: now,
            last_mutation_at: now,
        },
        participants,
        actions: Vec::new(),
    }
}

/// Seed `stored` into a fresh engine and recover it.
pub async fn recovered(stored: StoredSession) -> (Harness, SessionId) {
    let id = stored.record.id;
    let store = MemoryStore::new();
    store.put(stored);
    let harness = harness_with(store).await;
    let recovery = harness.engine.init().await.expect("init");
    assert_eq!(recovery.restored, vec![id]);
    (harness, id)
}
