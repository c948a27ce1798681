//! Process-wide table of live sessions.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::domain::state::{Session, SessionId};
use crate::error::EngineError;
use crate::errors::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StuckStatus {
    Ok,
    Stuck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionHealth {
    pub status: StuckStatus,
    pub since: OffsetDateTime,
}

/// A session plus the health flag the liveness monitor maintains.
pub struct SessionSlot {
    id: SessionId,
    session: RwLock<Session>,
    health: Mutex<SessionHealth>,
}

impl SessionSlot {
    fn new(session: Session) -> Self {
        let since = session.last_mutation_at;
        Self {
            id: session.id,
            session: RwLock::new(session),
            health: Mutex::new(SessionHealth {
                status: StuckStatus::Ok,
                since,
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Read-only view; never hold across an await.
    pub fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write()
    }

    pub fn snapshot(&self) -> Session {
        self.session.read().clone()
    }

    pub fn health(&self) -> SessionHealth {
        *self.health.lock()
    }

    /// A commit landed. Logs the STUCK -> OK edge.
    pub fn mark_progress(&self, now: OffsetDateTime) {
        let mut health = self.health.lock();
        if health.status == StuckStatus::Stuck {
            info!(
                session_id = %self.id,
                stuck_for_ms = (now - health.since).whole_milliseconds() as i64,
                "session recovered"
            );
            *health = SessionHealth {
                status: StuckStatus::Ok,
                since: now,
            };
        }
    }

    /// Returns true on the OK -> STUCK edge, which is logged once.
    pub fn mark_stuck(&self, now: OffsetDateTime, idle: time::Duration) -> bool {
        let mut health = self.health.lock();
        if health.status == StuckStatus::Stuck {
            return false;
        }
        *health = SessionHealth {
            status: StuckStatus::Stuck,
            since: now,
        };
        warn!(
            session_id = %self.id,
            idle_ms = idle.whole_milliseconds() as i64,
            "session appears stuck"
        );
        true
    }
}

/// A copy of a session together with its liveness status.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub session: Session,
    pub status: StuckStatus,
}

#[derive(Default)]
pub struct SessionRegistry {
    slots: DashMap<SessionId, Arc<SessionSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Session) -> Result<Arc<SessionSlot>, EngineError> {
        let id = session.id;
        match self.slots.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(EngineError::conflict(
                ErrorCode::SessionExists,
                format!("session {id} already exists"),
            )),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let slot = Arc::new(SessionSlot::new(session));
                vacant.insert(slot.clone());
                Ok(slot)
            }
        }
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<SessionSlot>> {
        self.slots.get(&id).map(|slot| slot.clone())
    }

    pub fn require(&self, id: SessionId) -> Result<Arc<SessionSlot>, EngineError> {
        self.get(id).ok_or_else(|| EngineError::session_not_found(id))
    }

    pub fn remove(&self, id: SessionId) -> Option<Arc<SessionSlot>> {
        self.slots.remove(&id).map(|(_, slot)| slot)
    }

    /// Whether `slot` is still the entry registered under its id.
    pub fn holds(&self, slot: &Arc<SessionSlot>) -> bool {
        self.slots
            .get(&slot.id())
            .is_some_and(|current| Arc::ptr_eq(current.value(), slot))
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.slots.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    pub fn slots(&self) -> Vec<Arc<SessionSlot>> {
        self.slots.iter().map(|e| e.value().clone()).collect()
    }

    pub fn view(&self, id: SessionId) -> Option<SessionView> {
        self.get(id).map(|slot| SessionView {
            session: slot.snapshot(),
            status: slot.health().status,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
