//! In-process store. Used by tests and when no database is configured.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::state::{ActionLogEntry, Participant, SessionId};
use crate::store::{SessionRecord, SessionStore, SessionTxn, StoreError, StoredSession};

#[derive(Default)]
struct MemoryInner {
    sessions: Mutex<BTreeMap<SessionId, StoredSession>>,
    fail_next_commit: AtomicBool,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next commit fails with `CommitFailed` and applies nothing.
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn commits(&self) -> u64 {
        self.inner.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> u64 {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }

    pub fn get(&self, session_id: SessionId) -> Option<StoredSession> {
        self.inner.sessions.lock().get(&session_id).cloned()
    }

    /// Seed a stored session directly, bypassing transactions.
    pub fn put(&self, stored: StoredSession) {
        self.inner
            .sessions
            .lock()
            .insert(stored.record.id, stored);
    }
}

enum Op {
    Session(SessionRecord),
    Participants(SessionId, Vec<Participant>),
    Append(SessionId, Vec<ActionLogEntry>),
    Truncate(SessionId, u32),
}

struct MemoryTxn {
    inner: Arc<MemoryInner>,
    ops: Vec<Op>,
}

fn apply(map: &mut BTreeMap<SessionId, StoredSession>, op: Op) -> Result<(), StoreError> {
    match op {
        Op::Session(record) => {
            let id = record.id;
            match map.get_mut(&id) {
                Some(existing) => existing.record = record,
                None => {
                    map.insert(
                        id,
                        StoredSession {
                            record,
                            participants: Vec::new(),
                            actions: Vec::new(),
                        },
                    );
                }
            }
        }
        Op::Participants(id, participants) => {
            let stored = map
                .get_mut(&id)
                .ok_or_else(|| StoreError::Corrupt(format!("no session row for {id}")))?;
            stored.participants = participants;
        }
        Op::Append(id, entries) => {
            let stored = map
                .get_mut(&id)
                .ok_or_else(|| StoreError::Corrupt(format!("no session row for {id}")))?;
            for entry in entries {
                if stored.actions.iter().any(|a| a.seq == entry.seq) {
                    return Err(StoreError::Corrupt(format!(
                        "duplicate action seq {} for {id}",
                        entry.seq
                    )));
                }
                stored.actions.push(entry);
            }
        }
        Op::Truncate(id, from_seq) => {
            if let Some(stored) = map.get_mut(&id) {
                stored.actions.retain(|a| a.seq < from_seq);
            }
        }
    }
    Ok(())
}

#[async_trait]
impl SessionTxn for MemoryTxn {
    async fn upsert_session(&mut self, record: &SessionRecord) -> Result<(), StoreError> {
        self.ops.push(Op::Session(record.clone()));
        Ok(())
    }

    async fn upsert_participants(
        &mut self,
        session_id: SessionId,
        participants: &[Participant],
    ) -> Result<(), StoreError> {
        self.ops
            .push(Op::Participants(session_id, participants.to_vec()));
        Ok(())
    }

    async fn append_actions(
        &mut self,
        session_id: SessionId,
        entries: &[ActionLogEntry],
    ) -> Result<(), StoreError> {
        self.ops.push(Op::Append(session_id, entries.to_vec()));
        Ok(())
    }

    async fn truncate_actions(
        &mut self,
        session_id: SessionId,
        from_seq: u32,
    ) -> Result<(), StoreError> {
        self.ops.push(Op::Truncate(session_id, from_seq));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTxn { inner, ops } = *self;
        if inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::CommitFailed("injected commit failure".into()));
        }
        let mut sessions = inner.sessions.lock();
        let mut staged = sessions.clone();
        for op in ops {
            apply(&mut staged, op)?;
        }
        *sessions = staged;
        inner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn SessionTxn>, StoreError> {
        Ok(Box::new(MemoryTxn {
            inner: self.inner.clone(),
            ops: Vec::new(),
        }))
    }

    async fn load_all(&self) -> Result<Vec<StoredSession>, StoreError> {
        Ok(self.inner.sessions.lock().values().cloned().collect())
    }

    async fn delete_session(&self, session_id: SessionId) -> Result<(), StoreError> {
        self.inner.sessions.lock().remove(&session_id);
        Ok(())
    }
}
