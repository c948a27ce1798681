//! Best-effort fan-out of lifecycle events to subscribers.

use dashmap::DashMap;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;
use uuid::Uuid;

use crate::domain::state::{ParticipantId, Phase, SessionId, SubPhase, Winner};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Created { host: ParticipantId },
    ParticipantJoined { participant: ParticipantId },
    ParticipantLeft { participant: ParticipantId },
    Started { players: usize },
    PhaseChanged { phase: Phase, sub_phase: SubPhase, day: u32 },
    ParticipantEliminated { participant: ParticipantId, cause: &'static str },
    Ended { winner: Winner },
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayEnvelope {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub event: LifecycleEvent,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

pub struct Subscription {
    pub token: Uuid,
    pub events: UnboundedReceiverStream<RelayEnvelope>,
}

#[derive(Default)]
pub struct EventRelay {
    sessions: DashMap<SessionId, DashMap<Uuid, UnboundedSender<RelayEnvelope>>>,
    global: DashMap<Uuid, UnboundedSender<RelayEnvelope>>,
}

impl EventRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, session_id: SessionId) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = Uuid::new_v4();
        self.sessions
            .entry(session_id)
            .or_default()
            .insert(token, tx);
        Subscription {
            token,
            events: UnboundedReceiverStream::new(rx),
        }
    }

    pub fn subscribe_all(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = Uuid::new_v4();
        self.global.insert(token, tx);
        Subscription {
            token,
            events: UnboundedReceiverStream::new(rx),
        }
    }

    pub fn unsubscribe(&self, session_id: Option<SessionId>, token: Uuid) {
        match session_id {
            Some(id) => {
                let emptied = self.sessions.get(&id).is_some_and(|entry| {
                    entry.remove(&token);
                    entry.is_empty()
                });
                if emptied {
                    self.sessions.remove_if(&id, |_, entry| entry.is_empty());
                }
            }
            None => {
                self.global.remove(&token);
            }
        }
    }

    /// Deliver to session and global subscribers; closed receivers are pruned.
    pub fn publish(&self, session_id: SessionId, event: LifecycleEvent) {
        let envelope = RelayEnvelope {
            session_id,
            event,
            at: OffsetDateTime::now_utc(),
        };
        if let Some(entry) = self.sessions.get(&session_id) {
            entry.retain(|_, tx| tx.send(envelope.clone()).is_ok());
        }
        self.global.retain(|_, tx| tx.send(envelope.clone()).is_ok());
        debug!(session_id = %session_id, event = ?envelope.event, "relay published");
    }

    pub fn subscriber_count(&self, session_id: SessionId) -> usize {
        self.sessions.get(&session_id).map(|e| e.len()).unwrap_or(0) + self.global.len()
    }
}
