//! Post-commit effects and the dispatcher that drains them.
//!
//! Mutations never talk to the outside world directly; they queue
//! `Effect`s on the mutation context, and the coordinator hands the batch
//! to an `EffectDispatcher` once the commit has landed.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::state::{ChannelId, ParticipantId, SessionId};
use crate::notify::chat::{Access, Announcement, ChatGateway};
use crate::notify::relay::{EventRelay, LifecycleEvent};
use crate::services::timers::{TimerHandler, TimerKind, TimerScheduler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Announce {
        channel: ChannelId,
        message: Announcement,
    },
    Direct {
        user: ParticipantId,
        message: Announcement,
    },
    SetAccess {
        channel: ChannelId,
        user: ParticipantId,
        access: Access,
    },
    SetMuted {
        user: ParticipantId,
        muted: bool,
    },
    ScheduleTimer {
        kind: TimerKind,
        delay: Duration,
    },
    ClearTimer,
    Lifecycle(LifecycleEvent),
}

impl Effect {
    pub fn is_timer(&self) -> bool {
        matches!(self, Effect::ScheduleTimer { .. } | Effect::ClearTimer)
    }
}

pub trait EffectDispatcher: Send + Sync {
    /// Called with the session lock still held; must not block.
    fn dispatch(&self, session_id: SessionId, effects: Vec<Effect>);
}

pub struct Dispatcher {
    chat: Arc<dyn ChatGateway>,
    relay: Arc<EventRelay>,
    timers: TimerScheduler,
    handler: Weak<dyn TimerHandler>,
}

impl Dispatcher {
    pub fn new(
        chat: Arc<dyn ChatGateway>,
        relay: Arc<EventRelay>,
        timers: TimerScheduler,
        handler: Weak<dyn TimerHandler>,
    ) -> Self {
        Self {
            chat,
            relay,
            timers,
            handler,
        }
    }

    fn arm(&self, session_id: SessionId, kind: TimerKind, delay: Duration) {
        let handler = self.handler.clone();
        self.timers.schedule(session_id, kind, delay, move |fired| async move {
            if let Some(handler) = handler.upgrade() {
                handler.on_timer(fired).await;
            }
        });
    }
}

impl EffectDispatcher for Dispatcher {
    fn dispatch(&self, session_id: SessionId, effects: Vec<Effect>) {
        let mut outbound = Vec::new();
        for effect in effects {
            match effect {
                Effect::ScheduleTimer { kind, delay } => self.arm(session_id, kind, delay),
                Effect::ClearTimer => self.timers.clear(session_id),
                Effect::Lifecycle(event) => self.relay.publish(session_id, event),
                chat => outbound.push(chat),
            }
        }
        if outbound.is_empty() {
            return;
        }

        let chat = self.chat.clone();
        tokio::spawn(async move {
            let total = outbound.len();
            for effect in outbound {
                if let Err(e) = deliver(chat.as_ref(), &effect).await {
                    warn!(session_id = %session_id, error = %e, ?effect, "chat delivery failed");
                }
            }
            debug!(session_id = %session_id, total, "chat effects delivered");
        });
    }
}

async fn deliver(
    chat: &dyn ChatGateway,
    effect: &Effect,
) -> Result<(), crate::notify::chat::ChatError> {
    match effect {
        Effect::Announce { channel, message } => chat.send(*channel, message.clone()).await,
        Effect::Direct { user, message } => chat.direct(*user, message.clone()).await,
        Effect::SetAccess {
            channel,
            user,
            access,
        } => chat.set_access(*channel, *user, *access).await,
        Effect::SetMuted { user, muted } => chat.set_muted(*user, *muted).await,
        Effect::ScheduleTimer { .. } | Effect::ClearTimer | Effect::Lifecycle(_) => Ok(()),
    }
}
