//! One current timer per session, invalidated by epoch rather than by
//! interrupting callbacks.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::state::{SessionId, SubPhase};

/// Timer kinds share a single slot per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    LobbyExpiry,
    NightInactivity(SubPhase),
    /// The hunter's last shot.
    ActionDeadline,
    DayDeliberation,
    DayVote,
    LeaderElection,
    LeaderTiebreak,
}

impl TimerKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            TimerKind::LobbyExpiry => "lobby_expiry",
            TimerKind::NightInactivity(_) => "night_inactivity",
            TimerKind::ActionDeadline => "action_deadline",
            TimerKind::DayDeliberation => "day_deliberation",
            TimerKind::DayVote => "day_vote",
            TimerKind::LeaderElection => "leader_election",
            TimerKind::LeaderTiebreak => "leader_tiebreak",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRegistration {
    pub session_id: SessionId,
    pub kind: TimerKind,
    pub epoch: u64,
}

/// Receives fired timers whose epoch was current at expiry.
#[async_trait]
pub trait TimerHandler: Send + Sync {
    async fn on_timer(&self, fired: TimerRegistration);
}

struct ActiveTimer {
    registration: TimerRegistration,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Inner {
    active: DashMap<SessionId, ActiveTimer>,
    next_epoch: AtomicU64,
}

impl Inner {
    fn is_current(&self, session_id: SessionId, epoch: u64) -> bool {
        self.active
            .get(&session_id)
            .is_some_and(|t| t.registration.epoch == epoch)
    }
}

#[derive(Clone, Default)]
pub struct TimerScheduler {
    inner: Arc<Inner>,
}

impl TimerScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `kind` for `session_id`, superseding whatever was current.
    /// Returns the new epoch.
    pub fn schedule<F, Fut>(
        &self,
        session_id: SessionId,
        kind: TimerKind,
        delay: Duration,
        callback: F,
    ) -> u64
    where
        F: FnOnce(TimerRegistration) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let epoch = self.inner.next_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let registration = TimerRegistration {
            session_id,
            kind,
            epoch,
        };
        let cancel = CancellationToken::new();

        let previous = self.inner.active.insert(
            session_id,
            ActiveTimer {
                registration,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
            debug!(
                session_id = %session_id,
                superseded = previous.registration.kind.as_str(),
                superseded_epoch = previous.registration.epoch,
                "timer superseded"
            );
        }
        debug!(
            session_id = %session_id,
            kind = kind.as_str(),
            epoch,
            delay_ms = delay.as_millis() as u64,
            "timer scheduled"
        );

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if !inner.is_current(session_id, epoch) {
                debug!(session_id = %session_id, epoch, "stale timer ignored");
                return;
            }
            callback(registration).await;
        });

        epoch
    }

    pub fn is_current(&self, session_id: SessionId, epoch: u64) -> bool {
        self.inner.is_current(session_id, epoch)
    }

    pub fn active(&self, session_id: SessionId) -> Option<TimerRegistration> {
        self.inner.active.get(&session_id).map(|t| t.registration)
    }

    pub fn clear(&self, session_id: SessionId) {
        if let Some((_, timer)) = self.inner.active.remove(&session_id) {
            timer.cancel.cancel();
            debug!(
                session_id = %session_id,
                kind = timer.registration.kind.as_str(),
                epoch = timer.registration.epoch,
                "timer cleared"
            );
        }
    }

    pub fn clear_all(&self) {
        for entry in self.inner.active.iter() {
            entry.cancel.cancel();
        }
        self.inner.active.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn bump(hits: &Arc<AtomicUsize>) -> impl FnOnce(TimerRegistration) -> std::future::Ready<()> {
        let hits = hits.clone();
        move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn newer_timer_supersedes_older() {
        let timers = TimerScheduler::new();
        let session = SessionId(9);
        let (old_hits, new_hits) = (counter(), counter());

        let first = timers.schedule(
            session,
            TimerKind::LobbyExpiry,
            Duration::from_secs(5),
            bump(&old_hits),
        );
        let second = timers.schedule(
            session,
            TimerKind::NightInactivity(SubPhase::Wolves),
            Duration::from_secs(10),
            bump(&new_hits),
        );
        assert!(second > first);
        assert!(!timers.is_current(session, first));
        assert!(timers.is_current(session, second));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(old_hits.load(Ordering::SeqCst), 0);
        assert_eq!(new_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cleared_timer_never_fires() {
        let timers = TimerScheduler::new();
        let hits = counter();
        timers.schedule(
            SessionId(1),
            TimerKind::DayVote,
            Duration::from_secs(1),
            bump(&hits),
        );
        timers.clear(SessionId(1));
        assert!(timers.active(SessionId(1)).is_none());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_have_independent_slots() {
        let timers = TimerScheduler::new();
        let hits = counter();
        timers.schedule(SessionId(1), TimerKind::DayVote, Duration::from_secs(1), bump(&hits));
        timers.schedule(SessionId(2), TimerKind::DayVote, Duration::from_secs(1), bump(&hits));
        assert_eq!(timers.len(), 2);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fired_timer_stays_current_until_replaced() {
        let timers = TimerScheduler::new();
        let hits = counter();
        let epoch = timers.schedule(
            SessionId(3),
            TimerKind::ActionDeadline,
            Duration::from_millis(50),
            bump(&hits),
        );
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            timers.active(SessionId(3)).map(|r| r.epoch),
            Some(epoch)
        );
        timers.clear_all();
        assert!(timers.is_empty());
    }
}
