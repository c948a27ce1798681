//! Flags sessions that have gone too long without a commit.
//!
//! Read-side only: the monitor never mutates a session, it just flips the
//! health flag in the registry slot. A commit flips it back.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::state::SessionId;
use crate::services::registry::SessionRegistry;

#[derive(Clone)]
pub struct LivenessMonitor {
    registry: Arc<SessionRegistry>,
}

impl LivenessMonitor {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Running sessions idle for longer than `threshold`, ascending.
    pub fn detect_stuck(&self, threshold: Duration) -> Vec<SessionId> {
        self.detect_stuck_at(OffsetDateTime::now_utc(), threshold)
    }

    pub fn detect_stuck_at(&self, now: OffsetDateTime, threshold: Duration) -> Vec<SessionId> {
        let limit = threshold.as_millis() as i128;
        let mut stuck = Vec::new();
        for slot in self.registry.slots() {
            let (running, last) = {
                let session = slot.read();
                (session.is_running(), session.last_mutation_at)
            };
            if !running {
                continue;
            }
            let idle = now - last;
            if idle.whole_milliseconds() > limit {
                slot.mark_stuck(now, idle);
                stuck.push(slot.id());
            }
        }
        stuck.sort();
        stuck
    }

    /// Scan every `interval` until `shutdown` fires.
    pub fn spawn(
        &self,
        interval: Duration,
        threshold: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let stuck = monitor.detect_stuck(threshold);
                        if !stuck.is_empty() {
                            debug!(count = stuck.len(), "liveness scan found idle sessions");
                        }
                    }
                }
            }
            info!("liveness monitor stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::roles::Role;
    use crate::domain::state::SubPhase;
    use crate::domain::test_state_helpers::{lobby, started, T0};
    use crate::services::registry::StuckStatus;

    const ROLES: [Role; 4] = [Role::Werewolf, Role::Villager, Role::Seer, Role::Villager];

    #[test]
    fn idle_running_session_is_flagged_once() {
        let registry = Arc::new(SessionRegistry::new());
        let slot = registry
            .insert(started(&ROLES, SubPhase::Seer))
            .expect("insert");
        let monitor = LivenessMonitor::new(registry.clone());

        let early = T0 + time::Duration::seconds(30);
        assert!(monitor
            .detect_stuck_at(early, Duration::from_secs(60))
            .is_empty());

        let late = T0 + time::Duration::seconds(90);
        assert_eq!(
            monitor.detect_stuck_at(late, Duration::from_secs(60)),
            vec![slot.id()]
        );
        assert_eq!(slot.health().status, StuckStatus::Stuck);
        assert!(!slot.mark_stuck(late, time::Duration::seconds(90)));

        slot.mark_progress(late);
        assert_eq!(slot.health().status, StuckStatus::Ok);
    }

    #[test]
    fn lobbies_are_not_scanned() {
        let registry = Arc::new(SessionRegistry::new());
        registry.insert(lobby(3)).expect("insert");
        let monitor = LivenessMonitor::new(registry);
        let much_later = T0 + time::Duration::hours(5);
        assert!(monitor
            .detect_stuck_at(much_later, Duration::from_secs(1))
            .is_empty());
    }
}
