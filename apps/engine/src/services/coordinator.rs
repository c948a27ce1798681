//! Atomic mutation coordinator.
//!
//! Every change to a session runs through `run_atomic`: lock, snapshot,
//! mutate a working copy, persist in one store transaction, then publish
//! the new state and drain queued effects. Any failure leaves the live
//! session exactly as it was and runs no effects.

use std::collections::BTreeSet;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, error, warn};

use crate::domain::state::{
    ActionLogEntry, ChannelId, ParticipantId, Phase, Session, SessionId, SubPhase, Winner,
};
use crate::domain::transitions::{is_valid_phase_transition, is_valid_transition};
use crate::error::EngineError;
use crate::errors::ErrorCode;
use crate::notify::chat::{Access, Announcement};
use crate::notify::relay::LifecycleEvent;
use crate::services::dispatch::{Effect, EffectDispatcher};
use crate::services::faults::{FaultInjector, FaultPoint};
use crate::services::locks::LockManager;
use crate::services::registry::{SessionRegistry, SessionSlot};
use crate::services::timers::TimerKind;
use crate::store::{SessionRecord, SessionStore, StoredSession};

tokio::task_local! {
    static ACTIVE_SECTIONS: BTreeSet<SessionId>;
}

/// Proof of being inside an atomic section. Only the coordinator mints one.
pub struct SectionToken {
    _private: (),
}

/// Whether the current task is inside a section for `session_id`.
pub fn in_section(session_id: SessionId) -> bool {
    ACTIVE_SECTIONS
        .try_with(|active| active.contains(&session_id))
        .unwrap_or(false)
}

pub fn lock_key(session_id: SessionId) -> String {
    format!("session:{session_id}")
}

pub struct Coordinator {
    registry: Arc<SessionRegistry>,
    locks: Arc<LockManager>,
    store: Arc<dyn SessionStore>,
    dispatcher: Arc<dyn EffectDispatcher>,
    faults: FaultInjector,
    lock_timeout: Duration,
}

impl Coordinator {
    pub fn new(
        registry: Arc<SessionRegistry>,
        locks: Arc<LockManager>,
        store: Arc<dyn SessionStore>,
        dispatcher: Arc<dyn EffectDispatcher>,
        faults: FaultInjector,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            locks,
            store,
            dispatcher,
            faults,
            lock_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Run `mutation` as one all-or-nothing change to `session_id`.
    ///
    /// The closure is synchronous: it cannot await, so nothing else can
    /// observe or interleave with a half-applied change.
    pub async fn run_atomic<T, F>(&self, session_id: SessionId, mutation: F) -> Result<T, EngineError>
    where
        T: Send,
        F: FnOnce(&mut MutationCtx<'_>) -> Result<T, EngineError> + Send,
    {
        let (slot, active) = self.enter(session_id)?;
        let guard = self
            .locks
            .acquire(&lock_key(session_id), self.lock_timeout)
            .await?;
        let result = ACTIVE_SECTIONS
            .scope(active, self.run_locked(&slot, mutation))
            .await;
        guard.release();
        result
    }

    /// Remove a session from the store and the registry under its lock.
    /// Returns the final state.
    pub async fn retire(&self, session_id: SessionId) -> Result<Session, EngineError> {
        let (slot, active) = self.enter(session_id)?;
        let key = lock_key(session_id);
        let guard = self.locks.acquire(&key, self.lock_timeout).await?;
        let result = ACTIVE_SECTIONS
            .scope(active, async {
                if !self.registry.holds(&slot) {
                    return Err(EngineError::session_not_found(session_id));
                }
                self.store.delete_session(session_id).await?;
                // Clear before releasing the id; a lobby reopened under it
                // must keep its own timer.
                self.dispatcher.dispatch(
                    session_id,
                    vec![Effect::ClearTimer, Effect::Lifecycle(LifecycleEvent::Deleted)],
                );
                self.registry.remove(session_id);
                Ok(slot.snapshot())
            })
            .await;
        guard.release();
        if result.is_ok() {
            self.locks.forget(&key);
        }
        result
    }

    fn enter(
        &self,
        session_id: SessionId,
    ) -> Result<(Arc<SessionSlot>, BTreeSet<SessionId>), EngineError> {
        if in_section(session_id) {
            error!(session_id = %session_id, "re-entrant atomic section rejected");
            return Err(EngineError::NestedSection { session_id });
        }
        let slot = self.registry.require(session_id)?;
        let mut active = ACTIVE_SECTIONS
            .try_with(|active| active.clone())
            .unwrap_or_default();
        active.insert(session_id);
        Ok((slot, active))
    }

    async fn run_locked<T, F>(
        &self,
        slot: &Arc<SessionSlot>,
        mutation: F,
    ) -> Result<T, EngineError>
    where
        T: Send,
        F: FnOnce(&mut MutationCtx<'_>) -> Result<T, EngineError> + Send,
    {
        let session_id = slot.id();
        // The slot was captured before queueing; the id may since have been
        // deleted and reused by another session.
        if !self.registry.holds(slot) {
            return Err(EngineError::session_not_found(session_id));
        }

        let before = slot.snapshot();
        if before.is_ended() {
            return Err(EngineError::guard(
                ErrorCode::SessionEnded,
                format!("session {session_id} has ended"),
            ));
        }

        let now = OffsetDateTime::now_utc();
        let mut working = before.clone();
        let (value, effects) = match self.apply(&mut working, now, mutation) {
            Ok(staged) => staged,
            Err(e) => {
                report(session_id, "mutation", &e);
                return Err(e);
            }
        };

        if let Err(e) = self.persist(&before, &working).await {
            report(session_id, "persist", &e);
            return Err(e);
        }

        debug!(
            session_id = %session_id,
            phase = %working.phase(),
            sub_phase = %working.sub_phase(),
            effects = effects.len(),
            "mutation committed"
        );
        *slot.write() = working;
        slot.mark_progress(now);
        self.dispatcher.dispatch(session_id, effects);
        Ok(value)
    }

    fn apply<T, F>(
        &self,
        working: &mut Session,
        now: OffsetDateTime,
        mutation: F,
    ) -> Result<(T, Vec<Effect>), EngineError>
    where
        F: FnOnce(&mut MutationCtx<'_>) -> Result<T, EngineError>,
    {
        let token = SectionToken { _private: () };
        let mut ctx = MutationCtx {
            session: working,
            token: &token,
            faults: &self.faults,
            now,
            effects: Vec::new(),
        };
        let value = mutation(&mut ctx)?;
        let effects = ctx.effects;
        self.faults.check(FaultPoint::AfterMutation)?;
        working.last_mutation_at = now;
        working.check_invariants()?;
        Ok((value, effects))
    }

    async fn persist(&self, before: &Session, after: &Session) -> Result<(), EngineError> {
        let record = SessionRecord::capture(after)?;
        let new_entries = after
            .action_log
            .get(before.action_log.len()..)
            .unwrap_or_default();

        let mut txn = self.store.begin().await?;
        let staged: Result<(), EngineError> = async {
            txn.upsert_session(&record).await?;
            txn.upsert_participants(after.id, &after.participants)
                .await?;
            if !new_entries.is_empty() {
                txn.append_actions(after.id, new_entries).await?;
            }
            self.faults.check(FaultPoint::BeforeCommit)?;
            Ok(())
        }
        .await;

        if let Err(e) = staged {
            if let Err(rollback) = txn.rollback().await {
                warn!(session_id = %after.id, error = %rollback, "store rollback failed");
            }
            return Err(e);
        }
        txn.commit().await?;

        if let Err(e) = self.faults.check(FaultPoint::AfterCommit) {
            self.compensate(before).await;
            return Err(e);
        }
        Ok(())
    }

    /// Write `before` back over a commit that must not stand.
    async fn compensate(&self, before: &Session) {
        let outcome: Result<(), EngineError> = async {
            let stored = StoredSession::capture(before)?;
            let mut txn = self.store.begin().await?;
            txn.upsert_session(&stored.record).await?;
            txn.upsert_participants(before.id, &stored.participants)
                .await?;
            txn.truncate_actions(before.id, before.next_log_seq())
                .await?;
            txn.commit().await?;
            Ok(())
        }
        .await;
        if let Err(e) = outcome {
            error!(
                session_id = %before.id,
                error = %e,
                "could not restore stored session after failed commit; store is ahead of memory"
            );
        }
    }
}

fn report(session_id: SessionId, stage: &'static str, e: &EngineError) {
    match e {
        EngineError::Guard { code, detail } => {
            debug!(session_id = %session_id, stage, code = %code, detail = %detail, "mutation rejected");
        }
        EngineError::InvalidTransition { detail } => {
            error!(session_id = %session_id, stage, detail = %detail, "invalid transition; rolled back");
        }
        EngineError::Persistence { detail } => {
            error!(session_id = %session_id, stage, detail = %detail, "persistence failed; rolled back");
        }
        other => {
            warn!(session_id = %session_id, stage, error = %other, "mutation failed; rolled back");
        }
    }
}

/// The only handle through which a session can be changed.
pub struct MutationCtx<'a> {
    session: &'a mut Session,
    token: &'a SectionToken,
    faults: &'a FaultInjector,
    now: OffsetDateTime,
    effects: Vec<Effect>,
}

impl Deref for MutationCtx<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl MutationCtx<'_> {
    pub fn session(&self) -> &Session {
        self.session
    }

    /// Plain fields only; phase changes go through the setters below.
    pub fn session_mut(&mut self) -> &mut Session {
        self.session
    }

    pub fn now(&self) -> OffsetDateTime {
        self.now
    }

    pub fn set_phase(&mut self, next: Phase) -> Result<(), EngineError> {
        let from = self.session.phase();
        if !is_valid_phase_transition(from, next) {
            return Err(EngineError::invalid_transition(format!(
                "phase {from} -> {next}"
            )));
        }
        if from == Phase::Night && next == Phase::Day {
            self.session.day_count += 1;
        }
        self.session.assign_phase(next, self.token);
        Ok(())
    }

    /// Move to `next`, switching phase when the step belongs to another.
    pub fn set_sub_phase(&mut self, next: SubPhase) -> Result<(), EngineError> {
        let from = self.session.sub_phase();
        if !is_valid_transition(from, next) {
            return Err(EngineError::invalid_transition(format!(
                "sub-phase {from} -> {next}"
            )));
        }
        let phase = next.phase();
        if phase != self.session.phase() {
            self.set_phase(phase)?;
        }
        self.faults.check(FaultPoint::MidTransition)?;
        self.session.assign_sub_phase(next, self.token);
        self.session.runtime.enter_step();
        self.emit(LifecycleEvent::PhaseChanged {
            phase,
            sub_phase: next,
            day: self.session.day_count,
        });
        Ok(())
    }

    pub fn end_session(&mut self, winner: Winner) -> Result<(), EngineError> {
        self.set_phase(Phase::Ended)?;
        self.session.winner = Some(winner);
        self.clear_timer();
        self.emit(LifecycleEvent::Ended { winner });
        Ok(())
    }

    pub fn announce(&mut self, channel: ChannelId, message: Announcement) {
        self.effects.push(Effect::Announce { channel, message });
    }

    pub fn announce_village(&mut self, message: Announcement) {
        let channel = self.session.channels.village;
        self.announce(channel, message);
    }

    pub fn announce_wolves(&mut self, message: Announcement) {
        let channel = self.session.channels.wolves;
        self.announce(channel, message);
    }

    pub fn direct(&mut self, user: ParticipantId, message: Announcement) {
        self.effects.push(Effect::Direct { user, message });
    }

    pub fn set_access(&mut self, channel: ChannelId, user: ParticipantId, access: Access) {
        self.effects.push(Effect::SetAccess {
            channel,
            user,
            access,
        });
    }

    pub fn set_muted(&mut self, user: ParticipantId, muted: bool) {
        self.effects.push(Effect::SetMuted { user, muted });
    }

    /// Queue the session's next timer; replaces any timer queued earlier in
    /// this mutation.
    pub fn schedule_timer(&mut self, kind: TimerKind, delay: Duration) -> Result<(), EngineError> {
        self.faults.check(FaultPoint::BeforeTimerSchedule)?;
        self.effects.retain(|e| !e.is_timer());
        self.effects.push(Effect::ScheduleTimer { kind, delay });
        Ok(())
    }

    pub fn clear_timer(&mut self) {
        self.effects.retain(|e| !e.is_timer());
        self.effects.push(Effect::ClearTimer);
    }

    pub fn emit(&mut self, event: LifecycleEvent) {
        self.effects.push(Effect::Lifecycle(event));
    }

    pub fn log_action(
        &mut self,
        actor: Option<ParticipantId>,
        kind: &str,
        detail: impl Into<String>,
    ) {
        let entry = ActionLogEntry {
            seq: self.session.next_log_seq(),
            day: self.session.day_count,
            sub_phase: self.session.sub_phase(),
            actor,
            kind: kind.to_string(),
            detail: detail.into(),
            at: self.now,
        };
        self.session.action_log.push(entry);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::domain::roles::Role;
    use crate::domain::test_state_helpers::{lobby, pid, started};
    use crate::store::memory::MemoryStore;

    const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct Collecting {
        batches: Mutex<Vec<Vec<Effect>>>,
    }

    impl EffectDispatcher for Collecting {
        fn dispatch(&self, _session_id: SessionId, effects: Vec<Effect>) {
            self.batches.lock().push(effects);
        }
    }

    struct Rig {
        coordinator: Arc<Coordinator>,
        store: MemoryStore,
        dispatched: Arc<Collecting>,
        faults: FaultInjector,
    }

    fn rig(session: Session) -> Rig {
        let registry = Arc::new(SessionRegistry::new());
        registry.insert(session).expect("insert");
        let store = MemoryStore::new();
        let dispatched = Arc::new(Collecting::default());
        let faults = FaultInjector::enabled();
        let coordinator = Coordinator::new(
            registry,
            Arc::new(LockManager::new(Duration::from_secs(1))),
            Arc::new(store.clone()),
            dispatched.clone(),
            faults.clone(),
            LOCK_TIMEOUT,
        );
        Rig {
            coordinator: Arc::new(coordinator),
            store,
            dispatched,
            faults,
        }
    }

    fn live(rig: &Rig, id: SessionId) -> Session {
        rig.coordinator
            .registry()
            .require(id)
            .expect("registered")
            .snapshot()
    }

    #[tokio::test]
    async fn commit_persists_then_dispatches() {
        let session = lobby(4);
        let id = session.id;
        let rig = rig(session);

        rig.coordinator
            .run_atomic(id, |ctx| {
                ctx.log_action(Some(pid(2)), "join", "p2");
                ctx.announce_village(Announcement::QuietNight);
                ctx.schedule_timer(TimerKind::LobbyExpiry, Duration::from_secs(60))
            })
            .await
            .expect("commit");

        let stored = rig.store.get(id).expect("stored");
        assert_eq!(stored.actions.len(), 1);
        assert_eq!(stored.participants.len(), 4);
        assert_eq!(live(&rig, id).action_log.len(), 1);

        let batches = rig.dispatched.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert!(batches[0].iter().any(Effect::is_timer));
    }

    #[tokio::test]
    async fn every_fault_point_leaves_memory_and_store_untouched() {
        let session = lobby(4);
        let id = session.id;
        let rig = rig(session);
        rig.coordinator
            .run_atomic(id, |ctx| {
                ctx.log_action(None, "baseline", "");
                Ok(())
            })
            .await
            .expect("baseline");
        let before = live(&rig, id);
        let baseline = rig.store.get(id).expect("stored");
        let batches_before = rig.dispatched.batches.lock().len();

        for point in FaultPoint::ALL {
            rig.faults.arm(point);
            let err = rig
                .coordinator
                .run_atomic(id, |ctx| {
                    ctx.log_action(Some(pid(1)), "doomed", point_name(point));
                    ctx.schedule_timer(TimerKind::LobbyExpiry, Duration::from_secs(1))?;
                    ctx.set_sub_phase(SubPhase::Seer)
                })
                .await
                .expect_err("fault must abort");
            assert_eq!(err, EngineError::InjectedFault { point }, "{point:?}");
            assert_eq!(live(&rig, id), before, "memory changed at {point:?}");
            assert_eq!(
                rig.store.get(id).expect("stored"),
                baseline,
                "store changed at {point:?}"
            );
            assert!(!rig.faults.is_armed(point));
        }
        assert_eq!(rig.dispatched.batches.lock().len(), batches_before);

        // the lock was released every time
        rig.coordinator
            .run_atomic(id, |ctx| ctx.set_sub_phase(SubPhase::Seer))
            .await
            .expect("clean run after faults");
        assert_eq!(live(&rig, id).sub_phase(), SubPhase::Seer);
    }

    fn point_name(point: FaultPoint) -> String {
        format!("{point:?}")
    }

    #[tokio::test]
    async fn failed_commit_keeps_previous_state() {
        let session = lobby(4);
        let id = session.id;
        let rig = rig(session);
        let before = live(&rig, id);

        rig.store.fail_next_commit();
        let err = rig
            .coordinator
            .run_atomic(id, |ctx| {
                ctx.session_mut().participants.pop();
                Ok(())
            })
            .await
            .expect_err("commit fails");
        assert_eq!(err.code(), ErrorCode::PersistenceFailed);
        assert_eq!(live(&rig, id), before);
        assert!(rig.store.get(id).is_none());
        assert!(rig.dispatched.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn invalid_transition_is_rolled_back() {
        let session = lobby(4);
        let id = session.id;
        let rig = rig(session);

        let err = rig
            .coordinator
            .run_atomic(id, |ctx| {
                ctx.log_action(None, "skip_ahead", "");
                ctx.set_sub_phase(SubPhase::Vote)
            })
            .await
            .expect_err("cupid cannot jump to vote");
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert!(live(&rig, id).action_log.is_empty());
        assert_eq!(rig.store.commits(), 0);
    }

    #[tokio::test]
    async fn nested_section_on_same_session_is_rejected() {
        let session = lobby(4);
        let id = session.id;
        let rig = rig(session);

        let active: BTreeSet<SessionId> = [id].into_iter().collect();
        let nested = ACTIVE_SECTIONS
            .scope(active, rig.coordinator.run_atomic(id, |_| Ok(())))
            .await;
        assert_eq!(nested, Err(EngineError::NestedSection { session_id: id }));
        assert!(!in_section(id));

        // another session's section does not block this one
        let other: BTreeSet<SessionId> = [SessionId(id.0 + 1)].into_iter().collect();
        let allowed = ACTIVE_SECTIONS
            .scope(other, rig.coordinator.run_atomic(id, |ctx| Ok(in_section(ctx.id))))
            .await;
        assert_eq!(allowed, Ok(true));
    }

    #[tokio::test]
    async fn ended_sessions_reject_mutations() {
        let mut session = started(&[Role::Werewolf, Role::Villager, Role::Seer], SubPhase::Vote);
        session.winner = Some(Winner::Village);
        let id = session.id;
        let rig = rig(session);
        rig.coordinator
            .run_atomic(id, |ctx| ctx.end_session(Winner::Village))
            .await
            .expect("end");

        let err = rig
            .coordinator
            .run_atomic(id, |ctx| {
                ctx.log_action(None, "late", "");
                Ok(())
            })
            .await
            .expect_err("ended");
        assert_eq!(err.code(), ErrorCode::SessionEnded);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sections_serialize() {
        let session = lobby(4);
        let id = session.id;
        let rig = rig(session);

        let mut tasks = Vec::new();
        for n in 0..16u64 {
            let coordinator = rig.coordinator.clone();
            tasks.push(tokio::spawn(async move {
                coordinator
                    .run_atomic(id, move |ctx| {
                        ctx.log_action(Some(pid(n)), "tick", n.to_string());
                        Ok(())
                    })
                    .await
            }));
        }
        for task in tasks {
            task.await.expect("join").expect("commit");
        }

        let seqs: Vec<u32> = live(&rig, id).action_log.iter().map(|a| a.seq).collect();
        assert_eq!(seqs, (0..16).collect::<Vec<_>>());
        assert_eq!(rig.store.get(id).expect("stored").actions.len(), 16);
        let stats = rig.coordinator.locks().stats(&lock_key(id)).expect("stats");
        assert_eq!(stats.acquisitions, 16);
        assert_eq!(stats.forced_releases, 0);
    }

    #[tokio::test]
    async fn queued_section_does_not_write_over_a_reused_id() {
        let session = lobby(4);
        let id = session.id;
        let rig = Arc::new(rig(session));
        rig.coordinator
            .run_atomic(id, |_| Ok(()))
            .await
            .expect("persist");

        let held = rig
            .coordinator
            .locks()
            .acquire(&lock_key(id), LOCK_TIMEOUT)
            .await
            .expect("hold");
        let queued = {
            let rig = rig.clone();
            tokio::spawn(async move {
                rig.coordinator
                    .run_atomic(id, |ctx| {
                        ctx.log_action(None, "late", "");
                        Ok(())
                    })
                    .await
            })
        };
        while rig.coordinator.locks().queue_depth(&lock_key(id)) == 0 {
            tokio::task::yield_now().await;
        }

        // Delete and reopen the id while the section waits.
        rig.store.delete_session(id).await.expect("delete");
        rig.coordinator.registry().remove(id);
        let mut reopened = lobby(1);
        reopened.host = pid(99);
        reopened.participants[0].id = pid(99);
        rig.coordinator
            .registry()
            .insert(reopened.clone())
            .expect("reopen");
        held.release();

        let outcome = queued.await.expect("join");
        assert_eq!(outcome.map_err(|e| e.code()), Err(ErrorCode::SessionNotFound));
        assert_eq!(live(&rig, id), reopened);
        assert!(rig.store.get(id).is_none());
    }

    #[tokio::test]
    async fn retire_removes_from_store_and_registry() {
        let session = lobby(3);
        let id = session.id;
        let rig = rig(session);
        rig.coordinator
            .run_atomic(id, |_| Ok(()))
            .await
            .expect("persist");

        let last = rig.coordinator.retire(id).await.expect("retire");
        assert_eq!(last.id, id);
        let batches = rig.dispatched.batches.lock().clone();
        assert_eq!(
            batches.last(),
            Some(&vec![
                Effect::ClearTimer,
                Effect::Lifecycle(LifecycleEvent::Deleted)
            ])
        );
        assert!(rig.store.get(id).is_none());
        assert!(!rig.coordinator.registry().contains(id));
        assert_eq!(
            rig.coordinator.run_atomic(id, |_| Ok(())).await.map_err(|e| e.code()),
            Err(ErrorCode::SessionNotFound)
        );
    }
}
