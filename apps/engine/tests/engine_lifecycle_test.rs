//! Startup recovery, liveness and shutdown.
//!
//! Run:
//!   cargo test --test engine_lifecycle_test

mod common;
mod support;

use std::time::Duration;

use nightfall::domain::roles::Role;
use nightfall::domain::state::{ParticipantId, SubPhase};
use nightfall::services::registry::StuckStatus;
use nightfall::services::timers::TimerKind;
use nightfall::store::memory::MemoryStore;
use nightfall::{ActionRequest, Origin, PlayerAction};
use support::{advance, harness, harness_with, open_table, recovered, session, stored_scenario};
use time::OffsetDateTime;

const FOUR: [Role; 4] = [Role::Werewolf, Role::Seer, Role::Witch, Role::Villager];

#[tokio::test(start_paused = true)]
async fn recovery_rearms_the_timer_each_session_should_have() {
    let night = stored_scenario(&FOUR, SubPhase::Seer);

    let mut lobby = stored_scenario(&FOUR, SubPhase::Cupid);
    lobby.record.started = false;
    for p in &mut lobby.participants {
        p.role = None;
        p.extra_life = false;
    }

    let mut ended = stored_scenario(&FOUR, SubPhase::Vote);
    ended.record.phase = "ended".into();
    ended.record.winner = Some("village".into());

    let mut corrupt = stored_scenario(&FOUR, SubPhase::Seer);
    corrupt.record.sub_phase = "twilight".into();

    let ids = [night.record.id, lobby.record.id, ended.record.id];
    let corrupt_id = corrupt.record.id;
    let store = MemoryStore::new();
    for stored in [night, lobby, ended, corrupt] {
        store.put(stored);
    }

    let h = harness_with(store).await;
    let recovery = h.engine.init().await.expect("init");
    let mut restored = recovery.restored.clone();
    restored.sort();
    let mut expected = ids.to_vec();
    expected.sort();
    assert_eq!(restored, expected);
    assert_eq!(recovery.skipped, vec![corrupt_id]);

    let timers = h.engine.timers();
    assert_eq!(
        timers.active(ids[0]).map(|t| t.kind),
        Some(TimerKind::NightInactivity(SubPhase::Seer))
    );
    assert_eq!(
        timers.active(ids[1]).map(|t| t.kind),
        Some(TimerKind::LobbyExpiry)
    );
    assert!(timers.active(ids[2]).is_none());

    // the re-armed timer drives the restored night forward
    advance(11).await;
    assert_eq!(session(&h.engine, ids[0]).sub_phase(), SubPhase::Wolves);
}

#[tokio::test]
async fn a_second_engine_resumes_from_the_store() {
    let first = harness().await;
    let id = open_table(&first.engine, 4, 42).await;
    first.engine.start(id, ParticipantId(1)).await.expect("start");
    let live = session(&first.engine, id);
    first.engine.shutdown().await;
    assert!(first.engine.timers().is_empty());

    let second = harness_with(first.store.clone()).await;
    let recovery = second.engine.init().await.expect("init");
    assert_eq!(recovery.restored, vec![id]);
    assert_eq!(session(&second.engine, id), live);
    assert_eq!(
        second.engine.timers().active(id).map(|t| t.kind),
        Some(TimerKind::NightInactivity(SubPhase::Seer))
    );
}

#[tokio::test]
async fn an_idle_session_is_reported_stuck_until_it_commits() {
    let mut stored = stored_scenario(&FOUR, SubPhase::Seer);
    stored.record.last_mutation_at = OffsetDateTime::now_utc() - time::Duration::hours(1);
    let (h, id) = recovered(stored).await;
    let threshold = h.engine.config().stuck_threshold;

    assert_eq!(h.engine.monitor().detect_stuck(threshold), vec![id]);
    assert_eq!(h.engine.view(id).expect("view").status, StuckStatus::Stuck);

    h.engine
        .handle_action(ActionRequest {
            session_id: id,
            origin: Origin::Direct,
            actor: ParticipantId(2),
            action: PlayerAction::Skip,
        })
        .await
        .expect("seer passes");

    assert_eq!(h.engine.view(id).expect("view").status, StuckStatus::Ok);
    assert!(h.engine.monitor().detect_stuck(threshold).is_empty());
}

#[tokio::test(start_paused = true)]
async fn monitor_task_stops_on_shutdown() {
    let mut stored = stored_scenario(&FOUR, SubPhase::Seer);
    stored.record.last_mutation_at = OffsetDateTime::now_utc() - time::Duration::hours(1);
    let (h, id) = recovered(stored).await;

    h.engine.spawn_monitor();
    h.engine.spawn_monitor();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.engine.view(id).expect("view").status, StuckStatus::Stuck);

    h.engine.shutdown().await;
    assert!(h.engine.timers().is_empty());
}
