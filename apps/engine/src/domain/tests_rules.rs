use crate::domain::roles::Role;
use crate::domain::rules::{
    can_vote, check_winner, execute, hunter_owed, kill, next_night_step, resolve_dawn,
    seeded_pick, step_after_wolves, tally_day_votes, DeathCause, Execution,
};
use crate::domain::state::{SubPhase, Winner};
use crate::domain::test_state_helpers::{pid, started};

const TABLE: [Role; 8] = [
    Role::Werewolf,
    Role::Werewolf,
    Role::Seer,
    Role::Witch,
    Role::Protector,
    Role::Hunter,
    Role::Cupid,
    Role::Elder,
];

#[test]
fn first_night_starts_with_cupid_then_skips_it() {
    let mut session = started(&TABLE, SubPhase::Cupid);
    assert_eq!(next_night_step(&session, None), SubPhase::Cupid);
    assert_eq!(
        next_night_step(&session, Some(SubPhase::Cupid)),
        SubPhase::Seer
    );

    session.bonds.push((pid(3), pid(4)));
    assert_eq!(next_night_step(&session, None), SubPhase::Seer);
}

#[test]
fn dead_or_disabled_roles_are_skipped() {
    let mut session = started(&TABLE, SubPhase::Seer);
    session.day_count = 1;
    if let Some(seer) = session.participant_mut(pid(3)) {
        seer.alive = false;
    }
    assert_eq!(next_night_step(&session, None), SubPhase::Protector);

    session.flags.powers_disabled = true;
    assert_eq!(next_night_step(&session, None), SubPhase::Wolves);
    assert_eq!(step_after_wolves(&session), SubPhase::Dawn);
}

#[test]
fn protected_victim_survives_dawn() {
    let mut session = started(&TABLE, SubPhase::Witch);
    session.night.victim = Some(pid(3));
    session.night.protected = Some(pid(3));
    assert!(resolve_dawn(&mut session).is_empty());
    assert!(session.is_alive(pid(3)));
}

#[test]
fn elder_survives_first_wolf_attack_only() {
    let mut session = started(&TABLE, SubPhase::Witch);
    session.night.victim = Some(pid(8));
    assert!(resolve_dawn(&mut session).is_empty());
    assert!(session.is_alive(pid(8)));

    let deaths = resolve_dawn(&mut session);
    assert_eq!(deaths.len(), 1);
    assert_eq!(deaths[0].cause, DeathCause::Wolves);
    assert!(!session.is_alive(pid(8)));
}

#[test]
fn lovers_die_together() {
    let mut session = started(&TABLE, SubPhase::Witch);
    session.bonds.push((pid(3), pid(5)));
    session.night.poisoned = Some(pid(5));
    let deaths = resolve_dawn(&mut session);
    assert_eq!(deaths.len(), 2);
    assert_eq!(deaths[1].id, pid(3));
    assert_eq!(deaths[1].cause, DeathCause::Heartbreak);
}

#[test]
fn dead_leader_is_cleared() {
    let mut session = started(&TABLE, SubPhase::Vote);
    session.leader = Some(pid(4));
    kill(&mut session, pid(4), DeathCause::HunterShot);
    assert_eq!(session.leader, None);
    assert!(session.check_invariants().is_ok());
}

#[test]
fn executed_elder_disables_village_powers() {
    let mut session = started(&TABLE, SubPhase::Vote);
    let outcome = execute(&mut session, pid(8));
    assert!(matches!(outcome, Execution::Killed(ref d) if d.len() == 1));
    assert!(session.flags.powers_disabled);
    assert!(!session.power_available(Role::Seer));
}

#[test]
fn executed_idiot_is_revealed_and_loses_vote() {
    let mut session = started(
        &[Role::Werewolf, Role::Idiot, Role::Villager, Role::Villager],
        SubPhase::Vote,
    );
    assert_eq!(execute(&mut session, pid(2)), Execution::Spared(pid(2)));
    assert!(session.is_alive(pid(2)));
    assert!(!can_vote(&session, pid(2)));
    assert!(matches!(execute(&mut session, pid(2)), Execution::Killed(_)));
}

#[test]
fn hunter_is_owed_one_shot() {
    let mut session = started(&TABLE, SubPhase::Vote);
    let deaths = kill(&mut session, pid(6), DeathCause::Execution);
    assert_eq!(hunter_owed(&session, &deaths), Some(pid(6)));
    session.runtime.mark_hunter_shot();
    assert_eq!(hunter_owed(&session, &deaths), None);
}

#[test]
fn leader_ballot_weighs_two() {
    let mut session = started(&TABLE, SubPhase::Vote);
    session.leader = Some(pid(3));
    session.runtime.day_votes.insert(pid(3), pid(1));
    session.runtime.day_votes.insert(pid(4), pid(2));
    let counts = tally_day_votes(&session);
    assert_eq!(counts.get(&pid(1)), Some(&2));
    assert_eq!(counts.get(&pid(2)), Some(&1));
}

#[test]
fn win_conditions() {
    let mut session = started(
        &[Role::Werewolf, Role::Villager, Role::Villager, Role::Seer],
        SubPhase::Vote,
    );
    assert_eq!(check_winner(&session), None);

    kill(&mut session, pid(2), DeathCause::Execution);
    assert_eq!(check_winner(&session), None);
    kill(&mut session, pid(3), DeathCause::Wolves);
    assert_eq!(check_winner(&session), Some(Winner::Wolves));

    let mut village = started(
        &[Role::Werewolf, Role::Villager, Role::Villager],
        SubPhase::Vote,
    );
    kill(&mut village, pid(1), DeathCause::Execution);
    assert_eq!(check_winner(&village), Some(Winner::Village));
}

#[test]
fn cross_faction_lovers_win_alone() {
    let mut session = started(
        &[Role::Werewolf, Role::Cupid, Role::Villager, Role::Villager],
        SubPhase::Vote,
    );
    session.bonds.push((pid(1), pid(2)));
    kill(&mut session, pid(3), DeathCause::Wolves);
    kill(&mut session, pid(4), DeathCause::Execution);
    assert_eq!(check_winner(&session), Some(Winner::Lovers));
}

#[test]
fn seeded_pick_is_stable() {
    let candidates = [pid(2), pid(5), pid(9)];
    let first = seeded_pick(&candidates, 99);
    assert_eq!(first, seeded_pick(&candidates, 99));
    assert!(first.is_some_and(|p| candidates.contains(&p)));
    assert_eq!(seeded_pick(&[], 99), None);
}
