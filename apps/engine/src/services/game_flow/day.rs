//! Dawn and the day: deaths, the hunter's shot, leader election, the vote.

use tracing::debug;

use crate::config::engine::EngineConfig;
use crate::domain::collective_vote::{plurality, Plurality};
use crate::domain::roles::Faction;
use crate::domain::rules::{
    self, eligible_voters, hunter_owed, resolve_dawn, seeded_pick, tally_ballots,
    tally_day_votes, Death, Execution,
};
use crate::domain::runtime::PendingShot;
use crate::domain::seed_derivation::derive_tiebreak_seed;
use crate::domain::state::{ParticipantId, Phase, SubPhase};
use crate::error::EngineError;
use crate::notify::chat::{Access, Announcement, DeathNotice};
use crate::notify::relay::LifecycleEvent;
use crate::services::coordinator::MutationCtx;
use crate::services::timers::TimerKind;

use super::night;

/// Resolve the night's targets and open the day.
pub(super) fn dawn(ctx: &mut MutationCtx<'_>, config: &EngineConfig) -> Result<(), EngineError> {
    let deaths = resolve_dawn(ctx.session_mut());
    ctx.session_mut().night = Default::default();
    if deaths.is_empty() {
        ctx.announce_village(Announcement::QuietNight);
    } else {
        announce_deaths(ctx, &deaths);
    }
    ctx.log_action(None, "dawn", format!("{} died", deaths.len()));
    for id in ctx.living_ids() {
        ctx.set_muted(id, false);
    }

    if finish_if_won(ctx)? {
        return Ok(());
    }
    if let Some(hunter) = hunter_owed(ctx.session(), &deaths) {
        return open_hunter(ctx, config, hunter, Phase::Day);
    }
    open_day(ctx, config)
}

fn open_day(ctx: &mut MutationCtx<'_>, config: &EngineConfig) -> Result<(), EngineError> {
    if ctx.leader.is_some() {
        return open_deliberation(ctx, config);
    }
    ctx.set_sub_phase(SubPhase::LeaderElection)?;
    ctx.announce_village(Announcement::LeaderElectionOpened);
    ctx.schedule_timer(TimerKind::LeaderElection, config.leader_election)
}

fn open_deliberation(ctx: &mut MutationCtx<'_>, config: &EngineConfig) -> Result<(), EngineError> {
    ctx.set_sub_phase(SubPhase::Deliberation)?;
    let day = ctx.day_count;
    ctx.announce_village(Announcement::DeliberationOpened { day });
    ctx.schedule_timer(TimerKind::DayDeliberation, config.deliberation)
}

fn open_hunter(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    hunter: ParticipantId,
    resume: Phase,
) -> Result<(), EngineError> {
    ctx.set_sub_phase(SubPhase::Hunter)?;
    ctx.session_mut().runtime.pending_hunter = Some(PendingShot { hunter, resume });
    ctx.announce_village(Announcement::HunterMustShoot { hunter });
    ctx.direct(hunter, Announcement::YourTurn { step: SubPhase::Hunter });
    ctx.schedule_timer(TimerKind::ActionDeadline, config.hunter_shot)
}

/// Chat and relay notices for each death. The dead lose their voice.
fn announce_deaths(ctx: &mut MutationCtx<'_>, deaths: &[Death]) {
    let village = ctx.channels.village;
    let wolves = ctx.channels.wolves;
    let mut notices = Vec::with_capacity(deaths.len());
    for death in deaths {
        notices.push(DeathNotice {
            participant: death.id,
            name: ctx.display_name(death.id),
            cause: death.cause.as_str(),
            reveal: rules::reveal_suffix(ctx.session(), death.id),
        });
        let was_wolf = ctx.participant(death.id).and_then(|p| p.faction()) == Some(Faction::Wolves);
        ctx.emit(LifecycleEvent::ParticipantEliminated {
            participant: death.id,
            cause: death.cause.as_str(),
        });
        ctx.set_access(village, death.id, Access::ReadOnly);
        if was_wolf {
            ctx.set_access(wolves, death.id, Access::ReadOnly);
        }
        ctx.set_muted(death.id, true);
    }
    ctx.announce_village(Announcement::Deaths { deaths: notices });
}

/// End the session if someone has won. Returns whether it ended.
pub(super) fn finish_if_won(ctx: &mut MutationCtx<'_>) -> Result<bool, EngineError> {
    let Some(winner) = rules::check_winner(ctx.session()) else {
        return Ok(false);
    };
    ctx.log_action(None, "game_over", winner.as_str());
    ctx.announce_village(Announcement::GameOver { winner });
    ctx.end_session(winner)?;
    Ok(true)
}

pub(super) fn hunter_shot(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    actor: ParticipantId,
    target: ParticipantId,
) -> Result<(), EngineError> {
    let session = ctx.session_mut();
    session.runtime.record(actor, Some(target));
    session.runtime.mark_hunter_shot();
    let pending = session.runtime.pending_hunter.take();
    let deaths = rules::kill(session, target, rules::DeathCause::HunterShot);
    ctx.log_action(Some(actor), "hunter_shot", target.to_string());
    announce_deaths(ctx, &deaths);
    if finish_if_won(ctx)? {
        return Ok(());
    }
    resume(ctx, config, pending)
}

/// The hunter let the moment pass.
pub(super) fn forfeit_shot(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
) -> Result<(), EngineError> {
    let session = ctx.session_mut();
    session.runtime.mark_hunter_shot();
    let pending = session.runtime.pending_hunter.take();
    let hunter = pending.map(|p| p.hunter);
    ctx.log_action(hunter, "hunter_forfeit", "");
    resume(ctx, config, pending)
}

fn resume(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    pending: Option<PendingShot>,
) -> Result<(), EngineError> {
    match pending.map(|p| p.resume) {
        Some(Phase::Day) => open_day(ctx, config),
        Some(Phase::Night) => night::begin_night(ctx, config),
        Some(Phase::Ended) | None => Err(EngineError::invalid_transition(
            "hunter step without a place to resume",
        )),
    }
}

pub(super) fn leader_ballot(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    actor: ParticipantId,
    candidate: ParticipantId,
) -> Result<(), EngineError> {
    let runtime = &mut ctx.session_mut().runtime;
    runtime.leader_ballots.insert(actor, candidate);
    runtime.record(actor, Some(candidate));
    ctx.log_action(Some(actor), "leader_ballot", candidate.to_string());
    if ctx.runtime.leader_ballots.len() >= eligible_voters(ctx.session()).len() {
        return resolve_leader(ctx, config);
    }
    Ok(())
}

/// Plurality of the ballots cast; ties and empty elections are settled by
/// a seeded draw.
pub(super) fn resolve_leader(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
) -> Result<(), EngineError> {
    let seed = derive_tiebreak_seed(ctx.rng_seed, ctx.day_count, SubPhase::LeaderElection);
    let chosen = match plurality(&tally_ballots(&ctx.runtime.leader_ballots)) {
        Plurality::Winner(leader, _) => Some(leader),
        Plurality::Tie(tied) => seeded_pick(&tied, seed),
        Plurality::Empty => seeded_pick(&ctx.living_ids(), seed),
    };
    if let Some(leader) = chosen {
        ctx.session_mut().leader = Some(leader);
        ctx.announce_village(Announcement::LeaderElected { leader });
        ctx.log_action(None, "leader_elected", leader.to_string());
    }
    open_deliberation(ctx, config)
}

/// Close deliberation. `opened_by` is `None` when the timer did it.
pub(super) fn open_vote(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    opened_by: Option<ParticipantId>,
) -> Result<(), EngineError> {
    if let Some(actor) = opened_by {
        ctx.session_mut().runtime.record(actor, None);
    }
    ctx.log_action(opened_by, "open_vote", "");
    ctx.set_sub_phase(SubPhase::Vote)?;
    ctx.announce_village(Announcement::VoteOpened);
    ctx.schedule_timer(TimerKind::DayVote, config.day_vote)
}

pub(super) fn day_vote(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    actor: ParticipantId,
    target: ParticipantId,
) -> Result<(), EngineError> {
    let runtime = &mut ctx.session_mut().runtime;
    runtime.day_votes.insert(actor, target);
    runtime.record(actor, Some(target));
    ctx.log_action(Some(actor), "day_vote", target.to_string());
    if ctx.runtime.day_votes.len() >= eligible_voters(ctx.session()).len() {
        return resolve_day_vote(ctx, config);
    }
    Ok(())
}

/// Count the day's ballots (the leader's weighs two). A tie goes to the
/// leader when there is one; otherwise nobody is executed.
pub(super) fn resolve_day_vote(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
) -> Result<(), EngineError> {
    match plurality(&tally_day_votes(ctx.session())) {
        Plurality::Winner(target, votes) => {
            debug!(session_id = %ctx.id, target = %target, votes, "village chose");
            carry_out(ctx, config, target)
        }
        Plurality::Tie(candidates) => {
            let leader = ctx.leader;
            ctx.announce_village(Announcement::VoteTied {
                candidates: candidates.clone(),
            });
            match leader {
                Some(leader) => open_tiebreak(ctx, config, leader, candidates),
                None => {
                    ctx.announce_village(Announcement::NoExecution);
                    ctx.log_action(None, "no_execution", "tie");
                    after_execution(ctx, config, &[])
                }
            }
        }
        Plurality::Empty => {
            ctx.announce_village(Announcement::NoExecution);
            ctx.log_action(None, "no_execution", "no votes");
            after_execution(ctx, config, &[])
        }
    }
}

fn open_tiebreak(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    leader: ParticipantId,
    candidates: Vec<ParticipantId>,
) -> Result<(), EngineError> {
    ctx.set_sub_phase(SubPhase::Tiebreak)?;
    ctx.session_mut().runtime.tiebreak_candidates = candidates;
    ctx.direct(leader, Announcement::YourTurn { step: SubPhase::Tiebreak });
    ctx.schedule_timer(TimerKind::LeaderTiebreak, config.leader_tiebreak)
}

pub(super) fn tiebreak(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    actor: ParticipantId,
    target: ParticipantId,
) -> Result<(), EngineError> {
    ctx.session_mut().runtime.record(actor, Some(target));
    ctx.log_action(Some(actor), "tiebreak", target.to_string());
    carry_out(ctx, config, target)
}

/// The leader ran out of time: draw among the tied.
pub(super) fn tiebreak_timeout(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
) -> Result<(), EngineError> {
    let seed = derive_tiebreak_seed(ctx.rng_seed, ctx.day_count, SubPhase::Tiebreak);
    match seeded_pick(&ctx.runtime.tiebreak_candidates, seed) {
        Some(target) => {
            ctx.log_action(None, "tiebreak_draw", target.to_string());
            carry_out(ctx, config, target)
        }
        None => {
            ctx.announce_village(Announcement::NoExecution);
            after_execution(ctx, config, &[])
        }
    }
}

fn carry_out(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    target: ParticipantId,
) -> Result<(), EngineError> {
    match rules::execute(ctx.session_mut(), target) {
        Execution::Spared(idiot) => {
            ctx.announce_village(Announcement::IdiotRevealed { participant: idiot });
            ctx.log_action(None, "idiot_revealed", idiot.to_string());
            after_execution(ctx, config, &[])
        }
        Execution::Killed(deaths) => {
            ctx.log_action(None, "execution", target.to_string());
            announce_deaths(ctx, &deaths);
            after_execution(ctx, config, &deaths)
        }
    }
}

fn after_execution(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    deaths: &[Death],
) -> Result<(), EngineError> {
    if finish_if_won(ctx)? {
        return Ok(());
    }
    if let Some(hunter) = hunter_owed(ctx.session(), deaths) {
        return open_hunter(ctx, config, hunter, Phase::Night);
    }
    night::begin_night(ctx, config)
}
