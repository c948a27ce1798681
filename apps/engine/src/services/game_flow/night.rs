//! Night steps: cupid, seer, protector, wolves, witch.

use tracing::debug;

use crate::config::engine::EngineConfig;
use crate::domain::collective_vote::{CastResult, CollectiveVoteState, VoteOutcome};
use crate::domain::roles::Potion;
use crate::domain::rules::{next_night_step, step_after_wolves};
use crate::domain::state::{NightTargets, ParticipantId, SubPhase};
use crate::error::EngineError;
use crate::notify::chat::Announcement;
use crate::services::coordinator::MutationCtx;
use crate::services::timers::TimerKind;

use super::day;
use super::guards::acting_role;

pub(super) fn bond(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    actor: ParticipantId,
    first: ParticipantId,
    second: ParticipantId,
) -> Result<(), EngineError> {
    let session = ctx.session_mut();
    session.bonds.push((first, second));
    session.runtime.record(actor, Some(first));
    ctx.direct(first, Announcement::Bonded { partner: second });
    ctx.direct(second, Announcement::Bonded { partner: first });
    ctx.log_action(Some(actor), "bond", format!("{first}+{second}"));
    advance_after(ctx, config, SubPhase::Cupid)
}

pub(super) fn inspect(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    actor: ParticipantId,
    target: ParticipantId,
) -> Result<(), EngineError> {
    let role = ctx
        .participant(target)
        .and_then(|p| p.role)
        .ok_or_else(|| EngineError::invalid_transition(format!("{target} has no role")))?;
    let runtime = &mut ctx.session_mut().runtime;
    runtime.record(actor, Some(target));
    runtime.record_inspection(target);
    ctx.direct(actor, Announcement::Inspection { target, role });
    ctx.log_action(Some(actor), "inspect", target.to_string());
    advance_after(ctx, config, SubPhase::Seer)
}

pub(super) fn protect(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    actor: ParticipantId,
    target: ParticipantId,
) -> Result<(), EngineError> {
    let session = ctx.session_mut();
    session.night.protected = Some(target);
    session.runtime.record(actor, Some(target));
    session.runtime.set_last_protected(target);
    ctx.log_action(Some(actor), "protect", target.to_string());
    advance_after(ctx, config, SubPhase::Protector)
}

/// One wolf's ballot. The step ends as soon as the collective vote settles.
pub(super) fn wolf_vote(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    actor: ParticipantId,
    target: ParticipantId,
) -> Result<(), EngineError> {
    let eligible = ctx.living_wolves().len();
    let session = ctx.session_mut();
    let mut vote = session.runtime.wolf_vote.take().unwrap_or_default();
    let result = vote.cast(actor, target, eligible);
    let round = vote.round;
    session.runtime.wolf_vote = Some(vote);
    session.runtime.record(actor, Some(target));
    ctx.log_action(Some(actor), "wolf_vote", format!("round {round}: {target}"));

    match result {
        CastResult::Pending => Ok(()),
        CastResult::NextRound => {
            debug!(session_id = %ctx.id, "wolves split; second round");
            ctx.session_mut().runtime.enter_step();
            ctx.announce_wolves(Announcement::WolfRound { round });
            ctx.schedule_timer(
                TimerKind::NightInactivity(SubPhase::Wolves),
                config.night_step,
            )
        }
        CastResult::Resolved(outcome) => finish_wolves(ctx, config, outcome),
    }
}

/// Fix the wolves' choice and move on.
pub(super) fn finish_wolves(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    outcome: VoteOutcome,
) -> Result<(), EngineError> {
    let victim = outcome.target();
    ctx.session_mut().night.victim = victim;
    ctx.announce_wolves(Announcement::WolvesChose { target: victim });
    let detail = victim.map_or_else(|| "none".to_string(), |v| v.to_string());
    ctx.log_action(None, "wolves_chose", detail);
    advance_after(ctx, config, SubPhase::Wolves)
}

pub(super) fn use_potion(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    actor: ParticipantId,
    potion: Potion,
    target: ParticipantId,
) -> Result<(), EngineError> {
    let session = ctx.session_mut();
    match potion {
        Potion::Heal => session.night.healed = Some(target),
        Potion::Poison => session.night.poisoned = Some(target),
    }
    session.runtime.mark_potion(potion);
    session.runtime.record(actor, Some(target));
    ctx.log_action(Some(actor), potion.as_str(), target.to_string());
    advance_after(ctx, config, SubPhase::Witch)
}

/// Pass on the current step's ability.
pub(super) fn skip(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    actor: ParticipantId,
) -> Result<(), EngineError> {
    let step = ctx.sub_phase();
    ctx.session_mut().runtime.record(actor, None);
    ctx.log_action(Some(actor), "skip", step.as_str());
    if step == SubPhase::Hunter {
        return day::forfeit_shot(ctx, config);
    }
    advance_after(ctx, config, step)
}

/// Leave `step` for whatever comes next tonight.
pub(super) fn advance_after(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    step: SubPhase,
) -> Result<(), EngineError> {
    let next = match step {
        SubPhase::Cupid | SubPhase::Seer | SubPhase::Protector => {
            next_night_step(ctx.session(), Some(step))
        }
        SubPhase::Wolves => step_after_wolves(ctx.session()),
        SubPhase::Witch => SubPhase::Dawn,
        other => {
            return Err(EngineError::invalid_transition(format!(
                "{other} is not a night step"
            )))
        }
    };
    enter_step(ctx, config, next)
}

/// Nightfall: clear the previous night and open its first step.
pub(super) fn begin_night(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
) -> Result<(), EngineError> {
    let session = ctx.session_mut();
    session.night = NightTargets::default();
    session.runtime.reset_day();
    let day = ctx.day_count;
    ctx.announce_village(Announcement::NightFalls { day });
    for id in ctx.living_ids() {
        ctx.set_muted(id, true);
    }
    let first = next_night_step(ctx.session(), None);
    enter_step(ctx, config, first)
}

/// Switch to `next` and prompt whoever acts in it.
fn enter_step(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    next: SubPhase,
) -> Result<(), EngineError> {
    ctx.set_sub_phase(next)?;
    if next == SubPhase::Dawn {
        return day::dawn(ctx, config);
    }

    let prompted = acting_role(next)
        .and_then(|role| ctx.living_with_role(role))
        .map(|p| p.id);
    if next == SubPhase::Wolves {
        ctx.session_mut().runtime.wolf_vote = Some(CollectiveVoteState::new());
        ctx.announce_wolves(Announcement::YourTurn { step: next });
    } else if let Some(actor) = prompted {
        ctx.direct(actor, Announcement::YourTurn { step: next });
        if next == SubPhase::Witch {
            let victim = ctx.night.victim;
            ctx.direct(actor, Announcement::VictimIs { victim });
        }
    }
    ctx.schedule_timer(TimerKind::NightInactivity(next), config.night_step)
}
