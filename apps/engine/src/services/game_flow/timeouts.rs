//! What happens when a step's timer runs out.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::engine::EngineConfig;
use crate::domain::state::{Session, SubPhase, Winner};
use crate::error::EngineError;
use crate::notify::chat::Announcement;
use crate::services::coordinator::MutationCtx;
use crate::services::timers::{TimerHandler, TimerKind, TimerRegistration};

use super::{day, night, GameFlow};

/// The timer a session at rest should have running, if any.
pub fn timer_for(session: &Session) -> Option<TimerKind> {
    if session.is_ended() {
        return None;
    }
    if !session.started {
        return Some(TimerKind::LobbyExpiry);
    }
    match session.sub_phase() {
        step @ (SubPhase::Cupid
        | SubPhase::Seer
        | SubPhase::Protector
        | SubPhase::Wolves
        | SubPhase::Witch) => Some(TimerKind::NightInactivity(step)),
        SubPhase::Hunter => Some(TimerKind::ActionDeadline),
        SubPhase::LeaderElection => Some(TimerKind::LeaderElection),
        SubPhase::Deliberation => Some(TimerKind::DayDeliberation),
        SubPhase::Vote => Some(TimerKind::DayVote),
        SubPhase::Tiebreak => Some(TimerKind::LeaderTiebreak),
        SubPhase::Dawn => None,
    }
}

#[async_trait]
impl TimerHandler for GameFlow {
    async fn on_timer(&self, fired: TimerRegistration) {
        let result = if fired.kind == TimerKind::LobbyExpiry {
            self.expire_lobby(fired).await
        } else {
            self.apply_fallback(fired).await
        };
        match result {
            Ok(()) => {}
            Err(e) if e.is_guard() => {
                debug!(session_id = %fired.session_id, kind = fired.kind.as_str(), error = %e, "timer found nothing to do");
            }
            Err(e) => {
                warn!(
                    session_id = %fired.session_id,
                    kind = fired.kind.as_str(),
                    epoch = fired.epoch,
                    error = %e,
                    "timer fallback failed"
                );
            }
        }
    }
}

impl GameFlow {
    async fn apply_fallback(&self, fired: TimerRegistration) -> Result<(), EngineError> {
        let config = self.config.as_ref();
        let timers = &self.timers;
        self.coordinator
            .run_atomic(fired.session_id, |ctx| {
                if !timers.is_current(fired.session_id, fired.epoch) {
                    debug!(session_id = %fired.session_id, epoch = fired.epoch, "stale timer ignored");
                    return Ok(());
                }
                info!(
                    session_id = %fired.session_id,
                    kind = fired.kind.as_str(),
                    sub_phase = %ctx.sub_phase(),
                    "timer expired"
                );
                fallback(ctx, config, fired.kind)
            })
            .await
    }

    /// An unstarted lobby timed out: close and delete it.
    async fn expire_lobby(&self, fired: TimerRegistration) -> Result<(), EngineError> {
        let timers = &self.timers;
        let expired = self
            .coordinator
            .run_atomic(fired.session_id, |ctx| {
                if !timers.is_current(fired.session_id, fired.epoch) || ctx.started {
                    return Ok(false);
                }
                ctx.log_action(None, "lobby_expired", "");
                ctx.announce_village(Announcement::GameOver {
                    winner: Winner::Abandoned,
                });
                ctx.end_session(Winner::Abandoned)?;
                Ok(true)
            })
            .await?;
        if expired {
            info!(session_id = %fired.session_id, "lobby expired");
            self.delete_session(fired.session_id).await?;
        }
        Ok(())
    }
}

fn fallback(
    ctx: &mut MutationCtx<'_>,
    config: &EngineConfig,
    kind: TimerKind,
) -> Result<(), EngineError> {
    let step = ctx.sub_phase();
    let applies = match kind {
        TimerKind::NightInactivity(expected) => step == expected,
        TimerKind::ActionDeadline => step == SubPhase::Hunter,
        TimerKind::DayDeliberation => step == SubPhase::Deliberation,
        TimerKind::DayVote => step == SubPhase::Vote,
        TimerKind::LeaderElection => step == SubPhase::LeaderElection,
        TimerKind::LeaderTiebreak => step == SubPhase::Tiebreak,
        TimerKind::LobbyExpiry => false,
    };
    if !applies {
        // The session moved on without replacing this timer; put the
        // right one back.
        return rearm(ctx, config);
    }

    match kind {
        TimerKind::NightInactivity(SubPhase::Wolves) => {
            let mut vote = ctx.session_mut().runtime.wolf_vote.take().unwrap_or_default();
            let outcome = vote.resolve_on_timeout();
            ctx.session_mut().runtime.wolf_vote = Some(vote);
            night::finish_wolves(ctx, config, outcome)
        }
        TimerKind::NightInactivity(step) => {
            ctx.log_action(None, "timeout_skip", step.as_str());
            night::advance_after(ctx, config, step)
        }
        TimerKind::ActionDeadline => day::forfeit_shot(ctx, config),
        TimerKind::DayDeliberation => day::open_vote(ctx, config, None),
        TimerKind::DayVote => day::resolve_day_vote(ctx, config),
        TimerKind::LeaderElection => day::resolve_leader(ctx, config),
        TimerKind::LeaderTiebreak => day::tiebreak_timeout(ctx, config),
        TimerKind::LobbyExpiry => Ok(()),
    }
}

fn rearm(ctx: &mut MutationCtx<'_>, config: &EngineConfig) -> Result<(), EngineError> {
    match timer_for(ctx.session()) {
        Some(kind) => ctx.schedule_timer(kind, config.delay_for(kind)),
        None => {
            ctx.clear_timer();
            Ok(())
        }
    }
}
