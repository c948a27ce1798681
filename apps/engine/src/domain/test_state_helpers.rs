//! Session builders for domain unit tests.

use time::macros::datetime;
use time::OffsetDateTime;

use crate::domain::roles::Role;
use crate::domain::runtime::RuntimeState;
use crate::domain::state::{
    ChannelId, Participant, ParticipantId, Phase, Session, SessionChannels, SessionId, SubPhase,
};

pub(crate) const T0: OffsetDateTime = datetime!(2026-01-10 20:00 UTC);

/// A lobby with `n` participants, ids `1..=n`; participant 1 hosts.
pub(crate) fn lobby(n: u64) -> Session {
    let channels = SessionChannels {
        village: ChannelId(1_000),
        wolves: ChannelId(2_000),
    };
    let mut session = Session::new(SessionId(77), channels, ParticipantId(1), "p1", 7, T0);
    for i in 2..=n {
        session
            .participants
            .push(Participant::new(ParticipantId(i), format!("p{i}"), (i - 1) as u32));
    }
    session
}

/// A started session with `roles[i]` dealt to participant `i + 1`,
/// positioned at `sub_phase`.
pub(crate) fn started(roles: &[Role], sub_phase: SubPhase) -> Session {
    let mut session = lobby(roles.len() as u64);
    for (p, role) in session.participants.iter_mut().zip(roles) {
        p.role = Some(*role);
        p.extra_life = *role == Role::Elder;
    }
    session.started = true;
    session.runtime = RuntimeState::for_roles(roles);
    session.restore_position(sub_phase.phase(), sub_phase);
    if sub_phase.phase() == Phase::Day {
        session.day_count = 1;
    }
    session
}

pub(crate) fn pid(raw: u64) -> ParticipantId {
    ParticipantId(raw)
}
