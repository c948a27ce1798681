//! Lobby lifecycle: open, join, leave, start, terminate, delete.

use tracing::{info, warn};

use crate::domain::roles;
use crate::domain::runtime::RuntimeState;
use crate::domain::seed_derivation::derive_assignment_seed;
use crate::domain::state::{
    Participant, ParticipantId, Session, SessionChannels, SessionId, Winner,
};
use crate::error::EngineError;
use crate::errors::domain::{ConflictKind, DomainError, GuardKind, NotFoundKind};
use crate::notify::chat::{Access, Announcement};
use crate::notify::relay::LifecycleEvent;
use crate::services::registry::SessionView;
use crate::services::timers::TimerKind;

use super::{night, GameFlow};

/// What a new lobby needs from the chat front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub id: SessionId,
    pub channels: SessionChannels,
    pub host: ParticipantId,
    pub host_name: String,
    /// Fixed seed for reproducible games; random when `None`.
    pub seed: Option<u64>,
}

fn require_lobby(session: &Session) -> Result<(), DomainError> {
    if session.started {
        return Err(DomainError::guard(
            GuardKind::AlreadyStarted,
            "The game has already started",
        ));
    }
    Ok(())
}

fn require_host(session: &Session, actor: ParticipantId) -> Result<(), DomainError> {
    if session.host != actor {
        return Err(DomainError::guard(
            GuardKind::NotHost,
            "Only the host can do that",
        ));
    }
    Ok(())
}

impl GameFlow {
    /// Open a lobby and persist it. The lobby expires unless started.
    pub async fn create_session(&self, request: NewSession) -> Result<SessionView, EngineError> {
        let seed = request.seed.unwrap_or_else(rand::random);
        let session = Session::new(
            request.id,
            request.channels,
            request.host,
            request.host_name,
            seed,
            time::OffsetDateTime::now_utc(),
        );
        let registry = self.coordinator.registry();
        registry.insert(session)?;

        let lobby_ttl = self.config.lobby_ttl;
        let opened = self
            .coordinator
            .run_atomic(request.id, |ctx| {
                let host = ctx.host;
                ctx.log_action(Some(host), "created", "");
                ctx.announce_village(Announcement::LobbyOpened { host });
                ctx.emit(LifecycleEvent::Created { host });
                ctx.schedule_timer(TimerKind::LobbyExpiry, lobby_ttl)
            })
            .await;
        if let Err(e) = opened {
            registry.remove(request.id);
            return Err(e);
        }

        info!(session_id = %request.id, host = %request.host, "session created");
        registry
            .view(request.id)
            .ok_or_else(|| EngineError::session_not_found(request.id))
    }

    pub async fn join(
        &self,
        session_id: SessionId,
        user: ParticipantId,
        display_name: String,
    ) -> Result<(), EngineError> {
        let max_players = self.config.max_players;
        self.coordinator
            .run_atomic(session_id, |ctx| {
                require_lobby(ctx.session())?;
                if ctx.participant(user).is_some() {
                    return Err(DomainError::conflict(
                        ConflictKind::AlreadyJoined,
                        format!("{user} is already in this lobby"),
                    )
                    .into());
                }
                if ctx.participants.len() >= max_players {
                    return Err(DomainError::guard(
                        GuardKind::SessionFull,
                        format!("The lobby is full ({max_players} players)"),
                    )
                    .into());
                }
                let order = ctx
                    .participants
                    .iter()
                    .map(|p| p.joined_order + 1)
                    .max()
                    .unwrap_or(0);
                ctx.session_mut()
                    .participants
                    .push(Participant::new(user, display_name.clone(), order));
                ctx.log_action(Some(user), "join", display_name.clone());
                ctx.announce_village(Announcement::Joined {
                    participant: user,
                    name: display_name,
                });
                ctx.emit(LifecycleEvent::ParticipantJoined { participant: user });
                Ok(())
            })
            .await
    }

    pub async fn leave(&self, session_id: SessionId, user: ParticipantId) -> Result<(), EngineError> {
        self.coordinator
            .run_atomic(session_id, |ctx| {
                require_lobby(ctx.session())?;
                if ctx.participant(user).is_none() {
                    return Err(DomainError::not_found(
                        NotFoundKind::Participant,
                        format!("{user} is not in this lobby"),
                    )
                    .into());
                }
                if ctx.host == user {
                    return Err(DomainError::guard(
                        GuardKind::Other("HOST_CANNOT_LEAVE".into()),
                        "The host must terminate the lobby instead",
                    )
                    .into());
                }
                ctx.session_mut().participants.retain(|p| p.id != user);
                ctx.log_action(Some(user), "leave", "");
                ctx.announce_village(Announcement::Left { participant: user });
                ctx.emit(LifecycleEvent::ParticipantLeft { participant: user });
                Ok(())
            })
            .await
    }

    /// Deal roles, open the wolves' channel and fall into the first night.
    pub async fn start(&self, session_id: SessionId, actor: ParticipantId) -> Result<(), EngineError> {
        let config = self.config.as_ref();
        self.coordinator
            .run_atomic(session_id, |ctx| {
                require_host(ctx.session(), actor)?;
                require_lobby(ctx.session())?;
                let players = ctx.participants.len();
                if players < config.min_players {
                    return Err(DomainError::guard(
                        GuardKind::NotEnoughPlayers,
                        format!("Need at least {} players, have {players}", config.min_players),
                    )
                    .into());
                }

                let ids: Vec<ParticipantId> = ctx.participants.iter().map(|p| p.id).collect();
                let dealt = roles::assign(&ids, derive_assignment_seed(ctx.rng_seed));
                let session = ctx.session_mut();
                for (id, role) in &dealt {
                    if let Some(p) = session.participant_mut(*id) {
                        p.role = Some(*role);
                        p.extra_life = *role == roles::Role::Elder;
                    }
                }
                let dealt_roles: Vec<_> = dealt.iter().map(|(_, r)| *r).collect();
                session.runtime = RuntimeState::for_roles(&dealt_roles);
                session.started = true;

                let (village, wolves) = (ctx.channels.village, ctx.channels.wolves);
                for (id, role) in dealt {
                    ctx.direct(id, Announcement::RoleDealt { role });
                    ctx.set_access(village, id, Access::Write);
                    let wolf_access = if role.faction() == roles::Faction::Wolves {
                        Access::Write
                    } else {
                        Access::Hidden
                    };
                    ctx.set_access(wolves, id, wolf_access);
                }
                ctx.log_action(Some(actor), "start", format!("{players} players"));
                ctx.emit(LifecycleEvent::Started { players });
                night::begin_night(ctx, config)
            })
            .await?;
        info!(session_id = %session_id, "session started");
        Ok(())
    }

    /// Host ends the session early.
    pub async fn terminate(&self, session_id: SessionId, actor: ParticipantId) -> Result<(), EngineError> {
        self.coordinator
            .run_atomic(session_id, |ctx| {
                require_host(ctx.session(), actor)?;
                ctx.log_action(Some(actor), "terminate", "");
                ctx.announce_village(Announcement::GameOver {
                    winner: Winner::Abandoned,
                });
                ctx.end_session(Winner::Abandoned)
            })
            .await?;
        info!(session_id = %session_id, "session terminated");
        Ok(())
    }

    /// Drop a session from storage and memory. Its timer stops with it.
    pub async fn delete_session(&self, session_id: SessionId) -> Result<(), EngineError> {
        let removed = self.coordinator.retire(session_id).await?;
        if removed.is_running() {
            warn!(session_id = %session_id, "deleted a session that was still running");
        }
        info!(session_id = %session_id, "session deleted");
        Ok(())
    }
}
