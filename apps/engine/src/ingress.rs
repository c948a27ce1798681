//! Line-delimited JSON front door.
//!
//! Each input line is one `Command`; each produces exactly one `Reply`
//! line. Lifecycle events from the relay are interleaved on the same
//! output as `{"event": ...}` lines.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::state::{ChannelId, ParticipantId, Phase, SessionChannels, SessionId, SubPhase};
use crate::error::EngineError;
use crate::notify::relay::RelayEnvelope;
use crate::services::game_flow::{ActionRequest, NewSession, Origin, PlayerAction};
use crate::services::registry::{SessionView, StuckStatus};
use crate::state::engine::Engine;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Create {
        session_id: SessionId,
        village_channel: ChannelId,
        wolves_channel: ChannelId,
        host: ParticipantId,
        host_name: String,
        #[serde(default)]
        seed: Option<u64>,
    },
    Join {
        session_id: SessionId,
        user: ParticipantId,
        name: String,
    },
    Leave {
        session_id: SessionId,
        user: ParticipantId,
    },
    Start {
        session_id: SessionId,
        actor: ParticipantId,
    },
    Act {
        session_id: SessionId,
        origin: Origin,
        actor: ParticipantId,
        action: PlayerAction,
    },
    Terminate {
        session_id: SessionId,
        actor: ParticipantId,
    },
    Delete {
        session_id: SessionId,
    },
    Status {
        session_id: SessionId,
    },
}

/// Public view of a session. Roles are never exposed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub started: bool,
    pub phase: Phase,
    pub sub_phase: SubPhase,
    pub day: u32,
    pub living: Vec<ParticipantId>,
    pub leader: Option<ParticipantId>,
    pub winner: Option<String>,
    pub status: StuckStatus,
}

impl From<&SessionView> for SessionSummary {
    fn from(view: &SessionView) -> Self {
        let session = &view.session;
        Self {
            session_id: session.id,
            started: session.started,
            phase: session.phase(),
            sub_phase: session.sub_phase(),
            day: session.day_count,
            living: session.living_ids(),
            leader: session.leader,
            winner: session.winner.map(|w| w.as_str().to_owned()),
            status: view.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Ok {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        session: Option<SessionSummary>,
    },
    Error {
        ok: bool,
        code: &'static str,
        detail: String,
    },
}

impl Reply {
    fn done() -> Self {
        Reply::Ok {
            ok: true,
            session: None,
        }
    }

    fn with_session(view: &SessionView) -> Self {
        Reply::Ok {
            ok: true,
            session: Some(view.into()),
        }
    }

    fn failed(e: &EngineError) -> Self {
        Reply::Error {
            ok: false,
            code: e.code().as_str(),
            detail: e.detail(),
        }
    }

    fn malformed(e: &serde_json::Error) -> Self {
        Reply::Error {
            ok: false,
            code: "BAD_REQUEST",
            detail: e.to_string(),
        }
    }
}

pub async fn execute(engine: &Engine, command: Command) -> Reply {
    let result = match command {
        Command::Create {
            session_id,
            village_channel,
            wolves_channel,
            host,
            host_name,
            seed,
        } => {
            let request = NewSession {
                id: session_id,
                channels: SessionChannels {
                    village: village_channel,
                    wolves: wolves_channel,
                },
                host,
                host_name,
                seed,
            };
            return match engine.create_session(request).await {
                Ok(view) => Reply::with_session(&view),
                Err(e) => Reply::failed(&e),
            };
        }
        Command::Join {
            session_id,
            user,
            name,
        } => engine.join(session_id, user, name).await,
        Command::Leave { session_id, user } => engine.leave(session_id, user).await,
        Command::Start { session_id, actor } => engine.start(session_id, actor).await,
        Command::Act {
            session_id,
            origin,
            actor,
            action,
        } => {
            engine
                .handle_action(ActionRequest {
                    session_id,
                    origin,
                    actor,
                    action,
                })
                .await
        }
        Command::Terminate { session_id, actor } => engine.terminate(session_id, actor).await,
        Command::Delete { session_id } => engine.delete_session(session_id).await,
        Command::Status { session_id } => {
            return match engine.view(session_id) {
                Ok(view) => Reply::with_session(&view),
                Err(e) => Reply::failed(&e),
            };
        }
    };
    match result {
        Ok(()) => Reply::done(),
        Err(e) => Reply::failed(&e),
    }
}

/// Parse and run one line.
pub async fn handle_line(engine: &Engine, line: &str) -> Reply {
    match serde_json::from_str::<Command>(line) {
        Ok(command) => execute(engine, command).await,
        Err(e) => {
            debug!(error = %e, "malformed command");
            Reply::malformed(&e)
        }
    }
}

#[derive(Serialize)]
struct EventLine<'a> {
    event: &'a RelayEnvelope,
}

/// Serve commands from `input` until EOF or `shutdown`, writing replies
/// and relay events to `output`.
pub async fn serve<R, W>(
    engine: &Engine,
    input: R,
    mut output: W,
    shutdown: CancellationToken,
) -> Result<(), EngineError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let subscription = engine.relay().subscribe_all();
    let token = subscription.token;
    let mut events = subscription.events;

    let result = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            Some(envelope) = events.next() => {
                let json = match serde_json::to_string(&EventLine { event: &envelope }) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "event not serializable");
                        continue;
                    }
                };
                if let Err(e) = write_line(&mut output, &json).await {
                    break Err(e);
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(EngineError::internal(format!("input closed: {e}"))),
                };
                if line.trim().is_empty() {
                    continue;
                }
                let reply = handle_line(engine, &line).await;
                let json = serde_json::to_string(&reply)?;
                if let Err(e) = write_line(&mut output, &json).await {
                    break Err(e);
                }
            }
        }
    };

    engine.relay().unsubscribe(None, token);
    result
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, json: &str) -> Result<(), EngineError> {
    let closed = |e: std::io::Error| EngineError::internal(format!("output closed: {e}"));
    output.write_all(json.as_bytes()).await.map_err(closed)?;
    output.write_all(b"\n").await.map_err(closed)?;
    output.flush().await.map_err(closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::engine::EngineConfig;
    use crate::infra::state::build_engine;

    async fn engine() -> Engine {
        build_engine()
            .with_config(EngineConfig::for_tests())
            .build()
            .await
            .expect("engine")
    }

    #[test]
    fn act_command_parses_tagged_action() {
        let line = r#"{"cmd":"act","session_id":7,"origin":"direct","actor":3,
            "action":{"kind":"inspect","target":4}}"#;
        let command: Command = serde_json::from_str(line).expect("parse");
        assert_eq!(
            command,
            Command::Act {
                session_id: SessionId(7),
                origin: Origin::Direct,
                actor: ParticipantId(3),
                action: PlayerAction::Inspect {
                    target: ParticipantId(4)
                },
            }
        );
    }

    #[tokio::test]
    async fn malformed_line_gets_bad_request() {
        let engine = engine().await;
        let reply = handle_line(&engine, "{not json").await;
        assert!(matches!(reply, Reply::Error { code: "BAD_REQUEST", .. }));
    }

    #[tokio::test]
    async fn create_then_status_reports_lobby() {
        let engine = engine().await;
        let create = r#"{"cmd":"create","session_id":11,"village_channel":100,
            "wolves_channel":101,"host":1,"host_name":"ana","seed":5}"#;
        assert!(matches!(
            handle_line(&engine, create).await,
            Reply::Ok { ok: true, .. }
        ));

        let reply = handle_line(&engine, r#"{"cmd":"status","session_id":11}"#).await;
        let json = serde_json::to_value(&reply).expect("serialize");
        assert_eq!(json["ok"], true);
        assert_eq!(json["session"]["started"], false);
        assert_eq!(json["session"]["status"], "OK");
        assert_eq!(json["session"]["living"], serde_json::json!([1]));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn unknown_session_reports_its_code() {
        let engine = engine().await;
        let reply = handle_line(&engine, r#"{"cmd":"start","session_id":99,"actor":1}"#).await;
        let json = serde_json::to_value(&reply).expect("serialize");
        assert_eq!(json["ok"], false);
        assert_eq!(json["code"], "SESSION_NOT_FOUND");
    }
}
