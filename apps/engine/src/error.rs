use thiserror::Error;

use crate::domain::state::SessionId;
use crate::errors::domain::{ConflictKind, DomainError, GuardKind, InfraErrorKind, NotFoundKind};
use crate::errors::ErrorCode;
use crate::services::faults::FaultPoint;
use crate::store::StoreError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Rejected: {detail}")]
    Guard { code: ErrorCode, detail: String },
    #[error("Invalid transition: {detail}")]
    InvalidTransition { detail: String },
    #[error("Persistence failed: {detail}")]
    Persistence { detail: String },
    #[error("Nested atomic section for session {session_id}")]
    NestedSection { session_id: SessionId },
    #[error("Not found: {detail}")]
    NotFound { code: ErrorCode, detail: String },
    #[error("Conflict: {detail}")]
    Conflict { code: ErrorCode, detail: String },
    #[error("Lock closed: {key}")]
    LockClosed { key: String },
    #[error("Injected fault at {point:?}")]
    InjectedFault { point: FaultPoint },
    #[error("Configuration error: {detail}")]
    Config { detail: String },
    #[error("Internal error: {detail}")]
    Internal { detail: String },
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Guard { code, .. } => *code,
            EngineError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            EngineError::Persistence { .. } => ErrorCode::PersistenceFailed,
            EngineError::NestedSection { .. } => ErrorCode::NestedSection,
            EngineError::NotFound { code, .. } => *code,
            EngineError::Conflict { code, .. } => *code,
            EngineError::LockClosed { .. } => ErrorCode::LockClosed,
            EngineError::InjectedFault { .. } => ErrorCode::InjectedFault,
            EngineError::Config { .. } => ErrorCode::ConfigError,
            EngineError::Internal { .. } => ErrorCode::Internal,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            EngineError::Guard { detail, .. }
            | EngineError::InvalidTransition { detail }
            | EngineError::Persistence { detail }
            | EngineError::NotFound { detail, .. }
            | EngineError::Conflict { detail, .. }
            | EngineError::Config { detail }
            | EngineError::Internal { detail } => detail.clone(),
            EngineError::NestedSection { session_id } => {
                format!("session {session_id} already has an active section")
            }
            EngineError::LockClosed { key } => format!("lock {key} is closed"),
            EngineError::InjectedFault { point } => format!("fault injected at {point:?}"),
        }
    }

    pub fn guard(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::Guard {
            code,
            detail: detail.into(),
        }
    }

    pub fn invalid_transition(detail: impl Into<String>) -> Self {
        Self::InvalidTransition {
            detail: detail.into(),
        }
    }

    pub fn persistence(detail: impl Into<String>) -> Self {
        Self::Persistence {
            detail: detail.into(),
        }
    }

    pub fn not_found(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::NotFound {
            code,
            detail: detail.into(),
        }
    }

    pub fn conflict(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self::Conflict {
            code,
            detail: detail.into(),
        }
    }

    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            detail: detail.into(),
        }
    }

    pub fn session_not_found(session_id: SessionId) -> Self {
        Self::not_found(
            ErrorCode::SessionNotFound,
            format!("session {session_id} not found"),
        )
    }

    pub fn is_guard(&self) -> bool {
        matches!(self, EngineError::Guard { .. })
    }
}

impl From<DomainError> for EngineError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::Guard(kind, detail) => {
                let code = match kind {
                    GuardKind::SessionEnded => ErrorCode::SessionEnded,
                    GuardKind::NotStarted => ErrorCode::SessionNotStarted,
                    GuardKind::AlreadyStarted => ErrorCode::SessionAlreadyStarted,
                    GuardKind::WrongPhase => ErrorCode::PhaseMismatch,
                    GuardKind::WrongChannel => ErrorCode::WrongChannel,
                    GuardKind::NotParticipant => ErrorCode::NotAParticipant,
                    GuardKind::ActorDead => ErrorCode::ActorDead,
                    GuardKind::WrongRole => ErrorCode::WrongRole,
                    GuardKind::InvalidTarget => ErrorCode::InvalidTarget,
                    GuardKind::AlreadyActed => ErrorCode::AlreadyActed,
                    GuardKind::NotHost => ErrorCode::NotHost,
                    GuardKind::NotEnoughPlayers => ErrorCode::NotEnoughPlayers,
                    GuardKind::SessionFull => ErrorCode::SessionFull,
                    GuardKind::PowersDisabled => ErrorCode::PowersDisabled,
                    GuardKind::AbilityUsed => ErrorCode::AbilityUsed,
                    GuardKind::CannotVote => ErrorCode::CannotVote,
                    GuardKind::Other(_) => ErrorCode::ValidationError,
                };
                EngineError::guard(code, detail)
            }
            DomainError::Conflict(kind, detail) => {
                let code = match kind {
                    ConflictKind::SessionExists => ErrorCode::SessionExists,
                    ConflictKind::AlreadyJoined => ErrorCode::AlreadyJoined,
                    ConflictKind::Other(_) => ErrorCode::Conflict,
                };
                EngineError::conflict(code, detail)
            }
            DomainError::NotFound(kind, detail) => {
                let code = match kind {
                    NotFoundKind::Session => ErrorCode::SessionNotFound,
                    NotFoundKind::Participant => ErrorCode::ParticipantNotFound,
                    NotFoundKind::Other(_) => ErrorCode::NotFound,
                };
                EngineError::not_found(code, detail)
            }
            DomainError::Infra(kind, detail) => match kind {
                InfraErrorKind::DataCorruption => EngineError::invalid_transition(detail),
                InfraErrorKind::Timeout | InfraErrorKind::DbUnavailable => {
                    EngineError::persistence(format!("{kind:?}: {detail}"))
                }
                InfraErrorKind::Other(_) => EngineError::internal(detail),
            },
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::persistence(e.to_string())
    }
}

impl From<sea_orm::DbErr> for EngineError {
    fn from(e: sea_orm::DbErr) -> Self {
        EngineError::persistence(format!("db error: {e}"))
    }
}

impl From<std::env::VarError> for EngineError {
    fn from(e: std::env::VarError) -> Self {
        EngineError::config(format!("env var error: {e}"))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::internal(format!("serialization error: {e}"))
    }
}
