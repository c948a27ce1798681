//! Error codes surfaced to callers of the engine.
//!
//! Add new codes here; never pass ad-hoc strings as error codes.
//! All codes are SCREAMING_SNAKE_CASE and appear verbatim in ingress replies.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Guard rejections
    SessionEnded,
    SessionNotStarted,
    SessionAlreadyStarted,
    PhaseMismatch,
    WrongChannel,
    NotAParticipant,
    ActorDead,
    WrongRole,
    InvalidTarget,
    AlreadyActed,
    NotHost,
    NotEnoughPlayers,
    SessionFull,
    PowersDisabled,
    AbilityUsed,
    CannotVote,
    ValidationError,

    // Resource Not Found
    SessionNotFound,
    ParticipantNotFound,
    NotFound,

    // Conflicts
    SessionExists,
    AlreadyJoined,
    Conflict,

    // Engine faults
    InvalidTransition,
    PersistenceFailed,
    NestedSection,
    LockClosed,
    InjectedFault,

    // System
    ConfigError,
    DbUnavailable,
    DataCorruption,
    Timeout,
    Internal,
}

impl ErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SessionEnded => "SESSION_ENDED",
            Self::SessionNotStarted => "SESSION_NOT_STARTED",
            Self::SessionAlreadyStarted => "SESSION_ALREADY_STARTED",
            Self::PhaseMismatch => "PHASE_MISMATCH",
            Self::WrongChannel => "WRONG_CHANNEL",
            Self::NotAParticipant => "NOT_A_PARTICIPANT",
            Self::ActorDead => "ACTOR_DEAD",
            Self::WrongRole => "WRONG_ROLE",
            Self::InvalidTarget => "INVALID_TARGET",
            Self::AlreadyActed => "ALREADY_ACTED",
            Self::NotHost => "NOT_HOST",
            Self::NotEnoughPlayers => "NOT_ENOUGH_PLAYERS",
            Self::SessionFull => "SESSION_FULL",
            Self::PowersDisabled => "POWERS_DISABLED",
            Self::AbilityUsed => "ABILITY_USED",
            Self::CannotVote => "CANNOT_VOTE",
            Self::ValidationError => "VALIDATION_ERROR",

            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::ParticipantNotFound => "PARTICIPANT_NOT_FOUND",
            Self::NotFound => "NOT_FOUND",

            Self::SessionExists => "SESSION_EXISTS",
            Self::AlreadyJoined => "ALREADY_JOINED",
            Self::Conflict => "CONFLICT",

            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::PersistenceFailed => "PERSISTENCE_FAILED",
            Self::NestedSection => "NESTED_SECTION",
            Self::LockClosed => "LOCK_CLOSED",
            Self::InjectedFault => "INJECTED_FAULT",

            Self::ConfigError => "CONFIG_ERROR",
            Self::DbUnavailable => "DB_UNAVAILABLE",
            Self::DataCorruption => "DATA_CORRUPTION",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL",
        }
    }

    /// Guard rejections are expected outcomes, not defects.
    pub const fn is_guard(&self) -> bool {
        matches!(
            self,
            Self::SessionEnded
                | Self::SessionNotStarted
                | Self::SessionAlreadyStarted
                | Self::PhaseMismatch
                | Self::WrongChannel
                | Self::NotAParticipant
                | Self::ActorDead
                | Self::WrongRole
                | Self::InvalidTarget
                | Self::AlreadyActed
                | Self::NotHost
                | Self::NotEnoughPlayers
                | Self::SessionFull
                | Self::PowersDisabled
                | Self::AbilityUsed
                | Self::CannotVote
                | Self::ValidationError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
