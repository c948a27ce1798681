//! Engine tunables, read once at startup.

use std::env;
use std::time::Duration;

use crate::error::EngineError;
use crate::services::timers::TimerKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub lobby_ttl: Duration,
    pub night_step: Duration,
    pub hunter_shot: Duration,
    pub deliberation: Duration,
    pub day_vote: Duration,
    pub leader_election: Duration,
    pub leader_tiebreak: Duration,
    pub min_players: usize,
    pub max_players: usize,
    pub lock_timeout: Duration,
    pub lock_hold_warn: Duration,
    pub stuck_threshold: Duration,
    pub monitor_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lobby_ttl: Duration::from_secs(30 * 60),
            night_step: Duration::from_secs(90),
            hunter_shot: Duration::from_secs(60),
            deliberation: Duration::from_secs(180),
            day_vote: Duration::from_secs(90),
            leader_election: Duration::from_secs(90),
            leader_tiebreak: Duration::from_secs(45),
            min_players: 4,
            max_players: 24,
            lock_timeout: Duration::from_secs(15),
            lock_hold_warn: Duration::from_secs(2),
            stuck_threshold: Duration::from_secs(10 * 60),
            monitor_interval: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Unset variables keep their defaults; malformed ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let d = Self::default();
        let secs = |name: &str, default: Duration| -> Result<Duration, EngineError> {
            match lookup(name) {
                None => Ok(default),
                Some(raw) => raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| {
                    EngineError::config(format!("{name} must be a whole number of seconds, got '{raw}'"))
                }),
            }
        };
        let count = |name: &str, default: usize| -> Result<usize, EngineError> {
            match lookup(name) {
                None => Ok(default),
                Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                    EngineError::config(format!("{name} must be a positive integer, got '{raw}'"))
                }),
            }
        };

        let config = Self {
            lobby_ttl: secs("NIGHTFALL_LOBBY_TTL_SECS", d.lobby_ttl)?,
            night_step: secs("NIGHTFALL_NIGHT_STEP_SECS", d.night_step)?,
            hunter_shot: secs("NIGHTFALL_HUNTER_SHOT_SECS", d.hunter_shot)?,
            deliberation: secs("NIGHTFALL_DELIBERATION_SECS", d.deliberation)?,
            day_vote: secs("NIGHTFALL_DAY_VOTE_SECS", d.day_vote)?,
            leader_election: secs("NIGHTFALL_LEADER_ELECTION_SECS", d.leader_election)?,
            leader_tiebreak: secs("NIGHTFALL_LEADER_TIEBREAK_SECS", d.leader_tiebreak)?,
            min_players: count("NIGHTFALL_MIN_PLAYERS", d.min_players)?,
            max_players: count("NIGHTFALL_MAX_PLAYERS", d.max_players)?,
            lock_timeout: secs("NIGHTFALL_LOCK_TIMEOUT_SECS", d.lock_timeout)?,
            lock_hold_warn: secs("NIGHTFALL_LOCK_HOLD_WARN_SECS", d.lock_hold_warn)?,
            stuck_threshold: secs("NIGHTFALL_STUCK_THRESHOLD_SECS", d.stuck_threshold)?,
            monitor_interval: secs("NIGHTFALL_MONITOR_INTERVAL_SECS", d.monitor_interval)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Short, fixed delays for tests driven by paused time.
    pub fn for_tests() -> Self {
        Self {
            lobby_ttl: Duration::from_secs(300),
            night_step: Duration::from_secs(10),
            hunter_shot: Duration::from_secs(5),
            deliberation: Duration::from_secs(20),
            day_vote: Duration::from_secs(10),
            leader_election: Duration::from_secs(10),
            leader_tiebreak: Duration::from_secs(5),
            min_players: 4,
            max_players: 16,
            lock_timeout: Duration::from_secs(5),
            lock_hold_warn: Duration::from_secs(1),
            stuck_threshold: Duration::from_secs(120),
            monitor_interval: Duration::from_secs(30),
        }
    }

    pub fn delay_for(&self, kind: TimerKind) -> Duration {
        match kind {
            TimerKind::LobbyExpiry => self.lobby_ttl,
            TimerKind::NightInactivity(_) => self.night_step,
            TimerKind::ActionDeadline => self.hunter_shot,
            TimerKind::DayDeliberation => self.deliberation,
            TimerKind::DayVote => self.day_vote,
            TimerKind::LeaderElection => self.leader_election,
            TimerKind::LeaderTiebreak => self.leader_tiebreak,
        }
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.min_players < 3 {
            return Err(EngineError::config("NIGHTFALL_MIN_PLAYERS must be at least 3"));
        }
        if self.max_players < self.min_players {
            return Err(EngineError::config(format!(
                "NIGHTFALL_MAX_PLAYERS ({}) is below NIGHTFALL_MIN_PLAYERS ({})",
                self.max_players, self.min_players
            )));
        }
        if self.lock_timeout.is_zero() {
            return Err(EngineError::config("NIGHTFALL_LOCK_TIMEOUT_SECS must be positive"));
        }
        Ok(())
    }
}
