//! Named failure checkpoints for exercising rollback.
//!
//! A disabled injector (the default) never fails. Tests build the engine
//! with an enabled one and arm the point they want to break; each armed
//! point fires once.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPoint {
    BeforeTimerSchedule,
    AfterMutation,
    BeforeCommit,
    AfterCommit,
    MidTransition,
}

impl FaultPoint {
    pub const ALL: [FaultPoint; 5] = [
        FaultPoint::BeforeTimerSchedule,
        FaultPoint::AfterMutation,
        FaultPoint::BeforeCommit,
        FaultPoint::AfterCommit,
        FaultPoint::MidTransition,
    ];
}

#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    armed: Option<Arc<Mutex<BTreeSet<FaultPoint>>>>,
}

impl FaultInjector {
    pub fn disabled() -> Self {
        Self { armed: None }
    }

    pub fn enabled() -> Self {
        Self {
            armed: Some(Arc::new(Mutex::new(BTreeSet::new()))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.armed.is_some()
    }

    /// No effect on a disabled injector.
    pub fn arm(&self, point: FaultPoint) {
        if let Some(armed) = &self.armed {
            armed.lock().insert(point);
        }
    }

    pub fn is_armed(&self, point: FaultPoint) -> bool {
        self.armed
            .as_ref()
            .is_some_and(|armed| armed.lock().contains(&point))
    }

    /// Fails (and disarms) if `point` is armed.
    pub fn check(&self, point: FaultPoint) -> Result<(), EngineError> {
        let Some(armed) = &self.armed else {
            return Ok(());
        };
        if armed.lock().remove(&point) {
            warn!(?point, "injected fault triggered");
            return Err(EngineError::InjectedFault { point });
        }
        Ok(())
    }
}
