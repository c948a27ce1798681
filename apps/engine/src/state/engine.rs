use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::engine::EngineConfig;
use crate::domain::state::{ParticipantId, SessionId};
use crate::error::EngineError;
use crate::notify::chat::ChatGateway;
use crate::notify::relay::EventRelay;
use crate::services::coordinator::Coordinator;
use crate::services::dispatch::{Dispatcher, Effect, EffectDispatcher};
use crate::services::faults::FaultInjector;
use crate::services::game_flow::{timer_for, ActionRequest, GameFlow, NewSession};
use crate::services::liveness::LivenessMonitor;
use crate::services::locks::LockManager;
use crate::services::registry::{SessionRegistry, SessionView};
use crate::services::timers::{TimerHandler, TimerScheduler};
use crate::store::SessionStore;

/// Outcome of restoring persisted sessions at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recovery {
    pub restored: Vec<SessionId>,
    pub skipped: Vec<SessionId>,
}

/// Engine handle shared by the ingress loop and background tasks.
pub struct Engine {
    config: Arc<EngineConfig>,
    flow: Arc<GameFlow>,
    registry: Arc<SessionRegistry>,
    timers: TimerScheduler,
    store: Arc<dyn SessionStore>,
    relay: Arc<EventRelay>,
    locks: Arc<LockManager>,
    monitor: LivenessMonitor,
    faults: FaultInjector,
    shutdown: CancellationToken,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub(crate) fn assemble(
        config: EngineConfig,
        store: Arc<dyn SessionStore>,
        chat: Arc<dyn ChatGateway>,
        faults: FaultInjector,
    ) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(SessionRegistry::new());
        let locks = Arc::new(LockManager::new(config.lock_hold_warn));
        let relay = Arc::new(EventRelay::new());
        let timers = TimerScheduler::new();

        // Timers call back into the flow that owns the dispatcher arming them.
        let flow = Arc::new_cyclic(|weak: &Weak<GameFlow>| {
            let handler: Weak<dyn TimerHandler> = weak.clone();
            let dispatcher: Arc<dyn EffectDispatcher> = Arc::new(Dispatcher::new(
                chat,
                relay.clone(),
                timers.clone(),
                handler,
            ));
            let coordinator = Coordinator::new(
                registry.clone(),
                locks.clone(),
                store.clone(),
                dispatcher.clone(),
                faults.clone(),
                config.lock_timeout,
            );
            GameFlow::new(coordinator, dispatcher, timers.clone(), config.clone())
        });

        Self {
            monitor: LivenessMonitor::new(registry.clone()),
            config,
            flow,
            registry,
            timers,
            store,
            relay,
            locks,
            faults,
            shutdown: CancellationToken::new(),
            monitor_task: Mutex::new(None),
        }
    }

    /// Load every stored session into memory and re-arm the timer each
    /// one should have. Sessions that fail to restore are skipped.
    pub async fn init(&self) -> Result<Recovery, EngineError> {
        let stored = self.store.load_all().await?;
        let mut recovery = Recovery::default();
        for entry in stored {
            let session_id = entry.record.id;
            let session = match entry.restore() {
                Ok(session) => session,
                Err(e) => {
                    error!(session_id = %session_id, error = %e, "skipping unrecoverable session");
                    recovery.skipped.push(session_id);
                    continue;
                }
            };
            let timer = timer_for(&session);
            if let Err(e) = self.registry.insert(session) {
                warn!(session_id = %session_id, error = %e, "session already loaded");
                recovery.skipped.push(session_id);
                continue;
            }
            if let Some(kind) = timer {
                self.flow.dispatcher().dispatch(
                    session_id,
                    vec![Effect::ScheduleTimer {
                        kind,
                        delay: self.config.delay_for(kind),
                    }],
                );
            }
            recovery.restored.push(session_id);
        }
        info!(
            restored = recovery.restored.len(),
            skipped = recovery.skipped.len(),
            "engine recovered sessions"
        );
        Ok(recovery)
    }

    /// Start the liveness monitor. A second call is a no-op.
    pub fn spawn_monitor(&self) {
        let mut task = self.monitor_task.lock();
        if task.is_some() {
            return;
        }
        *task = Some(self.monitor.spawn(
            self.config.monitor_interval,
            self.config.stuck_threshold,
            self.shutdown.child_token(),
        ));
    }

    /// Stop background work: the monitor exits and pending timers are dropped.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.timers.clear_all();
        let task = self.monitor_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "liveness monitor did not exit cleanly");
            }
        }
        info!(sessions = self.registry.len(), "engine stopped");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn flow(&self) -> &Arc<GameFlow> {
        &self.flow
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn timers(&self) -> &TimerScheduler {
        &self.timers
    }

    pub fn relay(&self) -> &Arc<EventRelay> {
        &self.relay
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn monitor(&self) -> &LivenessMonitor {
        &self.monitor
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    pub fn view(&self, session_id: SessionId) -> Result<SessionView, EngineError> {
        self.registry
            .view(session_id)
            .ok_or_else(|| EngineError::session_not_found(session_id))
    }

    pub async fn create_session(&self, request: NewSession) -> Result<SessionView, EngineError> {
        self.flow.create_session(request).await
    }

    pub async fn join(
        &self,
        session_id: SessionId,
        user: ParticipantId,
        display_name: impl Into<String>,
    ) -> Result<(), EngineError> {
        self.flow.join(session_id, user, display_name.into()).await
    }

    pub async fn leave(&self, session_id: SessionId, user: ParticipantId) -> Result<(), EngineError> {
        self.flow.leave(session_id, user).await
    }

    pub async fn start(&self, session_id: SessionId, actor: ParticipantId) -> Result<(), EngineError> {
        self.flow.start(session_id, actor).await
    }

    pub async fn handle_action(&self, request: ActionRequest) -> Result<(), EngineError> {
        self.flow.handle_action(request).await
    }

    pub async fn terminate(
        &self,
        session_id: SessionId,
        actor: ParticipantId,
    ) -> Result<(), EngineError> {
        self.flow.terminate(session_id, actor).await
    }

    pub async fn delete_session(&self, session_id: SessionId) -> Result<(), EngineError> {
        self.flow.delete_session(session_id).await
    }
}
