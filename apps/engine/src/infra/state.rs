use std::sync::Arc;

use crate::adapters::sessions_sea::SeaSessionStore;
use crate::config::db::DbProfile;
use crate::config::engine::EngineConfig;
use crate::error::EngineError;
use crate::infra::db::bootstrap_db;
use crate::notify::chat::{ChatGateway, LoggingChatGateway};
use crate::services::faults::FaultInjector;
use crate::state::engine::Engine;
use crate::store::memory::MemoryStore;
use crate::store::SessionStore;

/// Builder for creating Engine instances (used in both tests and main)
pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn SessionStore>>,
    chat: Option<Arc<dyn ChatGateway>>,
    faults: FaultInjector,
    db_profile: Option<DbProfile>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            store: None,
            chat: None,
            faults: FaultInjector::disabled(),
            db_profile: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Takes precedence over `with_db`.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_db(mut self, profile: DbProfile) -> Self {
        self.db_profile = Some(profile);
        self
    }

    pub fn with_chat(mut self, chat: Arc<dyn ChatGateway>) -> Self {
        self.chat = Some(chat);
        self
    }

    pub fn with_faults(mut self, faults: FaultInjector) -> Self {
        self.faults = faults;
        self
    }

    /// Wire everything up. Does not recover stored sessions; call
    /// `Engine::init` for that.
    pub async fn build(self) -> Result<Engine, EngineError> {
        let store: Arc<dyn SessionStore> = match (self.store, self.db_profile) {
            (Some(store), _) => store,
            // single entrypoint: build + migrate
            (None, Some(profile)) => Arc::new(SeaSessionStore::new(bootstrap_db(profile).await?)),
            (None, None) => Arc::new(MemoryStore::new()),
        };
        let chat = self
            .chat
            .unwrap_or_else(|| Arc::new(LoggingChatGateway));
        Ok(Engine::assemble(self.config, store, chat, self.faults))
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn build_engine() -> EngineBuilder {
    EngineBuilder::new()
}
