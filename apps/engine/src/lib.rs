#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod entities;
pub mod error;
pub mod errors;
pub mod infra;
pub mod ingress;
pub mod notify;
pub mod services;
pub mod state;
pub mod store;

// Re-exports for public API
pub use config::db::{db_url, DbKind, DbProfile};
pub use config::engine::EngineConfig;
pub use error::EngineError;
pub use errors::ErrorCode;
pub use infra::db::{bootstrap_db, connect_db};
pub use infra::state::{build_engine, EngineBuilder};
pub use services::game_flow::{ActionRequest, NewSession, Origin, PlayerAction};
pub use state::engine::{Engine, Recovery};

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    engine_test_support::logging::init();
}
