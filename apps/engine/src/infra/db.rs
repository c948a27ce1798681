use std::future::Future;
use std::time::Duration;

use migration::MigrationCommand;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::{info, warn};

use crate::config::db::{db_url, DbKind, DbProfile};
use crate::error::EngineError;

const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_INTERVAL_MS: u64 = 500;

/// Retry a connection attempt with fixed interval delays.
/// Returns the result of the last attempt after all retries are exhausted.
async fn retry_connection<T, F, Fut>(
    mut connect_fn: F,
    max_attempts: u32,
    interval_ms: u64,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut last_error = None;
    for attempt in 1..=max_attempts {
        match connect_fn().await {
            Ok(conn) => {
                if attempt > 1 {
                    info!(attempts = attempt, interval_ms, "database connection retry succeeded");
                }
                return Ok(conn);
            }
            Err(e) => {
                if attempt < max_attempts {
                    warn!(attempt, max_attempts, interval_ms, error = %e, "database connection failed; retrying");
                    tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                }
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| EngineError::config("database connection was never attempted")))
}

/// Connect without running migrations. In-memory SQLite is pinned to a
/// single connection so every query sees the same database.
pub async fn connect_db(url: &str) -> Result<DatabaseConnection, EngineError> {
    let kind = DbKind::of_url(url);
    let mut options = ConnectOptions::new(url.to_owned());
    options
        .connect_timeout(Duration::from_secs(5))
        .sqlx_logging(false);
    match kind {
        DbKind::Sqlite => {
            options.max_connections(1).min_connections(1);
        }
        DbKind::Postgres => {
            options.max_connections(10);
        }
    }

    let engine = match kind {
        DbKind::Sqlite => "sqlite",
        DbKind::Postgres => "postgresql",
    };
    let conn = retry_connection(
        || {
            let options = options.clone();
            async move { Ok(Database::connect(options).await?) }
        },
        CONNECT_ATTEMPTS,
        CONNECT_INTERVAL_MS,
    )
    .await?;
    info!(engine, "database connected");
    Ok(conn)
}

/// Single entrypoint: resolve the URL, connect, migrate up.
pub async fn bootstrap_db(profile: DbProfile) -> Result<DatabaseConnection, EngineError> {
    let url = db_url(profile)?;
    let conn = connect_db(&url).await?;
    migration::migrate(&conn, MigrationCommand::Up).await?;
    Ok(conn)
}
