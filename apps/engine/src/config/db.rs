use std::env;

use crate::error::EngineError;

/// Database profile enum for different environments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbProfile {
    /// Production database profile
    Prod,
    /// Test database profile - enforces safety rules
    Test,
}

/// Which backend a URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Postgres,
    Sqlite,
}

impl DbKind {
    pub fn of_url(url: &str) -> Self {
        if url.starts_with("sqlite:") {
            DbKind::Sqlite
        } else {
            DbKind::Postgres
        }
    }
}

/// Builds a database URL from the process environment.
pub fn db_url(profile: DbProfile) -> Result<String, EngineError> {
    db_url_from(|name| env::var(name).ok(), profile)
}

/// Resolution order: `NIGHTFALL_DB_URL` verbatim, then Postgres pieces when
/// `POSTGRES_HOST` is set, otherwise a SQLite file (in-memory for tests).
pub fn db_url_from(
    lookup: impl Fn(&str) -> Option<String>,
    profile: DbProfile,
) -> Result<String, EngineError> {
    if let Some(url) = lookup("NIGHTFALL_DB_URL") {
        return Ok(url);
    }
    if let Some(host) = lookup("POSTGRES_HOST") {
        let port = lookup("POSTGRES_PORT").unwrap_or_else(|| "5432".to_string());
        let db_name = db_name(&lookup, profile)?;
        let username = must_var(&lookup, "NIGHTFALL_DB_USER")?;
        let password = must_var(&lookup, "NIGHTFALL_DB_PASSWORD")?;
        return Ok(format!(
            "postgresql://{username}:{password}@{host}:{port}/{db_name}"
        ));
    }
    match profile {
        DbProfile::Test => Ok("sqlite::memory:".to_string()),
        DbProfile::Prod => {
            let path = lookup("NIGHTFALL_SQLITE_PATH").unwrap_or_else(|| "nightfall.db".to_string());
            Ok(format!("sqlite://{path}?mode=rwc"))
        }
    }
}

fn db_name(
    lookup: &impl Fn(&str) -> Option<String>,
    profile: DbProfile,
) -> Result<String, EngineError> {
    match profile {
        DbProfile::Prod => must_var(lookup, "PROD_DB"),
        DbProfile::Test => {
            let db_name = must_var(lookup, "TEST_DB")?;
            // Enforce safety: test DB must end with "_test"
            if !db_name.ends_with("_test") {
                return Err(EngineError::config(format!(
                    "Test profile requires database name to end with '_test', but got: '{db_name}'"
                )));
            }
            Ok(db_name)
        }
    }
}

/// Get required variable or return error
fn must_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String, EngineError> {
    lookup(name).ok_or_else(|| {
        EngineError::config(format!("Required environment variable '{name}' is not set"))
    })
}
