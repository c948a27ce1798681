//! Schema for the session store: sessions, their participants and the
//! append-only action log.

pub use sea_orm::{ConnectionTrait, DatabaseConnection};
pub use sea_orm_migration::prelude::*;

mod m20260110_000001_sessions;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20260110_000001_sessions::Migration)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationCommand {
    /// Apply every pending migration.
    Up,
    /// Roll back every applied migration.
    Down,
}

/// Run `command` on an open connection and log how many migrations are
/// applied afterwards.
pub async fn migrate(db: &DatabaseConnection, command: MigrationCommand) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let result = match command {
        MigrationCommand::Up => Migrator::up(db, None).await,
        MigrationCommand::Down => Migrator::down(db, None).await,
    };
    if let Err(e) = result {
        tracing::error!(?command, ?backend, error = %e, "session schema migration failed");
        return Err(e);
    }
    let applied = count_applied_migrations(db).await?;
    tracing::info!(
        ?command,
        ?backend,
        applied,
        defined = Migrator::migrations().len(),
        "session schema ready"
    );
    Ok(())
}

/// Number of applied migrations; 0 when the bookkeeping table is missing.
pub async fn count_applied_migrations(db: &DatabaseConnection) -> Result<usize, DbErr> {
    match Migrator::get_applied_migrations(db).await {
        Ok(applied) => Ok(applied.len()),
        Err(DbErr::Exec(_)) => Ok(0),
        Err(e) => Err(e),
    }
}
