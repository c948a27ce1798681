//! SeaORM adapter for the session store.

use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, Order, QueryFilter,
    QueryOrder, TransactionTrait,
};
use tracing::debug;

use crate::domain::state::{ActionLogEntry, Participant, SessionId};
use crate::entities::{action_log, participants, sessions};
use crate::store::{SessionRecord, SessionStore, SessionTxn, StoreError, StoredSession};

pub mod dto;

/// Durable store over Postgres or SQLite.
#[derive(Clone)]
pub struct SeaSessionStore {
    db: DatabaseConnection,
}

impl SeaSessionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

struct SeaTxn {
    txn: DatabaseTransaction,
}

fn key(session_id: SessionId) -> i64 {
    session_id.0 as i64
}

#[async_trait]
impl SessionTxn for SeaTxn {
    async fn upsert_session(&mut self, record: &SessionRecord) -> Result<(), StoreError> {
        sessions::Entity::insert(dto::session_model(record))
            .on_conflict(
                OnConflict::column(sessions::Column::Id)
                    .update_columns([
                        sessions::Column::VillageChannel,
                        sessions::Column::WolvesChannel,
                        sessions::Column::HostId,
                        sessions::Column::Started,
                        sessions::Column::Phase,
                        sessions::Column::SubPhase,
                        sessions::Column::DayCount,
                        sessions::Column::LeaderId,
                        sessions::Column::VictimId,
                        sessions::Column::ProtectedId,
                        sessions::Column::HealedId,
                        sessions::Column::PoisonedId,
                        sessions::Column::Bonds,
                        sessions::Column::PowersDisabled,
                        sessions::Column::RevealLevel,
                        sessions::Column::Winner,
                        sessions::Column::Runtime,
                        sessions::Column::RngSeed,
                        sessions::Column::LastMutationAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.txn)
            .await?;
        Ok(())
    }

    async fn upsert_participants(
        &mut self,
        session_id: SessionId,
        roster: &[Participant],
    ) -> Result<(), StoreError> {
        participants::Entity::delete_many()
            .filter(participants::Column::SessionId.eq(key(session_id)))
            .exec(&self.txn)
            .await?;
        if roster.is_empty() {
            return Ok(());
        }
        participants::Entity::insert_many(
            roster
                .iter()
                .map(|p| dto::participant_model(session_id, p)),
        )
        .exec(&self.txn)
        .await?;
        Ok(())
    }

    async fn append_actions(
        &mut self,
        session_id: SessionId,
        entries: &[ActionLogEntry],
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        action_log::Entity::insert_many(
            entries
                .iter()
                .map(|e| dto::action_model(session_id, e)),
        )
        .exec(&self.txn)
        .await?;
        Ok(())
    }

    async fn truncate_actions(
        &mut self,
        session_id: SessionId,
        from_seq: u32,
    ) -> Result<(), StoreError> {
        action_log::Entity::delete_many()
            .filter(action_log::Column::SessionId.eq(key(session_id)))
            .filter(action_log::Column::Seq.gte(from_seq as i32))
            .exec(&self.txn)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.txn
            .commit()
            .await
            .map_err(|e| StoreError::CommitFailed(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.txn.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SeaSessionStore {
    async fn begin(&self) -> Result<Box<dyn SessionTxn>, StoreError> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Box::new(SeaTxn { txn }))
    }

    async fn load_all(&self) -> Result<Vec<StoredSession>, StoreError> {
        let rows = sessions::Entity::find()
            .order_by(sessions::Column::Id, Order::Asc)
            .all(&self.db)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            let roster = participants::Entity::find()
                .filter(participants::Column::SessionId.eq(id))
                .order_by(participants::Column::JoinedOrder, Order::Asc)
                .all(&self.db)
                .await?
                .into_iter()
                .map(dto::participant)
                .collect::<Result<Vec<_>, _>>()?;
            let actions = action_log::Entity::find()
                .filter(action_log::Column::SessionId.eq(id))
                .order_by(action_log::Column::Seq, Order::Asc)
                .all(&self.db)
                .await?
                .into_iter()
                .map(dto::action)
                .collect::<Result<Vec<_>, _>>()?;
            out.push(StoredSession {
                record: dto::session_record(row)?,
                participants: roster,
                actions,
            });
        }
        debug!(sessions = out.len(), "loaded stored sessions");
        Ok(out)
    }

    async fn delete_session(&self, session_id: SessionId) -> Result<(), StoreError> {
        let txn = self.db.begin().await?;
        action_log::Entity::delete_many()
            .filter(action_log::Column::SessionId.eq(key(session_id)))
            .exec(&txn)
            .await?;
        participants::Entity::delete_many()
            .filter(participants::Column::SessionId.eq(key(session_id)))
            .exec(&txn)
            .await?;
        sessions::Entity::delete_by_id(key(session_id))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }
}
