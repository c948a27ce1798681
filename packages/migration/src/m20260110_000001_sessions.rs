use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::{ColumnDef, ForeignKeyAction, Index, Table};

#[derive(DeriveMigrationName)]
pub struct Migration;

// ----- Iden enums for tables & columns -----
#[derive(Iden)]
enum Sessions {
    Table,
    Id,
    VillageChannel,
    WolvesChannel,
    HostId,
    Started,
    Phase,
    SubPhase,
    DayCount,
    LeaderId,
    VictimId,
    ProtectedId,
    HealedId,
    PoisonedId,
    Bonds,
    PowersDisabled,
    RevealLevel,
    Winner,
    Runtime,
    RngSeed,
    CreatedAt,
    LastMutationAt,
}

#[derive(Iden)]
enum Participants {
    Table,
    SessionId,
    UserId,
    DisplayName,
    Role,
    Alive,
    ExtraLife,
    Revealed,
    JoinedOrder,
}

#[derive(Iden)]
enum ActionLog {
    Table,
    Id,
    SessionId,
    Seq,
    Day,
    SubPhase,
    ActorId,
    Kind,
    Detail,
    RecordedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // sessions
        manager
            .create_table(
                Table::create()
                    .table(Sessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sessions::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Sessions::VillageChannel)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Sessions::WolvesChannel)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Sessions::HostId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Sessions::Started)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Sessions::Phase).string().not_null())
                    .col(ColumnDef::new(Sessions::SubPhase).string().not_null())
                    .col(
                        ColumnDef::new(Sessions::DayCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Sessions::LeaderId).big_integer().null())
                    .col(ColumnDef::new(Sessions::VictimId).big_integer().null())
                    .col(ColumnDef::new(Sessions::ProtectedId).big_integer().null())
                    .col(ColumnDef::new(Sessions::HealedId).big_integer().null())
                    .col(ColumnDef::new(Sessions::PoisonedId).big_integer().null())
                    .col(ColumnDef::new(Sessions::Bonds).text().not_null())
                    .col(
                        ColumnDef::new(Sessions::PowersDisabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Sessions::RevealLevel).string().not_null())
                    .col(ColumnDef::new(Sessions::Winner).string().null())
                    .col(ColumnDef::new(Sessions::Runtime).text().not_null())
                    .col(ColumnDef::new(Sessions::RngSeed).big_integer().not_null())
                    .col(
                        ColumnDef::new(Sessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Sessions::LastMutationAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // participants
        manager
            .create_table(
                Table::create()
                    .table(Participants::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Participants::SessionId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Participants::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Participants::DisplayName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Participants::Role).string().null())
                    .col(
                        ColumnDef::new(Participants::Alive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Participants::ExtraLife)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Participants::Revealed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Participants::JoinedOrder)
                            .integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(Participants::SessionId)
                            .col(Participants::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_participants_session_id")
                            .from(Participants::Table, Participants::SessionId)
                            .to(Sessions::Table, Sessions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // action_log (append-only)
        manager
            .create_table(
                Table::create()
                    .table(ActionLog::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ActionLog::Id)
                            .big_integer()
                            .not_null()
                            .primary_key()
                            .auto_increment(),
                    )
                    .col(ColumnDef::new(ActionLog::SessionId).big_integer().not_null())
                    .col(ColumnDef::new(ActionLog::Seq).integer().not_null())
                    .col(ColumnDef::new(ActionLog::Day).integer().not_null())
                    .col(ColumnDef::new(ActionLog::SubPhase).string().not_null())
                    .col(ColumnDef::new(ActionLog::ActorId).big_integer().null())
                    .col(ColumnDef::new(ActionLog::Kind).string().not_null())
                    .col(ColumnDef::new(ActionLog::Detail).text().not_null())
                    .col(
                        ColumnDef::new(ActionLog::RecordedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_action_log_session_id")
                            .from(ActionLog::Table, ActionLog::SessionId)
                            .to(Sessions::Table, Sessions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_action_log_session_seq")
                    .table(ActionLog::Table)
                    .col(ActionLog::SessionId)
                    .col(ActionLog::Seq)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ActionLog::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(Participants::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Sessions::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}
