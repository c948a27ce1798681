use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    #[sea_orm(column_name = "village_channel")]
    pub village_channel: i64,
    #[sea_orm(column_name = "wolves_channel")]
    pub wolves_channel: i64,
    #[sea_orm(column_name = "host_id")]
    pub host_id: i64,
    pub started: bool,
    pub phase: String,
    #[sea_orm(column_name = "sub_phase")]
    pub sub_phase: String,
    #[sea_orm(column_name = "day_count")]
    pub day_count: i32,
    #[sea_orm(column_name = "leader_id")]
    pub leader_id: Option<i64>,
    #[sea_orm(column_name = "victim_id")]
    pub victim_id: Option<i64>,
    #[sea_orm(column_name = "protected_id")]
    pub protected_id: Option<i64>,
    #[sea_orm(column_name = "healed_id")]
    pub healed_id: Option<i64>,
    #[sea_orm(column_name = "poisoned_id")]
    pub poisoned_id: Option<i64>,
    #[sea_orm(column_type = "Text")]
    pub bonds: String,
    #[sea_orm(column_name = "powers_disabled")]
    pub powers_disabled: bool,
    #[sea_orm(column_name = "reveal_level")]
    pub reveal_level: String,
    pub winner: Option<String>,
    #[sea_orm(column_type = "Text")]
    pub runtime: String,
    #[sea_orm(column_name = "rng_seed")]
    pub rng_seed: i64,
    #[sea_orm(column_name = "created_at")]
    pub created_at: OffsetDateTime,
    #[sea_orm(column_name = "last_mutation_at")]
    pub last_mutation_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::participants::Entity")]
    Participants,
    #[sea_orm(has_many = "super::action_log::Entity")]
    ActionLog,
}

impl Related<super::participants::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participants.def()
    }
}

impl Related<super::action_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ActionLog.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
