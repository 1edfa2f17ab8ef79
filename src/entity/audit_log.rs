//! Audit log entity.

use sea_orm::entity::prelude::*;

/// Sea-ORM entity model for the append-only `audit_logs` table.
///
/// `payload` holds the MessagePack encoding of the entry's key-value payload,
/// or `NULL` when the entry carried none. Rows are never updated.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_type = "Text")]
    pub actor_user_id: String,
    #[sea_orm(column_type = "Text")]
    pub action: String,
    #[sea_orm(column_type = "Text")]
    pub target_type: String,
    #[sea_orm(column_type = "Text")]
    pub target_id: String,
    pub payload: Option<Vec<u8>>,
    pub at: DateTimeWithTimeZone,
    #[sea_orm(column_type = "Text", nullable)]
    pub ip: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
