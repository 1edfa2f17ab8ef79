//! Member entity. Only the fields the ledger needs are modelled here.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "members")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_type = "Text")]
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub status: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::member_plan::Entity")]
    MemberPlan,
}

impl Related<super::member_plan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MemberPlan.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
