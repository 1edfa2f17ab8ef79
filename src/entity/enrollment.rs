//! Enrollment entity, keyed by `(session_id, member_id)`.

use std::str::FromStr;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Whether a member currently holds a seat.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    #[sea_orm(string_value = "enrolled")]
    Enrolled,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl FromStr for EnrollmentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enrolled" => Ok(Self::Enrolled),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(Error::validation(
                "status must be 'enrolled' or 'cancelled'",
            )),
        }
    }
}

/// Sea-ORM entity model for the `enrollments` table.
///
/// At most one row exists per pair. Cancelling flips `status`; re-enrolling
/// flips it back and restamps `created_at`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "enrollments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub session_id: String,
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub member_id: String,
    pub status: EnrollmentStatus,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::class_session::Entity",
        from = "Column::SessionId",
        to = "super::class_session::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    ClassSession,
}

impl Related<super::class_session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ClassSession.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
