//! Class session entity.
//!
//! A session is created once by [`EnrollmentEngine::schedule_session`] and its
//! `enrolled_count` is only ever changed by enroll and cancel, inside the same
//! transaction that flips the matching enrollment row.
//!
//! [`EnrollmentEngine::schedule_session`]: crate::EnrollmentEngine::schedule_session

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a class session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum SessionStatus {
    #[sea_orm(string_value = "Scheduled")]
    Scheduled,
    #[sea_orm(string_value = "Completed")]
    Completed,
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
}

/// Sea-ORM entity model for the `class_sessions` table.
///
/// | Column         | Type        | Description                                  |
/// |----------------|-------------|----------------------------------------------|
/// | id             | TEXT (PK)   | Server-assigned session id                   |
/// | team_id        | TEXT NULL   | Owning team                                  |
/// | coach_ids      | JSON        | Array of coach ids                           |
/// | start_at       | TIMESTAMPTZ | Session start (UTC)                          |
/// | end_at         | TIMESTAMPTZ | Session end (UTC)                            |
/// | location       | TEXT NULL   | Free-form location                           |
/// | capacity       | INTEGER     | Seats available                              |
/// | enrolled_count | INTEGER     | Seats taken, always `<= capacity`            |
/// | status         | VARCHAR(16) | `Scheduled`, `Completed` or `Cancelled`      |
/// | created_at     | TIMESTAMPTZ | Insert time                                  |
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "class_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub team_id: Option<String>,
    pub coach_ids: Json,
    pub start_at: DateTimeWithTimeZone,
    pub end_at: DateTimeWithTimeZone,
    #[sea_orm(column_type = "Text", nullable)]
    pub location: Option<String>,
    pub capacity: i32,
    pub enrolled_count: i32,
    pub status: SessionStatus,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::enrollment::Entity")]
    Enrollment,
}

impl Related<super::enrollment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Enrollment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
