//! Member plan entity.
//!
//! `remaining_credits` never goes below zero: the ledger only writes it through
//! a compare-and-set update on the value it read inside the same transaction.

use std::fmt;
use std::str::FromStr;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Kind of membership plan.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    /// A fixed number of class credits.
    #[sea_orm(string_value = "credit_pack")]
    CreditPack,
    /// Unlimited attendance until `valid_until`.
    #[sea_orm(string_value = "time_pass")]
    TimePass,
}

/// Plan lifecycle status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "suspended")]
    Suspended,
}

impl PlanType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreditPack => "credit_pack",
            Self::TimePass => "time_pass",
        }
    }
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Suspended => "suspended",
        }
    }
}

impl FromStr for PlanType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_pack" => Ok(Self::CreditPack),
            "time_pass" => Ok(Self::TimePass),
            _ => Err(Error::validation(
                "type must be 'credit_pack' or 'time_pass'",
            )),
        }
    }
}

impl FromStr for PlanStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "suspended" => Ok(Self::Suspended),
            _ => Err(Error::validation(
                "status must be 'active', 'expired' or 'suspended'",
            )),
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sea-ORM entity model for the `member_plans` table.
///
/// | Column            | Type             | Description                              |
/// |-------------------|------------------|------------------------------------------|
/// | id                | TEXT (PK)        | Server-assigned plan id                  |
/// | member_id         | TEXT             | Owning member                            |
/// | plan_type         | VARCHAR(16)      | `credit_pack` or `time_pass`             |
/// | name              | TEXT             | Display name                             |
/// | total_credits     | INTEGER NULL     | Credits granted at purchase              |
/// | remaining_credits | INTEGER          | Credits left, never negative             |
/// | valid_from        | TIMESTAMPTZ NULL | Start of validity                        |
/// | valid_until       | TIMESTAMPTZ NULL | End of validity, required for time_pass  |
/// | status            | VARCHAR(16)      | `active`, `expired` or `suspended`       |
/// | created_at        | TIMESTAMPTZ      | Insert time                              |
/// | updated_at        | TIMESTAMPTZ      | Last write                               |
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "member_plans")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,
    #[sea_orm(column_type = "Text")]
    pub member_id: String,
    pub plan_type: PlanType,
    #[sea_orm(column_type = "Text")]
    pub name: String,
    pub total_credits: Option<i32>,
    pub remaining_credits: i32,
    pub valid_from: Option<DateTimeWithTimeZone>,
    pub valid_until: Option<DateTimeWithTimeZone>,
    pub status: PlanStatus,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::member::Entity",
        from = "Column::MemberId",
        to = "super::member::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Member,
}

impl Related<super::member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Member.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
