//! Minimal member directory.
//!
//! Member profiles are managed elsewhere; this crate only needs to register a
//! member and to answer whether one exists before touching its plans.

use sea_orm::{ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Set};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;

use crate::entity::member::{self, ActiveModel as MemberActiveModel, Entity as MemberEntity};
use crate::error::{Error, Result};
use crate::timestamp::{from_db, now_db};

/// A registered member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub member_id: String,
    pub name: String,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl TryFrom<member::Model> for Member {
    type Error = Error;

    fn try_from(model: member::Model) -> Result<Self> {
        Ok(Self {
            member_id: model.id,
            name: model.name,
            status: model.status,
            created_at: from_db(model.created_at)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MemberDirectory {
    conn: DatabaseConnection,
}

impl MemberDirectory {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Registers a new active member under a server-assigned id.
    pub async fn register(&self, name: &str) -> Result<Member> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("member name is required"));
        }

        let model = MemberActiveModel {
            id: Set(crate::new_id()),
            name: Set(name.to_owned()),
            status: Set("active".to_owned()),
            created_at: Set(now_db()),
        }
        .insert(&self.conn)
        .await?;

        info!(member_id = %model.id, "member registered");
        model.try_into()
    }

    pub async fn get(&self, member_id: &str) -> Result<Member> {
        MemberEntity::find_by_id(member_id.to_owned())
            .one(&self.conn)
            .await?
            .ok_or_else(|| Error::MemberNotFound {
                member_id: member_id.to_owned(),
            })?
            .try_into()
    }
}

/// Fails with [`Error::MemberNotFound`] unless the member exists.
pub(crate) async fn ensure_member<C: ConnectionTrait>(conn: &C, member_id: &str) -> Result<()> {
    let found = MemberEntity::find_by_id(member_id.to_owned())
        .one(conn)
        .await?;

    match found {
        Some(_) => Ok(()),
        None => Err(Error::MemberNotFound {
            member_id: member_id.to_owned(),
        }),
    }
}
