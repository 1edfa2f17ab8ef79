//! Credit ledger over member plans.
//!
//! `remaining_credits` is only ever written by [`CreditLedger::adjust_credits`],
//! and only through a compare-and-set on the value read inside the same
//! transaction. Two concurrent `-1` adjustments against one remaining credit
//! therefore resolve to one success and one
//! [`Error::NegativeCreditsRejected`]: the loser's guard misses, its attempt
//! rolls back, and the retry sees zero credits.

use std::collections::BTreeMap;

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::audit::{AuditTrail, NewAuditEntry};
use crate::entity::member_plan::{
    self, ActiveModel as MemberPlanActiveModel, Entity as MemberPlanEntity, PlanStatus, PlanType,
};
use crate::error::{Error, Result};
use crate::members::ensure_member;
use crate::retry::{Abort, RetryPolicy};
use crate::timestamp::{from_db, from_db_opt, now_db, to_db, to_db_opt};

/// Actor recorded on ledger audit entries; identities live outside this crate.
const LEDGER_ACTOR: &str = "system";

/// Input for [`CreditLedger::create_plan`].
///
/// `plan_type` and `status` arrive as raw strings and are validated before the
/// store is touched.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlan {
    #[serde(rename = "type")]
    pub plan_type: String,
    pub name: String,
    pub total_credits: Option<i32>,
    pub remaining_credits: i32,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub valid_from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub valid_until: Option<OffsetDateTime>,
    pub status: Option<String>,
}

/// Sparse update for [`CreditLedger::update_plan`]; `None` leaves a field
/// untouched, as do blank strings.
///
/// Remaining credits are deliberately absent: they move only through
/// [`CreditLedger::adjust_credits`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdate {
    #[serde(rename = "type")]
    pub plan_type: Option<String>,
    pub name: Option<String>,
    pub total_credits: Option<i32>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub valid_from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub valid_until: Option<OffsetDateTime>,
    pub status: Option<String>,
}

/// A member plan as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub member_id: String,
    #[serde(rename = "type")]
    pub plan_type: PlanType,
    pub name: String,
    pub total_credits: Option<i32>,
    pub remaining_credits: i32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub valid_from: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub valid_until: Option<OffsetDateTime>,
    pub status: PlanStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TryFrom<member_plan::Model> for Plan {
    type Error = Error;

    fn try_from(model: member_plan::Model) -> Result<Self> {
        Ok(Self {
            id: model.id,
            member_id: model.member_id,
            plan_type: model.plan_type,
            name: model.name,
            total_credits: model.total_credits,
            remaining_credits: model.remaining_credits,
            valid_from: from_db_opt(model.valid_from)?,
            valid_until: from_db_opt(model.valid_until)?,
            status: model.status,
            created_at: from_db(model.created_at)?,
            updated_at: from_db(model.updated_at)?,
        })
    }
}

/// Outcome of a successful adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustResult {
    pub remaining_credits: i32,
    pub delta: i32,
}

#[derive(Debug, Clone)]
pub struct CreditLedger {
    conn: DatabaseConnection,
    retry: RetryPolicy,
    audit: Option<AuditTrail>,
}

impl CreditLedger {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self {
            conn,
            retry: RetryPolicy::default(),
            audit: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Emits `PLAN_CREATED`, `PLAN_UPDATED` and `CREDITS_ADJUSTED` after each
    /// successful write.
    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    pub async fn create_plan(&self, member_id: &str, input: NewPlan) -> Result<Plan> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(Error::validation("plan name is required"));
        }
        let plan_type: PlanType = input.plan_type.parse()?;
        let status = match non_blank(input.status.as_deref()) {
            Some(status) => status.parse()?,
            None => PlanStatus::Active,
        };
        if input.remaining_credits < 0 {
            return Err(Error::validation("remainingCredits cannot be negative"));
        }
        if input.total_credits.is_some_and(|total| total < 0) {
            return Err(Error::validation("totalCredits cannot be negative"));
        }
        if plan_type == PlanType::TimePass && input.valid_until.is_none() {
            return Err(Error::validation("validUntil is required for time_pass plans"));
        }
        let valid_from = to_db_opt(input.valid_from)?;
        let valid_until = to_db_opt(input.valid_until)?;

        ensure_member(&self.conn, member_id).await?;

        let now = now_db();
        let model = MemberPlanActiveModel {
            id: Set(crate::new_id()),
            member_id: Set(member_id.to_owned()),
            plan_type: Set(plan_type),
            name: Set(name.to_owned()),
            total_credits: Set(input.total_credits),
            remaining_credits: Set(input.remaining_credits),
            valid_from: Set(valid_from),
            valid_until: Set(valid_until),
            status: Set(status),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.conn)
        .await?;

        info!(member_id, plan_id = %model.id, %plan_type, "plan created");
        self.record(
            "PLAN_CREATED",
            &model.id,
            BTreeMap::from([
                ("memberId".to_owned(), member_id.into()),
                ("type".to_owned(), plan_type.as_str().into()),
                ("remainingCredits".to_owned(), model.remaining_credits.into()),
            ]),
        );
        model.try_into()
    }

    pub async fn get_plan(&self, member_id: &str, plan_id: &str) -> Result<Plan> {
        MemberPlanEntity::find_by_id(plan_id.to_owned())
            .filter(member_plan::Column::MemberId.eq(member_id))
            .one(&self.conn)
            .await?
            .ok_or_else(|| plan_not_found(member_id, plan_id))?
            .try_into()
    }

    /// Applies `delta` (positive or negative) to a plan's remaining credits.
    ///
    /// Rejects with [`Error::NegativeCreditsRejected`] instead of writing when
    /// the balance would drop below zero.
    pub async fn adjust_credits(
        &self,
        member_id: &str,
        plan_id: &str,
        delta: i32,
        reason: Option<&str>,
    ) -> Result<AdjustResult> {
        let result = self
            .retry
            .run("adjust_credits", move || {
                self.try_adjust(member_id, plan_id, delta)
            })
            .await?;

        info!(
            member_id,
            plan_id,
            delta,
            remaining = result.remaining_credits,
            "credits adjusted"
        );

        let mut payload = BTreeMap::from([
            ("memberId".to_owned(), member_id.into()),
            ("delta".to_owned(), delta.into()),
            ("remainingCredits".to_owned(), result.remaining_credits.into()),
        ]);
        if let Some(reason) = non_blank(reason) {
            payload.insert("reason".to_owned(), reason.into());
        }
        self.record("CREDITS_ADJUSTED", plan_id, payload);

        Ok(result)
    }

    async fn try_adjust(
        &self,
        member_id: &str,
        plan_id: &str,
        delta: i32,
    ) -> std::result::Result<AdjustResult, Abort> {
        let txn = self.conn.begin().await?;

        ensure_member(&txn, member_id).await?;

        let plan = MemberPlanEntity::find_by_id(plan_id.to_owned())
            .filter(member_plan::Column::MemberId.eq(member_id))
            .one(&txn)
            .await?
            .ok_or_else(|| plan_not_found(member_id, plan_id))?;

        let rejected = || Error::NegativeCreditsRejected {
            plan_id: plan_id.to_owned(),
            remaining: plan.remaining_credits,
            delta,
        };
        let new_remaining = match plan.remaining_credits.checked_add(delta) {
            Some(value) if value >= 0 => value,
            Some(_) => return Err(rejected().into()),
            None if delta < 0 => return Err(rejected().into()),
            None => return Err(Error::validation("adjustment overflows the credit balance").into()),
        };

        let written = MemberPlanEntity::update_many()
            .col_expr(
                member_plan::Column::RemainingCredits,
                Expr::value(new_remaining),
            )
            .col_expr(member_plan::Column::UpdatedAt, Expr::value(now_db()))
            .filter(member_plan::Column::Id.eq(plan_id))
            .filter(member_plan::Column::MemberId.eq(member_id))
            .filter(member_plan::Column::RemainingCredits.eq(plan.remaining_credits))
            .exec(&txn)
            .await?;
        if written.rows_affected == 0 {
            return Err(Abort::Contended("remaining credits"));
        }

        txn.commit().await?;

        Ok(AdjustResult {
            remaining_credits: new_remaining,
            delta,
        })
    }

    /// Writes only the supplied fields and stamps `updated_at`.
    pub async fn update_plan(&self, member_id: &str, plan_id: &str, update: PlanUpdate) -> Result<()> {
        let plan_type = non_blank(update.plan_type.as_deref())
            .map(str::parse::<PlanType>)
            .transpose()?;
        let status = non_blank(update.status.as_deref())
            .map(str::parse::<PlanStatus>)
            .transpose()?;
        if update.total_credits.is_some_and(|total| total < 0) {
            return Err(Error::validation("totalCredits cannot be negative"));
        }
        let name = non_blank(update.name.as_deref());
        let valid_from = to_db_opt(update.valid_from)?;
        let valid_until = to_db_opt(update.valid_until)?;

        ensure_member(&self.conn, member_id).await?;

        let mut stmt = MemberPlanEntity::update_many()
            .col_expr(member_plan::Column::UpdatedAt, Expr::value(now_db()))
            .filter(member_plan::Column::Id.eq(plan_id))
            .filter(member_plan::Column::MemberId.eq(member_id));

        let mut changed = Vec::new();
        if let Some(plan_type) = plan_type {
            stmt = stmt.col_expr(member_plan::Column::PlanType, Expr::value(plan_type));
            changed.push("type");
        }
        if let Some(name) = name {
            stmt = stmt.col_expr(member_plan::Column::Name, Expr::value(name));
            changed.push("name");
        }
        if let Some(total) = update.total_credits {
            stmt = stmt.col_expr(member_plan::Column::TotalCredits, Expr::value(total));
            changed.push("totalCredits");
        }
        if let Some(valid_from) = valid_from {
            stmt = stmt.col_expr(member_plan::Column::ValidFrom, Expr::value(valid_from));
            changed.push("validFrom");
        }
        if let Some(valid_until) = valid_until {
            stmt = stmt.col_expr(member_plan::Column::ValidUntil, Expr::value(valid_until));
            changed.push("validUntil");
        }
        if let Some(status) = status {
            stmt = stmt.col_expr(member_plan::Column::Status, Expr::value(status));
            changed.push("status");
        }

        let written = stmt.exec(&self.conn).await?;
        if written.rows_affected == 0 {
            return Err(plan_not_found(member_id, plan_id));
        }

        info!(member_id, plan_id, fields = ?changed, "plan updated");
        self.record(
            "PLAN_UPDATED",
            plan_id,
            BTreeMap::from([
                ("memberId".to_owned(), member_id.into()),
                ("fields".to_owned(), changed.into()),
            ]),
        );
        Ok(())
    }

    /// Marks every active plan whose `valid_until` has passed as expired, in a
    /// single transaction. Returns how many plans changed.
    pub async fn expire_plans_if_due(&self, member_id: &str) -> Result<u64> {
        let txn = self.conn.begin().await?;
        let now = now_db();

        let due: Vec<String> = MemberPlanEntity::find()
            .filter(member_plan::Column::MemberId.eq(member_id))
            .filter(member_plan::Column::Status.eq(PlanStatus::Active))
            .all(&txn)
            .await?
            .into_iter()
            .filter(|plan| plan.valid_until.is_some_and(|until| until < now))
            .map(|plan| plan.id)
            .collect();

        if due.is_empty() {
            return Ok(0);
        }

        let expired = MemberPlanEntity::update_many()
            .col_expr(member_plan::Column::Status, Expr::value(PlanStatus::Expired))
            .col_expr(member_plan::Column::UpdatedAt, Expr::value(now))
            .filter(member_plan::Column::Id.is_in(due))
            .filter(member_plan::Column::Status.eq(PlanStatus::Active))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        debug!(member_id, expired = expired.rows_affected, "expired plans swept");
        Ok(expired.rows_affected)
    }

    /// Lists a member's plans, oldest first, after sweeping expired ones.
    ///
    /// A failing sweep is logged and does not fail the listing.
    pub async fn list_plans(&self, member_id: &str, status: Option<&str>) -> Result<Vec<Plan>> {
        let status = non_blank(status)
            .map(str::parse::<PlanStatus>)
            .transpose()?;

        ensure_member(&self.conn, member_id).await?;

        if let Err(e) = self.expire_plans_if_due(member_id).await {
            warn!(member_id, error = %e, "failed to expire due plans");
        }

        let mut select = MemberPlanEntity::find().filter(member_plan::Column::MemberId.eq(member_id));
        if let Some(status) = status {
            select = select.filter(member_plan::Column::Status.eq(status));
        }

        select
            .order_by_asc(member_plan::Column::CreatedAt)
            .order_by_asc(member_plan::Column::Id)
            .all(&self.conn)
            .await?
            .into_iter()
            .map(Plan::try_from)
            .collect()
    }

    fn record(&self, action: &str, plan_id: &str, payload: crate::audit::Payload) {
        if let Some(audit) = &self.audit {
            audit.log(NewAuditEntry::new(action, "plan", plan_id, LEDGER_ACTOR).with_payload(payload));
        }
    }
}

fn plan_not_found(member_id: &str, plan_id: &str) -> Error {
    Error::PlanNotFound {
        member_id: member_id.to_owned(),
        plan_id: plan_id.to_owned(),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
