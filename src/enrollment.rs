//! Capacity-gated enrollment engine.
//!
//! Owns two invariants:
//!
//! - a session's `enrolled_count` never exceeds its `capacity`;
//! - each `(session, member)` pair moves into `enrolled` at most once per
//!   transition, and the counter moves with it in the same transaction.
//!
//! Enroll and cancel run as one Sea-ORM transaction per attempt under the
//! [`RetryPolicy`]. Both counter writes are atomic SQL increments guarded in
//! their `WHERE` clause, so two members racing for the last seat can never
//! both commit: the loser's guard matches no row, its attempt rolls back, and
//! the retry re-reads the committed state and reports [`Error::CapacityFull`].

use std::collections::BTreeMap;

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::audit::{AuditTrail, NewAuditEntry};
use crate::entity::class_session::{
    self, ActiveModel as ClassSessionActiveModel, Entity as ClassSessionEntity, SessionStatus,
};
use crate::entity::enrollment::{
    self, ActiveModel as EnrollmentActiveModel, Entity as EnrollmentEntity, EnrollmentStatus,
};
use crate::error::{Error, Result};
use crate::retry::{is_unique_violation, Abort, RetryPolicy};
use crate::timestamp::{from_db, now_db, to_db};

/// Outcome of a successful enroll or cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentResult {
    pub member_id: String,
    pub session_id: String,
    pub status: EnrollmentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Input for [`EnrollmentEngine::schedule_session`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub team_id: Option<String>,
    #[serde(default)]
    pub coach_ids: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_at: OffsetDateTime,
    pub location: Option<String>,
    pub capacity: u32,
}

/// A class session as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub team_id: Option<String>,
    pub coach_ids: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_at: OffsetDateTime,
    pub location: Option<String>,
    pub capacity: i32,
    pub enrolled_count: i32,
    pub status: SessionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl TryFrom<class_session::Model> for Session {
    type Error = Error;

    fn try_from(model: class_session::Model) -> Result<Self> {
        let coach_ids = serde_json::from_value(model.coach_ids)
            .map_err(|e| Error::Decode(format!("coach_ids of session {}: {e}", model.id)))?;

        Ok(Self {
            session_id: model.id,
            team_id: model.team_id,
            coach_ids,
            start_at: from_db(model.start_at)?,
            end_at: from_db(model.end_at)?,
            location: model.location,
            capacity: model.capacity,
            enrolled_count: model.enrolled_count,
            status: model.status,
            created_at: from_db(model.created_at)?,
        })
    }
}

/// One of a member's enrollments together with its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberEnrollment {
    pub session_id: String,
    pub status: EnrollmentStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub session: Session,
}

/// Enrollment engine over a Sea-ORM connection.
#[derive(Debug, Clone)]
pub struct EnrollmentEngine {
    conn: DatabaseConnection,
    retry: RetryPolicy,
    audit: Option<AuditTrail>,
}

impl EnrollmentEngine {
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

    /// Emits `ENROLLED` / `ENROLLMENT_CANCELLED` after each successful commit.
    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Creates a session with no enrollments.
    pub async fn schedule_session(&self, input: NewSession) -> Result<Session> {
        if input.end_at < input.start_at {
            return Err(Error::validation("session end must not precede its start"));
        }
        let capacity = i32::try_from(input.capacity)
            .map_err(|_| Error::validation("capacity is too large"))?;
        let coach_ids =
            serde_json::to_value(&input.coach_ids).map_err(|e| Error::Encode(e.to_string()))?;

        let model = ClassSessionActiveModel {
            id: Set(crate::new_id()),
            team_id: Set(input.team_id),
            coach_ids: Set(coach_ids),
            start_at: Set(to_db(input.start_at)?),
            end_at: Set(to_db(input.end_at)?),
            location: Set(input.location),
            capacity: Set(capacity),
            enrolled_count: Set(0),
            status: Set(SessionStatus::Scheduled),
            created_at: Set(now_db()),
        }
        .insert(&self.conn)
        .await?;

        info!(session_id = %model.id, capacity, "session scheduled");
        model.try_into()
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Session> {
        ClassSessionEntity::find_by_id(session_id.to_owned())
            .one(&self.conn)
            .await?
            .ok_or_else(|| Error::SessionNotFound {
                session_id: session_id.to_owned(),
            })?
            .try_into()
    }

    /// All sessions ordered by start time.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        ClassSessionEntity::find()
            .order_by_asc(class_session::Column::StartAt)
            .all(&self.conn)
            .await?
            .into_iter()
            .map(Session::try_from)
            .collect()
    }

    /// Takes a seat in `session_id` for `member_id`.
    ///
    /// Fails with [`Error::CapacityFull`] when no seat is left and with
    /// [`Error::AlreadyEnrolled`] when the member already holds one. A member
    /// who cancelled earlier may enroll again; the counter then moves once
    /// more and `created_at` is restamped.
    pub async fn enroll(&self, session_id: &str, member_id: &str) -> Result<EnrollmentResult> {
        let member_id = member_id.trim();
        if member_id.is_empty() {
            return Err(Error::validation("memberId is required"));
        }

        let result = self
            .retry
            .run("enroll", move || self.try_enroll(session_id, member_id))
            .await?;

        info!(session_id, member_id, "member enrolled");
        self.record("ENROLLED", &result);
        Ok(result)
    }

    async fn try_enroll(
        &self,
        session_id: &str,
        member_id: &str,
    ) -> std::result::Result<EnrollmentResult, Abort> {
        let txn = self.conn.begin().await?;

        let session = ClassSessionEntity::find_by_id(session_id.to_owned())
            .one(&txn)
            .await?
            .ok_or_else(|| Error::SessionNotFound {
                session_id: session_id.to_owned(),
            })?;

        if session.enrolled_count >= session.capacity {
            return Err(Error::CapacityFull {
                session_id: session_id.to_owned(),
                capacity: session.capacity,
            }
            .into());
        }

        let existing = EnrollmentEntity::find_by_id((session_id.to_owned(), member_id.to_owned()))
            .one(&txn)
            .await?;

        let now = now_db();
        match existing {
            Some(row) if row.status == EnrollmentStatus::Enrolled => {
                return Err(Error::AlreadyEnrolled {
                    session_id: session_id.to_owned(),
                    member_id: member_id.to_owned(),
                }
                .into());
            }
            Some(_) => {
                let flipped = EnrollmentEntity::update_many()
                    .col_expr(
                        enrollment::Column::Status,
                        Expr::value(EnrollmentStatus::Enrolled),
                    )
                    .col_expr(enrollment::Column::CreatedAt, Expr::value(now))
                    .filter(enrollment::Column::SessionId.eq(session_id))
                    .filter(enrollment::Column::MemberId.eq(member_id))
                    .filter(enrollment::Column::Status.eq(EnrollmentStatus::Cancelled))
                    .exec(&txn)
                    .await?;
                if flipped.rows_affected == 0 {
                    return Err(Abort::Contended("enrollment status"));
                }
            }
            None => {
                let inserted = EnrollmentActiveModel {
                    session_id: Set(session_id.to_owned()),
                    member_id: Set(member_id.to_owned()),
                    status: Set(EnrollmentStatus::Enrolled),
                    created_at: Set(now),
                }
                .insert(&txn)
                .await;
                match inserted {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => {
                        return Err(Abort::Contended("enrollment key"));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        // Exactly one increment per transition into `enrolled`.
        let taken = ClassSessionEntity::update_many()
            .col_expr(
                class_session::Column::EnrolledCount,
                Expr::col(class_session::Column::EnrolledCount).add(1),
            )
            .filter(class_session::Column::Id.eq(session_id))
            .filter(
                Expr::col(class_session::Column::EnrolledCount)
                    .lt(Expr::col(class_session::Column::Capacity)),
            )
            .exec(&txn)
            .await?;
        if taken.rows_affected == 0 {
            return Err(Abort::Contended("session capacity"));
        }

        txn.commit().await?;

        Ok(EnrollmentResult {
            member_id: member_id.to_owned(),
            session_id: session_id.to_owned(),
            status: EnrollmentStatus::Enrolled,
            created_at: from_db(now)?,
        })
    }

    /// Gives up a seat. The enrollment row is kept with status `cancelled`
    /// and the result carries its original `created_at`.
    pub async fn cancel(&self, session_id: &str, member_id: &str) -> Result<EnrollmentResult> {
        let member_id = member_id.trim();
        if member_id.is_empty() {
            return Err(Error::validation("memberId is required"));
        }

        let result = self
            .retry
            .run("cancel", move || self.try_cancel(session_id, member_id))
            .await?;

        info!(session_id, member_id, "enrollment cancelled");
        self.record("ENROLLMENT_CANCELLED", &result);
        Ok(result)
    }

    async fn try_cancel(
        &self,
        session_id: &str,
        member_id: &str,
    ) -> std::result::Result<EnrollmentResult, Abort> {
        let txn = self.conn.begin().await?;

        ClassSessionEntity::find_by_id(session_id.to_owned())
            .one(&txn)
            .await?
            .ok_or_else(|| Error::SessionNotFound {
                session_id: session_id.to_owned(),
            })?;

        let active = EnrollmentEntity::find_by_id((session_id.to_owned(), member_id.to_owned()))
            .one(&txn)
            .await?
            .filter(|row| row.status == EnrollmentStatus::Enrolled)
            .ok_or_else(|| Error::NoActiveEnrollment {
                session_id: session_id.to_owned(),
                member_id: member_id.to_owned(),
            })?;

        let flipped = EnrollmentEntity::update_many()
            .col_expr(
                enrollment::Column::Status,
                Expr::value(EnrollmentStatus::Cancelled),
            )
            .filter(enrollment::Column::SessionId.eq(session_id))
            .filter(enrollment::Column::MemberId.eq(member_id))
            .filter(enrollment::Column::Status.eq(EnrollmentStatus::Enrolled))
            .exec(&txn)
            .await?;
        if flipped.rows_affected == 0 {
            return Err(Abort::Contended("enrollment status"));
        }

        let released = ClassSessionEntity::update_many()
            .col_expr(
                class_session::Column::EnrolledCount,
                Expr::col(class_session::Column::EnrolledCount).sub(1),
            )
            .filter(class_session::Column::Id.eq(session_id))
            .filter(class_session::Column::EnrolledCount.gt(0))
            .exec(&txn)
            .await?;
        if released.rows_affected == 0 {
            // The counter had drifted to zero while a seat was still held.
            warn!(session_id, member_id, "enrolled_count already zero, clamped");
        }

        txn.commit().await?;

        Ok(EnrollmentResult {
            member_id: member_id.to_owned(),
            session_id: session_id.to_owned(),
            status: EnrollmentStatus::Cancelled,
            created_at: from_db(active.created_at)?,
        })
    }

    /// A member's enrollments, newest first, optionally filtered by status.
    pub async fn list_member_enrollments(
        &self,
        member_id: &str,
        status: Option<EnrollmentStatus>,
    ) -> Result<Vec<MemberEnrollment>> {
        let mut select = EnrollmentEntity::find().filter(enrollment::Column::MemberId.eq(member_id));
        if let Some(status) = status {
            select = select.filter(enrollment::Column::Status.eq(status));
        }

        let rows = select
            .order_by_desc(enrollment::Column::CreatedAt)
            .find_also_related(ClassSessionEntity)
            .all(&self.conn)
            .await?;

        let mut enrollments = Vec::with_capacity(rows.len());
        for (row, session) in rows {
            let Some(session) = session else {
                warn!(session_id = %row.session_id, member_id, "enrollment without session");
                continue;
            };
            enrollments.push(MemberEnrollment {
                session_id: row.session_id,
                status: row.status,
                created_at: from_db(row.created_at)?,
                session: session.try_into()?,
            });
        }
        Ok(enrollments)
    }

    fn record(&self, action: &str, result: &EnrollmentResult) {
        let Some(audit) = &self.audit else {
            return;
        };

        let payload = BTreeMap::from([
            ("memberId".to_owned(), result.member_id.clone().into()),
            (
                "status".to_owned(),
                serde_json::to_value(result.status).unwrap_or_default(),
            ),
        ]);
        audit.log(
            NewAuditEntry::new(action, "session", &result.session_id, &result.member_id)
                .with_payload(payload),
        );
    }
}
