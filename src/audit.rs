//! Best-effort audit trail.
//!
//! State-changing operations hand an entry to [`AuditTrail::log`], which only
//! enqueues it on a bounded channel. A background worker drains the queue into
//! an [`AuditSink`]. Neither a full queue nor a failing sink is ever reported to
//! the caller of the primary operation; both are logged and the entry dropped.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::entity::audit_log::{self, ActiveModel as AuditLogActiveModel, Entity as AuditLogEntity};
use crate::error::{Error, Result};
use crate::timestamp::{from_db, now_db, to_db};

/// Opaque key-value payload attached to an entry.
pub type Payload = BTreeMap<String, serde_json::Value>;

/// Default number of entries returned by [`SeaOrmAuditLog::query`].
pub const DEFAULT_QUERY_LIMIT: u64 = 100;
const MAX_QUERY_LIMIT: u64 = 1000;

/// An entry waiting to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub actor_user_id: String,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub payload: Option<Payload>,
    pub ip: Option<String>,
}

impl NewAuditEntry {
    pub fn new(
        action: impl Into<String>,
        target_type: impl Into<String>,
        target_id: impl Into<String>,
        actor_user_id: impl Into<String>,
    ) -> Self {
        Self {
            actor_user_id: actor_user_id.into(),
            action: action.into(),
            target_type: target_type.into(),
            target_id: target_id.into(),
            payload: None,
            ip: None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip = ip;
        self
    }
}

/// A stored entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub log_id: String,
    pub actor_user_id: String,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub payload: Option<Payload>,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    pub ip: Option<String>,
}

/// Filters for [`SeaOrmAuditLog::query`]. Empty strings are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilter {
    pub actor_user_id: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub to: Option<OffsetDateTime>,
}

/// Destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    async fn append(&self, entry: NewAuditEntry) -> Result<()>;
}

/// Audit sink backed by the `audit_logs` table.
#[derive(Debug, Clone)]
pub struct SeaOrmAuditLog {
    conn: DatabaseConnection,
}

impl SeaOrmAuditLog {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Lists entries newest first, ties broken by id so pages are stable.
    ///
    /// `limit` is clamped to `1..=1000`. A window whose `from` is after its
    /// `to` is rejected rather than answered with an empty page.
    pub async fn query(&self, filter: &AuditFilter, limit: u64) -> Result<Vec<AuditEntry>> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(Error::validation("from must not be after to"));
            }
        }

        let mut select = AuditLogEntity::find();

        if let Some(actor) = non_empty(&filter.actor_user_id) {
            select = select.filter(audit_log::Column::ActorUserId.eq(actor));
        }
        if let Some(target_type) = non_empty(&filter.target_type) {
            select = select.filter(audit_log::Column::TargetType.eq(target_type));
        }
        if let Some(target_id) = non_empty(&filter.target_id) {
            select = select.filter(audit_log::Column::TargetId.eq(target_id));
        }
        if let Some(from) = filter.from {
            select = select.filter(audit_log::Column::At.gte(to_db(from)?));
        }
        if let Some(to) = filter.to {
            select = select.filter(audit_log::Column::At.lte(to_db(to)?));
        }

        let rows = select
            .order_by_desc(audit_log::Column::At)
            .order_by_desc(audit_log::Column::Id)
            .limit(limit.clamp(1, MAX_QUERY_LIMIT))
            .all(&self.conn)
            .await?;

        rows.into_iter().map(entry_from_model).collect()
    }
}

#[async_trait]
impl AuditSink for SeaOrmAuditLog {
    async fn append(&self, entry: NewAuditEntry) -> Result<()> {
        let payload = entry
            .payload
            .as_ref()
            .map(rmp_serde::to_vec_named)
            .transpose()
            .map_err(|e| Error::Encode(e.to_string()))?;

        AuditLogActiveModel {
            id: Set(crate::new_id()),
            actor_user_id: Set(entry.actor_user_id),
            action: Set(entry.action),
            target_type: Set(entry.target_type),
            target_id: Set(entry.target_id),
            payload: Set(payload),
            at: Set(now_db()),
            ip: Set(entry.ip),
        }
        .insert(&self.conn)
        .await?;

        Ok(())
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_owned)
}

fn entry_from_model(model: audit_log::Model) -> Result<AuditEntry> {
    let payload = model
        .payload
        .as_deref()
        .map(|bytes| rmp_serde::from_slice::<Payload>(bytes))
        .transpose()
        .map_err(|e| Error::Decode(e.to_string()))?;

    Ok(AuditEntry {
        log_id: model.id,
        actor_user_id: model.actor_user_id,
        action: model.action,
        target_type: model.target_type,
        target_id: model.target_id,
        payload,
        at: from_db(model.at)?,
        ip: model.ip,
    })
}

/// Fire-and-forget handle onto the audit queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    tx: mpsc::Sender<NewAuditEntry>,
}

/// The background task draining an [`AuditTrail`]'s queue.
///
/// The task ends once every `AuditTrail` clone has been dropped and the queue
/// is empty.
#[derive(Debug)]
pub struct AuditWorker {
    handle: JoinHandle<()>,
}

impl AuditTrail {
    /// Starts the worker on the current tokio runtime.
    pub fn spawn(sink: Arc<dyn AuditSink>, queue_capacity: usize) -> (Self, AuditWorker) {
        let (tx, mut rx) = mpsc::channel::<NewAuditEntry>(queue_capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let action = entry.action.clone();
                let target = format!("{}/{}", entry.target_type, entry.target_id);
                let actor = entry.actor_user_id.clone();

                match sink.append(entry).await {
                    Ok(()) => info!(%action, %target, %actor, "audit log created"),
                    Err(e) => error!(%action, %target, error = %e, "failed to create audit log"),
                }
            }
            debug!("audit queue closed");
        });

        (Self { tx }, AuditWorker { handle })
    }

    /// Enqueues an entry without waiting. Never fails.
    pub fn log(&self, entry: NewAuditEntry) {
        match self.tx.try_send(entry) {
            Ok(()) => {}
            Err(TrySendError::Full(entry)) => {
                warn!(action = %entry.action, "audit queue full, dropping entry");
            }
            Err(TrySendError::Closed(entry)) => {
                warn!(action = %entry.action, "audit worker stopped, dropping entry");
            }
        }
    }
}

impl AuditWorker {
    /// Waits for the queue to drain. Call after dropping every `AuditTrail`.
    pub async fn finish(self) {
        if let Err(e) = self.handle.await {
            error!(error = %e, "audit worker panicked");
        }
    }
}
