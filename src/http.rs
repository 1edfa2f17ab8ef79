//! JSON-over-HTTP binding for the store operations.
//!
//! Every failure is answered with `{"error": <tag>, "message": <text>}` where
//! `tag` is [`Error::tag`]. Not-found errors map to 404, conflicts to 409,
//! validation to 400. Internal errors map to 500 with a generic message; the
//! details only go to the log.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::error;

use crate::audit::{AuditFilter, DEFAULT_QUERY_LIMIT};
use crate::enrollment::NewSession;
use crate::entity::enrollment::EnrollmentStatus;
use crate::error::{Error, ErrorKind};
use crate::ledger::{NewPlan, PlanUpdate};
use crate::store::KickRollStore;

type ApiResult<T = Json<Value>> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if self.kind() == ErrorKind::Internal {
            error!(error = %self, "request failed");
            "internal error".to_owned()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": self.tag(), "message": message }))).into_response()
    }
}

/// Builds the router with every route bound to `store`.
pub fn router(store: KickRollStore) -> Router {
    Router::new()
        .route("/api/sessions", post(schedule_session).get(list_sessions))
        .route("/api/sessions/{session_id}", get(get_session))
        .route("/api/sessions/{session_id}/enroll", post(enroll))
        .route("/api/sessions/{session_id}/cancel", post(cancel))
        .route("/api/members", post(register_member))
        .route("/api/members/{member_id}/enrollments", get(member_enrollments))
        .route("/api/members/{member_id}/plans", post(create_plan).get(list_plans))
        .route(
            "/api/members/{member_id}/plans/{plan_id}",
            get(get_plan).patch(update_plan),
        )
        .route(
            "/api/members/{member_id}/plans/{plan_id}/adjust",
            post(adjust_credits),
        )
        .route("/api/audit-logs", get(audit_logs))
        .with_state(store)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnrollmentRequest {
    #[serde(default)]
    member_id: String,
}

#[derive(Debug, Deserialize)]
struct RegisterMemberRequest {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdjustCreditsRequest {
    delta: i32,
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StatusQuery {
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditQuery {
    actor_user_id: Option<String>,
    target_type: Option<String>,
    target_id: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    to: Option<OffsetDateTime>,
    limit: Option<u64>,
}

async fn schedule_session(
    State(store): State<KickRollStore>,
    Json(input): Json<NewSession>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let session = store.enrollment.schedule_session(input).await?;
    Ok((StatusCode::CREATED, Json(json!(session))))
}

async fn list_sessions(State(store): State<KickRollStore>) -> ApiResult {
    Ok(Json(json!(store.enrollment.list_sessions().await?)))
}

async fn get_session(
    State(store): State<KickRollStore>,
    Path(session_id): Path<String>,
) -> ApiResult {
    Ok(Json(json!(store.enrollment.get_session(&session_id).await?)))
}

async fn enroll(
    State(store): State<KickRollStore>,
    Path(session_id): Path<String>,
    Json(request): Json<EnrollmentRequest>,
) -> ApiResult {
    let enrollment = store
        .enrollment
        .enroll(&session_id, &request.member_id)
        .await?;
    Ok(Json(json!({ "success": true, "enrollment": enrollment })))
}

async fn cancel(
    State(store): State<KickRollStore>,
    Path(session_id): Path<String>,
    Json(request): Json<EnrollmentRequest>,
) -> ApiResult {
    let enrollment = store
        .enrollment
        .cancel(&session_id, &request.member_id)
        .await?;
    Ok(Json(json!({ "success": true, "enrollment": enrollment })))
}

async fn register_member(
    State(store): State<KickRollStore>,
    Json(request): Json<RegisterMemberRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let member = store.members.register(&request.name).await?;
    Ok((StatusCode::CREATED, Json(json!(member))))
}

async fn member_enrollments(
    State(store): State<KickRollStore>,
    Path(member_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> ApiResult {
    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<EnrollmentStatus>)
        .transpose()?;
    let enrollments = store
        .enrollment
        .list_member_enrollments(&member_id, status)
        .await?;
    Ok(Json(json!(enrollments)))
}

async fn create_plan(
    State(store): State<KickRollStore>,
    Path(member_id): Path<String>,
    Json(input): Json<NewPlan>,
) -> ApiResult {
    let plan = store.ledger.create_plan(&member_id, input).await?;
    Ok(Json(json!({ "success": true, "plan": plan })))
}

async fn list_plans(
    State(store): State<KickRollStore>,
    Path(member_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> ApiResult {
    let plans = store
        .ledger
        .list_plans(&member_id, query.status.as_deref())
        .await?;
    Ok(Json(json!(plans)))
}

async fn get_plan(
    State(store): State<KickRollStore>,
    Path((member_id, plan_id)): Path<(String, String)>,
) -> ApiResult {
    Ok(Json(json!(store.ledger.get_plan(&member_id, &plan_id).await?)))
}

async fn update_plan(
    State(store): State<KickRollStore>,
    Path((member_id, plan_id)): Path<(String, String)>,
    Json(update): Json<PlanUpdate>,
) -> ApiResult {
    store.ledger.update_plan(&member_id, &plan_id, update).await?;
    Ok(Json(
        json!({ "success": true, "message": "Plan updated successfully" }),
    ))
}

async fn adjust_credits(
    State(store): State<KickRollStore>,
    Path((member_id, plan_id)): Path<(String, String)>,
    Json(request): Json<AdjustCreditsRequest>,
) -> ApiResult {
    let adjusted = store
        .ledger
        .adjust_credits(&member_id, &plan_id, request.delta, request.reason.as_deref())
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Credits adjusted successfully",
        "newRemainingCredits": adjusted.remaining_credits,
        "delta": adjusted.delta,
    })))
}

async fn audit_logs(
    State(store): State<KickRollStore>,
    Query(query): Query<AuditQuery>,
) -> ApiResult {
    let filter = AuditFilter {
        actor_user_id: query.actor_user_id,
        target_type: query.target_type,
        target_id: query.target_id,
        from: query.from,
        to: query.to,
    };
    let entries = store
        .audit_log
        .query(&filter, query.limit.unwrap_or(DEFAULT_QUERY_LIMIT))
        .await?;
    Ok(Json(json!(entries)))
}
