//! Shared fixtures for the integration tests: an in-memory SQLite database with
//! the schema applied, plus small builders for sessions, members and plans.

#![allow(dead_code)]

use kickroll_store::{EnrollmentEngine, KickRollStore, NewPlan, NewSession, RetryPolicy, Session};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tempfile::TempDir;
use time::{Duration, OffsetDateTime};

/// Helper: spin up in-memory SQLite and run migrations.
///
/// Every SQLite `:memory:` connection is its own database, so the pool is
/// pinned to a single connection.
pub async fn setup() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let conn = Database::connect(opt).await.unwrap();
    kickroll_store::migrate(&conn).await.unwrap();
    conn
}

/// Helper: file-backed SQLite behind a pool of `connections`, so concurrent
/// calls hold overlapping transactions. The database lives as long as the
/// returned `TempDir`.
pub async fn setup_pooled(connections: u32) -> (DatabaseConnection, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("kickroll.db").display()
    );

    let mut opt = ConnectOptions::new(url);
    opt.max_connections(connections)
        .min_connections(1)
        .sqlx_logging(false);

    let conn = Database::connect(opt).await.unwrap();
    kickroll_store::migrate(&conn).await.unwrap();
    (conn, dir)
}

/// Enough attempts for a dozen writers queued on one SQLite file.
pub fn patient_retry() -> RetryPolicy {
    RetryPolicy::new(30, std::time::Duration::from_millis(2))
}

pub async fn setup_store() -> KickRollStore {
    KickRollStore::new(setup().await)
}

pub fn new_session(capacity: u32) -> NewSession {
    let start_at = OffsetDateTime::now_utc() + Duration::days(1);
    NewSession {
        team_id: Some("team-1".into()),
        coach_ids: vec!["coach-1".into()],
        start_at,
        end_at: start_at + Duration::hours(1),
        location: Some("Main hall".into()),
        capacity,
    }
}

pub async fn schedule(engine: &EnrollmentEngine, capacity: u32) -> Session {
    engine.schedule_session(new_session(capacity)).await.unwrap()
}

pub async fn register(store: &KickRollStore, name: &str) -> String {
    store.members.register(name).await.unwrap().member_id
}

pub fn credit_pack(credits: i32) -> NewPlan {
    NewPlan {
        plan_type: "credit_pack".into(),
        name: format!("{credits} classes"),
        total_credits: Some(credits),
        remaining_credits: credits,
        valid_from: None,
        valid_until: None,
        status: None,
    }
}

pub fn time_pass(valid_until: Option<OffsetDateTime>) -> NewPlan {
    NewPlan {
        plan_type: "time_pass".into(),
        name: "Monthly pass".into(),
        total_credits: None,
        remaining_credits: 0,
        valid_from: Some(OffsetDateTime::now_utc() - Duration::days(30)),
        valid_until,
        status: None,
    }
}
