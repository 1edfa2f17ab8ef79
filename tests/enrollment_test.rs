//! Integration tests for the enrollment engine using in-memory SQLite.

mod common;

use kickroll_store::entity::class_session;
use kickroll_store::{EnrollmentEngine, EnrollmentStatus, Error, ErrorKind};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

async fn engine() -> EnrollmentEngine {
    EnrollmentEngine::new(common::setup().await)
}

#[tokio::test]
async fn enroll_takes_a_seat() {
    let engine = engine().await;
    let session = common::schedule(&engine, 2).await;

    let result = engine.enroll(&session.session_id, "alice").await.unwrap();

    assert_eq!(result.member_id, "alice");
    assert_eq!(result.session_id, session.session_id);
    assert_eq!(result.status, EnrollmentStatus::Enrolled);

    let session = engine.get_session(&session.session_id).await.unwrap();
    assert_eq!(session.enrolled_count, 1);
}

#[tokio::test]
async fn member_id_is_trimmed_and_required() {
    let engine = engine().await;
    let session = common::schedule(&engine, 2).await;

    let err = engine.enroll(&session.session_id, "   ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let result = engine.enroll(&session.session_id, "  bob ").await.unwrap();
    assert_eq!(result.member_id, "bob");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let engine = engine().await;

    let err = engine.enroll("missing", "alice").await.unwrap_err();
    assert!(matches!(err, Error::SessionNotFound { ref session_id } if session_id == "missing"));

    let err = engine.cancel("missing", "alice").await.unwrap_err();
    assert_eq!(err.tag(), "session_not_found");
}

#[tokio::test]
async fn enrolling_twice_is_rejected_and_counted_once() {
    let engine = engine().await;
    let session = common::schedule(&engine, 5).await;

    engine.enroll(&session.session_id, "alice").await.unwrap();
    let err = engine.enroll(&session.session_id, "alice").await.unwrap_err();

    assert!(matches!(err, Error::AlreadyEnrolled { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let session = engine.get_session(&session.session_id).await.unwrap();
    assert_eq!(session.enrolled_count, 1);
}

#[tokio::test]
async fn cancel_without_enrollment_changes_nothing() {
    let engine = engine().await;
    let session = common::schedule(&engine, 2).await;
    engine.enroll(&session.session_id, "alice").await.unwrap();

    let err = engine.cancel(&session.session_id, "bob").await.unwrap_err();

    assert!(matches!(err, Error::NoActiveEnrollment { .. }));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let session = engine.get_session(&session.session_id).await.unwrap();
    assert_eq!(session.enrolled_count, 1);
}

#[tokio::test]
async fn cancel_keeps_the_original_enrollment_time() {
    let engine = engine().await;
    let session = common::schedule(&engine, 2).await;
    let enrolled = engine.enroll(&session.session_id, "alice").await.unwrap();

    // Stamped at the precision every backend stores, so a read returns it as is.
    assert_eq!(enrolled.created_at.nanosecond() % 1_000, 0);
    let stored = engine.list_member_enrollments("alice", None).await.unwrap();
    assert_eq!(stored[0].created_at, enrolled.created_at);

    let cancelled = engine.cancel(&session.session_id, "alice").await.unwrap();

    assert_eq!(cancelled.status, EnrollmentStatus::Cancelled);
    assert_eq!(cancelled.created_at, enrolled.created_at);
    let session = engine.get_session(&session.session_id).await.unwrap();
    assert_eq!(session.enrolled_count, 0);

    // A second cancel has nothing left to release.
    let err = engine.cancel(&session.session_id, "alice").await.unwrap_err();
    assert!(matches!(err, Error::NoActiveEnrollment { .. }));
}

#[tokio::test]
async fn re_enrolling_after_cancel_takes_a_seat_again() {
    let engine = engine().await;
    let session = common::schedule(&engine, 1).await;

    engine.enroll(&session.session_id, "alice").await.unwrap();
    engine.cancel(&session.session_id, "alice").await.unwrap();

    // The freed seat is available to someone else first.
    engine.enroll(&session.session_id, "bob").await.unwrap();
    let err = engine.enroll(&session.session_id, "alice").await.unwrap_err();
    assert!(matches!(err, Error::CapacityFull { .. }));

    engine.cancel(&session.session_id, "bob").await.unwrap();
    let again = engine.enroll(&session.session_id, "alice").await.unwrap();
    assert_eq!(again.status, EnrollmentStatus::Enrolled);

    let session = engine.get_session(&session.session_id).await.unwrap();
    assert_eq!(session.enrolled_count, 1);
}

#[tokio::test]
async fn cancel_clamps_a_drifted_counter_at_zero() {
    let conn = common::setup().await;
    let engine = EnrollmentEngine::new(conn.clone());
    let session = common::schedule(&engine, 2).await;
    engine.enroll(&session.session_id, "alice").await.unwrap();

    class_session::Entity::update_many()
        .col_expr(class_session::Column::EnrolledCount, Expr::value(0))
        .filter(class_session::Column::Id.eq(session.session_id.as_str()))
        .exec(&conn)
        .await
        .unwrap();

    let cancelled = engine.cancel(&session.session_id, "alice").await.unwrap();

    assert_eq!(cancelled.status, EnrollmentStatus::Cancelled);
    let session = engine.get_session(&session.session_id).await.unwrap();
    assert_eq!(session.enrolled_count, 0);
}

#[tokio::test]
async fn member_enrollments_are_listed_with_their_sessions() {
    let engine = engine().await;
    let morning = common::schedule(&engine, 5).await;
    let evening = common::schedule(&engine, 5).await;

    engine.enroll(&morning.session_id, "alice").await.unwrap();
    engine.enroll(&evening.session_id, "alice").await.unwrap();
    engine.cancel(&morning.session_id, "alice").await.unwrap();
    engine.enroll(&evening.session_id, "bob").await.unwrap();

    let all = engine.list_member_enrollments("alice", None).await.unwrap();
    assert_eq!(all.len(), 2);

    let active = engine
        .list_member_enrollments("alice", Some(EnrollmentStatus::Enrolled))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].session_id, evening.session_id);
    assert_eq!(active[0].session.enrolled_count, 2);
    assert_eq!(active[0].session.location.as_deref(), Some("Main hall"));

    let none = engine.list_member_enrollments("carol", None).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn sessions_are_validated_and_listed_by_start() {
    let engine = engine().await;

    let mut backwards = common::new_session(3);
    backwards.end_at = backwards.start_at - time::Duration::minutes(5);
    let err = engine.schedule_session(backwards).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let mut later = common::new_session(3);
    later.start_at += time::Duration::days(2);
    later.end_at += time::Duration::days(2);
    let later = engine.schedule_session(later).await.unwrap();
    let sooner = common::schedule(&engine, 3).await;

    assert_eq!(sooner.enrolled_count, 0);
    assert_eq!(sooner.coach_ids, vec!["coach-1".to_owned()]);

    let ids: Vec<_> = engine
        .list_sessions()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.session_id)
        .collect();
    assert_eq!(ids, vec![sooner.session_id, later.session_id]);
}
