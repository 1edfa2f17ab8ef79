//! Integration tests for the credit ledger using in-memory SQLite.

mod common;

use kickroll_store::{Error, ErrorKind, PlanStatus, PlanType, PlanUpdate};
use time::{Duration, OffsetDateTime};

#[tokio::test]
async fn create_and_get_plan() {
    let store = common::setup_store().await;
    let member_id = common::register(&store, "Mei").await;

    let plan = store
        .ledger
        .create_plan(&member_id, common::credit_pack(10))
        .await
        .unwrap();

    assert_eq!(plan.member_id, member_id);
    assert_eq!(plan.plan_type, PlanType::CreditPack);
    assert_eq!(plan.status, PlanStatus::Active);
    assert_eq!(plan.remaining_credits, 10);
    assert_eq!(plan.created_at, plan.updated_at);

    let fetched = store.ledger.get_plan(&member_id, &plan.id).await.unwrap();
    assert_eq!(fetched, plan);
}

#[tokio::test]
async fn create_plan_validates_before_writing() {
    let store = common::setup_store().await;
    let member_id = common::register(&store, "Mei").await;

    let mut unnamed = common::credit_pack(5);
    unnamed.name = "  ".into();
    let mut unknown_type = common::credit_pack(5);
    unknown_type.plan_type = "punch_card".into();
    let mut negative = common::credit_pack(5);
    negative.remaining_credits = -1;
    let mut bad_status = common::credit_pack(5);
    bad_status.status = Some("paused".into());

    for input in [
        unnamed,
        unknown_type,
        negative,
        bad_status,
        common::time_pass(None),
    ] {
        let err = store.ledger.create_plan(&member_id, input).await.unwrap_err();
        assert_eq!(err.tag(), "validation_failed", "{err}");
    }

    let plans = store.ledger.list_plans(&member_id, None).await.unwrap();
    assert!(plans.is_empty());
}

#[tokio::test]
async fn plans_need_an_existing_member() {
    let store = common::setup_store().await;

    let err = store
        .ledger
        .create_plan("ghost", common::credit_pack(10))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MemberNotFound { ref member_id } if member_id == "ghost"));

    let err = store.ledger.list_plans("ghost", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = store
        .ledger
        .adjust_credits("ghost", "any-plan", -1, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MemberNotFound { .. }));
}

#[tokio::test]
async fn adjustments_never_overdraw() {
    let store = common::setup_store().await;
    let member_id = common::register(&store, "Mei").await;
    let plan = store
        .ledger
        .create_plan(&member_id, common::credit_pack(10))
        .await
        .unwrap();

    let first = store
        .ledger
        .adjust_credits(&member_id, &plan.id, -3, Some("attended"))
        .await
        .unwrap();
    assert_eq!(first.remaining_credits, 7);
    assert_eq!(first.delta, -3);

    let second = store
        .ledger
        .adjust_credits(&member_id, &plan.id, -3, None)
        .await
        .unwrap();
    assert_eq!(second.remaining_credits, 4);

    let err = store
        .ledger
        .adjust_credits(&member_id, &plan.id, -5, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::NegativeCreditsRejected {
            remaining: 4,
            delta: -5,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let plan = store.ledger.get_plan(&member_id, &plan.id).await.unwrap();
    assert_eq!(plan.remaining_credits, 4);
}

#[tokio::test]
async fn top_ups_and_draining_to_zero_are_allowed() {
    let store = common::setup_store().await;
    let member_id = common::register(&store, "Mei").await;
    let plan = store
        .ledger
        .create_plan(&member_id, common::credit_pack(2))
        .await
        .unwrap();

    let drained = store
        .ledger
        .adjust_credits(&member_id, &plan.id, -2, None)
        .await
        .unwrap();
    assert_eq!(drained.remaining_credits, 0);

    let topped = store
        .ledger
        .adjust_credits(&member_id, &plan.id, 5, Some("renewal"))
        .await
        .unwrap();
    assert_eq!(topped.remaining_credits, 5);
}

#[tokio::test]
async fn plans_are_scoped_to_their_member() {
    let store = common::setup_store().await;
    let owner = common::register(&store, "Mei").await;
    let other = common::register(&store, "Ren").await;
    let plan = store
        .ledger
        .create_plan(&owner, common::credit_pack(3))
        .await
        .unwrap();

    let err = store.ledger.get_plan(&other, &plan.id).await.unwrap_err();
    assert_eq!(err.tag(), "plan_not_found");

    let err = store
        .ledger
        .adjust_credits(&other, &plan.id, -1, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PlanNotFound { .. }));

    let err = store
        .ledger
        .update_plan(&other, &plan.id, PlanUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::PlanNotFound { .. }));
}

#[tokio::test]
async fn update_writes_only_supplied_fields() {
    let store = common::setup_store().await;
    let member_id = common::register(&store, "Mei").await;
    let plan = store
        .ledger
        .create_plan(&member_id, common::credit_pack(8))
        .await
        .unwrap();

    store
        .ledger
        .update_plan(
            &member_id,
            &plan.id,
            PlanUpdate {
                name: Some("Eight classes".into()),
                status: Some("suspended".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let updated = store.ledger.get_plan(&member_id, &plan.id).await.unwrap();
    assert_eq!(updated.name, "Eight classes");
    assert_eq!(updated.status, PlanStatus::Suspended);
    assert_eq!(updated.total_credits, Some(8));
    assert_eq!(updated.remaining_credits, 8);
    assert!(updated.updated_at >= plan.updated_at);
}

#[tokio::test]
async fn invalid_update_is_rejected_without_writing() {
    let store = common::setup_store().await;
    let member_id = common::register(&store, "Mei").await;
    let plan = store
        .ledger
        .create_plan(&member_id, common::credit_pack(8))
        .await
        .unwrap();

    let err = store
        .ledger
        .update_plan(
            &member_id,
            &plan.id,
            PlanUpdate {
                name: Some("Renamed".into()),
                status: Some("frozen".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let unchanged = store.ledger.get_plan(&member_id, &plan.id).await.unwrap();
    assert_eq!(unchanged, plan);
}

#[tokio::test]
async fn listing_expires_lapsed_plans() {
    let store = common::setup_store().await;
    let member_id = common::register(&store, "Mei").await;
    let now = OffsetDateTime::now_utc();

    let lapsed = store
        .ledger
        .create_plan(&member_id, common::time_pass(Some(now - Duration::days(1))))
        .await
        .unwrap();
    let current = store
        .ledger
        .create_plan(&member_id, common::time_pass(Some(now + Duration::days(30))))
        .await
        .unwrap();
    let pack = store
        .ledger
        .create_plan(&member_id, common::credit_pack(5))
        .await
        .unwrap();
    assert_eq!(lapsed.status, PlanStatus::Active);

    let plans = store.ledger.list_plans(&member_id, None).await.unwrap();
    let ids: Vec<_> = plans.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec![lapsed.id.as_str(), current.id.as_str(), pack.id.as_str()]);
    assert_eq!(plans[0].status, PlanStatus::Expired);
    assert_eq!(plans[1].status, PlanStatus::Active);
    assert_eq!(plans[2].status, PlanStatus::Active);

    let active = store
        .ledger
        .list_plans(&member_id, Some("active"))
        .await
        .unwrap();
    assert_eq!(active.len(), 2);

    let expired = store
        .ledger
        .list_plans(&member_id, Some("expired"))
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].id, lapsed.id);

    // Nothing left to sweep.
    assert_eq!(store.ledger.expire_plans_if_due(&member_id).await.unwrap(), 0);
}

#[tokio::test]
async fn sweep_reports_how_many_plans_expired() {
    let store = common::setup_store().await;
    let member_id = common::register(&store, "Mei").await;
    let yesterday = OffsetDateTime::now_utc() - Duration::days(1);

    for _ in 0..2 {
        store
            .ledger
            .create_plan(&member_id, common::time_pass(Some(yesterday)))
            .await
            .unwrap();
    }

    assert_eq!(store.ledger.expire_plans_if_due(&member_id).await.unwrap(), 2);
    assert_eq!(store.ledger.expire_plans_if_due(&member_id).await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_status_filter_is_rejected() {
    let store = common::setup_store().await;
    let member_id = common::register(&store, "Mei").await;

    let err = store
        .ledger
        .list_plans(&member_id, Some("archived"))
        .await
        .unwrap_err();
    assert_eq!(err.tag(), "validation_failed");

    // Blank filters mean no filter.
    assert!(store
        .ledger
        .list_plans(&member_id, Some(" "))
        .await
        .unwrap()
        .is_empty());
}
