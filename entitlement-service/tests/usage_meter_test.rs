//! Usage meter integration tests for entitlement-service.

mod common;

use common::TestApp;
use entitlement_service::models::{features, Ceiling, ProductLine};
use uuid::Uuid;

#[tokio::test]
async fn usage_defaults_to_zero_without_a_counter_row() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    let plan = app
        .create_plan(ProductLine::Recruiter, "Standard", 4900, 30, vec![])
        .await;
    let subscription = app.subscribe(user_id, plan.plan_id).await;

    let usage = app
        .entitlements
        .meter()
        .usage(subscription.subscription_id, "never_spent")
        .await
        .unwrap();

    assert_eq!(usage, 0);

    app.cleanup().await;
}

#[tokio::test]
async fn unlimited_charge_returns_increasing_counts() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    let plan = app
        .create_plan(
            ProductLine::Recruiter,
            "Premium",
            14900,
            30,
            vec![(features::JOB_POSTING, Ceiling::Unlimited)],
        )
        .await;
    let subscription = app.subscribe(user_id, plan.plan_id).await;

    for expected in 1..=10 {
        let count = app
            .entitlements
            .meter()
            .charge(
                subscription.subscription_id,
                features::JOB_POSTING,
                Ceiling::Unlimited,
            )
            .await
            .unwrap();
        assert_eq!(count, Some(expected));
    }

    app.cleanup().await;
}

#[tokio::test]
async fn bounded_charge_stops_exactly_at_the_ceiling() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    let plan = app
        .create_plan(
            ProductLine::Recruiter,
            "Standard",
            4900,
            30,
            vec![(features::CV_VIEW, Ceiling::Bounded(3))],
        )
        .await;
    let subscription = app.subscribe(user_id, plan.plan_id).await;
    let meter = app.entitlements.meter();

    for expected in 1..=3 {
        let count = meter
            .charge(
                subscription.subscription_id,
                features::CV_VIEW,
                Ceiling::Bounded(3),
            )
            .await
            .unwrap();
        assert_eq!(count, Some(expected));
    }

    // The fourth spend is refused and the counter does not move.
    let refused = meter
        .charge(
            subscription.subscription_id,
            features::CV_VIEW,
            Ceiling::Bounded(3),
        )
        .await
        .unwrap();
    assert_eq!(refused, None);
    assert_eq!(
        meter
            .usage(subscription.subscription_id, features::CV_VIEW)
            .await
            .unwrap(),
        3
    );

    app.cleanup().await;
}

#[tokio::test]
async fn zero_ceiling_never_spends() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    let plan = app
        .create_plan(ProductLine::Recruiter, "Standard", 4900, 30, vec![])
        .await;
    let subscription = app.subscribe(user_id, plan.plan_id).await;
    let meter = app.entitlements.meter();

    let refused = meter
        .charge(
            subscription.subscription_id,
            features::CV_VIEW,
            Ceiling::Bounded(0),
        )
        .await
        .unwrap();

    assert_eq!(refused, None);
    assert_eq!(
        meter
            .usage(subscription.subscription_id, features::CV_VIEW)
            .await
            .unwrap(),
        0
    );

    app.cleanup().await;
}

#[tokio::test]
async fn counters_are_listed_per_subscription() {
    let app = TestApp::spawn().await;
    let user_id = Uuid::new_v4();

    let plan = app
        .create_plan(
            ProductLine::Recruiter,
            "Standard",
            4900,
            30,
            vec![
                (features::CV_VIEW, Ceiling::Bounded(5)),
                (features::JOB_POSTING, Ceiling::Unlimited),
            ],
        )
        .await;
    let subscription = app.subscribe(user_id, plan.plan_id).await;
    let meter = app.entitlements.meter();

    meter
        .charge(
            subscription.subscription_id,
            features::CV_VIEW,
            Ceiling::Bounded(5),
        )
        .await
        .unwrap();

    let counters = meter.counters(subscription.subscription_id).await.unwrap();
    assert_eq!(counters.len(), 2);
    assert_eq!(counters[0].feature, features::CV_VIEW);
    assert_eq!(counters[0].count, 1);
    assert_eq!(counters[1].feature, features::JOB_POSTING);
    assert_eq!(counters[1].count, 0);

    app.cleanup().await;
}
