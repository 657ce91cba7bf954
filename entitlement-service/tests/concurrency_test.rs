//! Concurrency integration tests for entitlement-service.
//!
//! The two operations with a real race to lose: spending the last units of a
//! bounded quota, and creating the one allowed active subscription. Both are
//! repeated across rounds to give interleavings a chance to occur.

mod common;

use common::TestApp;
use entitlement_service::models::{
    features, Ceiling, CreateSubscription, Decision, DenialReason, ProductLine,
};
use service_core::error::AppError;
use uuid::Uuid;

const ROUNDS: usize = 10;

#[tokio::test]
async fn concurrent_authorize_never_allows_more_than_the_ceiling() {
    let app = TestApp::spawn().await;

    let ceiling = 5i64;
    let callers = 25usize;

    let plan = app
        .create_plan(
            ProductLine::Recruiter,
            "Standard",
            4900,
            30,
            vec![(features::CV_VIEW, Ceiling::Bounded(ceiling))],
        )
        .await;
    let plan_id = plan.plan_id;

    for round in 0..ROUNDS {
        let user_id = Uuid::new_v4();
        let subscription = app.subscribe(user_id, plan_id).await;

        let mut handles = Vec::with_capacity(callers);
        for _ in 0..callers {
            let entitlements = app.entitlements.clone();
            handles.push(tokio::spawn(async move {
                entitlements
                    .authorize(user_id, ProductLine::Recruiter, features::CV_VIEW)
                    .await
                    .expect("authorize failed")
            }));
        }

        let decisions: Vec<Decision> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.expect("task panicked"))
            .collect();

        let allowed = decisions.iter().filter(|d| d.is_allowed()).count();
        let denied = decisions
            .iter()
            .filter(|d| d.denial_reason() == Some(DenialReason::QuotaExceeded))
            .count();

        assert_eq!(allowed, ceiling as usize, "round {}", round);
        assert_eq!(denied, callers - ceiling as usize, "round {}", round);

        // The counter itself never overshoots either.
        let usage = app
            .entitlements
            .meter()
            .usage(subscription.subscription_id, features::CV_VIEW)
            .await
            .unwrap();
        assert_eq!(usage, ceiling, "round {}", round);
    }

    app.cleanup().await;
}

#[tokio::test]
async fn concurrent_subscription_creation_has_a_single_winner() {
    let app = TestApp::spawn().await;

    let plan = app
        .create_plan(ProductLine::Recruiter, "Standard", 4900, 30, vec![])
        .await;
    let plan_id = plan.plan_id;

    for round in 0..ROUNDS {
        let user_id = Uuid::new_v4();

        let mut handles = Vec::with_capacity(2);
        for _ in 0..2 {
            let ledger = app.entitlements.ledger().clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .create_subscription(&CreateSubscription {
                        user_id,
                        plan_id,
                        auto_renew: false,
                    })
                    .await
            }));
        }

        let results: Vec<Result<_, AppError>> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.expect("task panicked"))
            .collect();

        let created = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(AppError::Conflict(_))))
            .count();

        assert_eq!(created, 1, "round {}", round);
        assert_eq!(conflicts, 1, "round {}", round);
    }

    app.cleanup().await;
}
