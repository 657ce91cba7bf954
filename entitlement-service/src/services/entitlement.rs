//! Entitlement evaluator - the single path metered features are consumed
//! through.

use crate::models::{Ceiling, Decision, DenialReason, ProductLine, Remaining};
use crate::services::catalog::PlanCatalog;
use crate::services::database::Database;
use crate::services::ledger::SubscriptionLedger;
use crate::services::meter::UsageMeter;
use crate::services::metrics::record_decision;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Authorizes and meters one feature use per call.
///
/// Checking the quota and spending from it happen in one atomic counter
/// update, so two racing calls for the last unit cannot both be allowed.
/// The authenticated user id is always threaded in by the caller; nothing
/// here reaches for ambient identity.
#[derive(Clone)]
pub struct EntitlementService {
    catalog: PlanCatalog,
    ledger: SubscriptionLedger,
    meter: UsageMeter,
}

impl EntitlementService {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            catalog: PlanCatalog::new(db.clone()),
            ledger: SubscriptionLedger::new(db.clone()),
            meter: UsageMeter::new(db),
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &SubscriptionLedger {
        &self.ledger
    }

    pub fn meter(&self) -> &UsageMeter {
        &self.meter
    }

    /// Authorize one use of `feature` for `user_id` and, when allowed, spend
    /// one unit of quota.
    #[instrument(skip(self), fields(user_id = %user_id, feature = feature))]
    pub async fn authorize(
        &self,
        user_id: Uuid,
        product_line: ProductLine,
        feature: &str,
    ) -> Result<Decision, AppError> {
        let Some(subscription) = self
            .ledger
            .get_active_subscription(user_id, product_line)
            .await?
        else {
            record_decision(product_line.as_str(), feature, "no_active_subscription");
            return Ok(Decision::Denied {
                reason: DenialReason::NoActiveSubscription,
            });
        };

        // The subscription's own plan governs it even if the catalog entry
        // has since been withdrawn from sale.
        let plan = self.catalog.get_plan(subscription.plan_id).await?;
        let ceilings = self.catalog.plan_ceilings(plan.plan_id).await?;

        // A feature the plan does not mention is not granted: ceiling 0,
        // never unlimited.
        let ceiling = ceilings.get(feature).copied().unwrap_or(Ceiling::Bounded(0));

        let decision = match self
            .meter
            .charge(subscription.subscription_id, feature, ceiling)
            .await?
        {
            Some(new_count) => {
                let remaining = match ceiling {
                    Ceiling::Unlimited => Remaining::Unlimited,
                    Ceiling::Bounded(limit) => Remaining::Count(limit - new_count),
                };
                Decision::Allowed { remaining }
            }
            None => Decision::Denied {
                reason: DenialReason::QuotaExceeded,
            },
        };

        let outcome = match decision {
            Decision::Allowed { .. } => "allowed",
            Decision::Denied { .. } => "quota_exceeded",
        };
        record_decision(product_line.as_str(), feature, outcome);

        Ok(decision)
    }

    /// How much quota is left, without spending any.
    ///
    /// Used by "N views left" style banners. Returns `None` when the user
    /// has no live subscription for the product line.
    #[instrument(skip(self), fields(user_id = %user_id, feature = feature))]
    pub async fn remaining_quota(
        &self,
        user_id: Uuid,
        product_line: ProductLine,
        feature: &str,
    ) -> Result<Option<Remaining>, AppError> {
        let Some(subscription) = self
            .ledger
            .get_active_subscription(user_id, product_line)
            .await?
        else {
            return Ok(None);
        };

        let plan = self.catalog.get_plan(subscription.plan_id).await?;
        let ceilings = self.catalog.plan_ceilings(plan.plan_id).await?;

        let remaining = match ceilings.get(feature).copied().unwrap_or(Ceiling::Bounded(0)) {
            Ceiling::Unlimited => Remaining::Unlimited,
            Ceiling::Bounded(limit) => {
                let used = self
                    .meter
                    .usage(subscription.subscription_id, feature)
                    .await?;
                Remaining::Count((limit - used).max(0))
            }
        };

        Ok(Some(remaining))
    }
}
