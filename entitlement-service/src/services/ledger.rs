//! Subscription ledger - who holds which plan, for what validity window.

use crate::models::{CreateSubscription, ProductLine, Subscription};
use crate::services::database::Database;
use crate::services::metrics::record_subscription_operation;
use chrono::{Duration, Utc};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Ledger of subscriptions.
///
/// Every "is this subscription still live" question is answered here, and
/// only here: expiry is observed lazily against the clock on each read, not
/// by a background sweep.
#[derive(Clone)]
pub struct SubscriptionLedger {
    db: Arc<Database>,
}

impl SubscriptionLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The user's live subscription for a product line, if any.
    ///
    /// A stored `active` row whose window has closed is reported as absent.
    /// The expired status is also written back for readers of raw rows, but
    /// the answer does not depend on that write succeeding.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_active_subscription(
        &self,
        user_id: Uuid,
        product_line: ProductLine,
    ) -> Result<Option<Subscription>, AppError> {
        let Some(subscription) = self
            .db
            .find_active_subscription(user_id, product_line)
            .await?
        else {
            return Ok(None);
        };

        if subscription.has_ended(Utc::now()) {
            if let Err(e) = self
                .db
                .mark_subscription_expired(subscription.subscription_id)
                .await
            {
                warn!(
                    subscription_id = %subscription.subscription_id,
                    error = %e,
                    "Failed to write back expired status"
                );
            }
            return Ok(None);
        }

        Ok(Some(subscription))
    }

    /// Subscribe a user to a plan. The validity window starts now and runs
    /// for the plan's validity period; usage counters start at zero.
    ///
    /// Fails with `Conflict` when the user already holds a live subscription
    /// for the plan's product line, and with `BadRequest` when the plan has
    /// been withdrawn from sale.
    #[instrument(skip(self, input), fields(user_id = %input.user_id, plan_id = %input.plan_id))]
    pub async fn create_subscription(
        &self,
        input: &CreateSubscription,
    ) -> Result<Subscription, AppError> {
        let plan = self.db.get_plan(input.plan_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Plan {} does not exist", input.plan_id))
        })?;

        if !plan.is_active {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Plan {} is not open for new subscriptions",
                plan.plan_id
            )));
        }

        let product_line = ProductLine::from_string(&plan.product_line);
        let features = self.db.get_plan_features(plan.plan_id).await?;

        let start_utc = Utc::now();
        let end_utc = start_utc + Duration::days(i64::from(plan.validity_days));

        let subscription = self
            .db
            .create_subscription(input, product_line, start_utc, end_utc, &features)
            .await?;

        record_subscription_operation(product_line.as_str(), "create");

        Ok(subscription)
    }

    /// Point lookup by id.
    pub async fn get_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        self.db.get_subscription(subscription_id).await
    }

    /// Cancel a subscription. Cancelling one that is already terminal is a
    /// no-op, not an error; a missing id is `NotFound`.
    #[instrument(skip(self), fields(subscription_id = %subscription_id))]
    pub async fn cancel_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Subscription, AppError> {
        let subscription = self
            .db
            .cancel_subscription(subscription_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!(
                    "Subscription {} does not exist",
                    subscription_id
                ))
            })?;

        record_subscription_operation(&subscription.product_line, "cancel");

        Ok(subscription)
    }
}
