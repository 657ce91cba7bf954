//! Plan catalog - read-only access to the offered subscription plans.

use crate::models::{Ceiling, Plan, ProductLine};
use crate::services::database::Database;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Read-only view over the plan catalog.
///
/// Plans are maintained by back-office tooling; the entitlement components
/// only ever read them. A subscription referencing a plan that no longer
/// exists is a data-integrity failure, so [`PlanCatalog::get_plan`] surfaces
/// it as a hard `NotFound` error rather than an option.
#[derive(Clone)]
pub struct PlanCatalog {
    db: Arc<Database>,
}

impl PlanCatalog {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Plans currently offered for new subscriptions, cheapest first.
    #[instrument(skip(self))]
    pub async fn list_active_plans(
        &self,
        product_line: ProductLine,
    ) -> Result<Vec<Plan>, AppError> {
        self.db.list_active_plans(product_line).await
    }

    /// Resolve the plan a subscription references. Deactivated plans still
    /// resolve: deactivation blocks new subscriptions, not existing ones.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn get_plan(&self, plan_id: Uuid) -> Result<Plan, AppError> {
        self.db
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan {} does not exist", plan_id)))
    }

    /// Feature ceilings granted by a plan. A feature absent from the map is
    /// not granted by the plan at all.
    #[instrument(skip(self), fields(plan_id = %plan_id))]
    pub async fn plan_ceilings(&self, plan_id: Uuid) -> Result<HashMap<String, Ceiling>, AppError> {
        let features = self.db.get_plan_features(plan_id).await?;

        Ok(features
            .into_iter()
            .map(|f| (f.feature, Ceiling::from_db(f.ceiling)))
            .collect())
    }
}
