//! Usage meter - atomic per-feature consumption counters.

use crate::models::{Ceiling, UsageCounter};
use crate::services::database::Database;
use crate::services::metrics::record_usage_increment;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Per-subscription feature counters.
///
/// The spend side of every quota goes through [`UsageMeter::charge`], which
/// is a single atomic statement in the record store; two racing spenders can
/// never both observe the pre-increment value.
#[derive(Clone)]
pub struct UsageMeter {
    db: Arc<Database>,
}

impl UsageMeter {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Current consumption; a feature never spent reads as 0.
    #[instrument(skip(self), fields(subscription_id = %subscription_id, feature = feature))]
    pub async fn usage(&self, subscription_id: Uuid, feature: &str) -> Result<i64, AppError> {
        self.db.get_usage(subscription_id, feature).await
    }

    /// Spend one unit against the ceiling.
    ///
    /// Returns the new count, or `None` when a bounded ceiling is already
    /// fully consumed (in which case nothing is spent).
    #[instrument(skip(self), fields(subscription_id = %subscription_id, feature = feature))]
    pub async fn charge(
        &self,
        subscription_id: Uuid,
        feature: &str,
        ceiling: Ceiling,
    ) -> Result<Option<i64>, AppError> {
        let new_count = match ceiling {
            Ceiling::Unlimited => Some(self.db.increment_usage(subscription_id, feature).await?),
            Ceiling::Bounded(limit) => {
                self.db
                    .increment_usage_bounded(subscription_id, feature, limit)
                    .await?
            }
        };

        if new_count.is_some() {
            record_usage_increment(feature);
        }

        Ok(new_count)
    }

    /// All counters of a subscription, for usage-reporting screens.
    pub async fn counters(&self, subscription_id: Uuid) -> Result<Vec<UsageCounter>, AppError> {
        self.db.list_usage_counters(subscription_id).await
    }
}
