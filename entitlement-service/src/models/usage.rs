//! Usage counter model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Running consumption count for one feature under one subscription.
/// Monotonically increasing; dropped with the subscription, so a renewal
/// starts from zero under the new subscription id.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageCounter {
    pub subscription_id: Uuid,
    pub feature: String,
    pub count: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}
