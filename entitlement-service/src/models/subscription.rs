//! Subscription model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Subscription status. `expired` and `cancelled` are terminal; renewal
/// always creates a fresh subscription record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "expired" => SubscriptionStatus::Expired,
            "cancelled" => SubscriptionStatus::Cancelled,
            _ => SubscriptionStatus::Active,
        }
    }
}

/// Time-bounded grant of one plan's entitlements to one user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub product_line: String,
    pub status: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
    pub auto_renew: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Subscription {
    /// The stored status can lag behind the clock; a subscription past its
    /// window end counts as expired regardless of what the row says.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now > self.end_utc
    }
}

/// Input for creating a subscription.
#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub auto_renew: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn subscription_ending_at(end_utc: DateTime<Utc>) -> Subscription {
        let now = Utc::now();
        Subscription {
            subscription_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            product_line: "recruiter".to_string(),
            status: "active".to_string(),
            start_utc: end_utc - Duration::days(30),
            end_utc,
            auto_renew: false,
            created_utc: now,
            updated_utc: now,
        }
    }

    #[test]
    fn has_ended_compares_against_the_clock_not_the_status() {
        let now = Utc::now();
        let live = subscription_ending_at(now + Duration::days(1));
        let stale = subscription_ending_at(now - Duration::seconds(1));

        assert!(!live.has_ended(now));
        assert!(stale.has_ended(now));
        assert_eq!(
            SubscriptionStatus::from_string(&stale.status),
            SubscriptionStatus::Active
        );
    }
}
