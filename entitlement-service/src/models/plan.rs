//! Subscription plan model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Well-known metered feature names.
pub mod features {
    pub const CV_VIEW: &str = "cv_view";
    pub const JOB_POSTING: &str = "job_posting";
    pub const TRAINING_OFFER: &str = "training_offer";
}

/// Product line a plan belongs to. The one-live-subscription invariant is
/// scoped per product line, so a user can hold a recruiter plan and a
/// training-institution plan at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductLine {
    Recruiter,
    TrainingInstitution,
}

impl ProductLine {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductLine::Recruiter => "recruiter",
            ProductLine::TrainingInstitution => "training_institution",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "training_institution" => ProductLine::TrainingInstitution,
            _ => ProductLine::Recruiter,
        }
    }
}

/// Commercial tier of a plan. Always an explicit attribute; business logic
/// never infers the tier from the display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanCategory {
    Standard,
    Premium,
    FullService,
}

impl PlanCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanCategory::Standard => "standard",
            PlanCategory::Premium => "premium",
            PlanCategory::FullService => "full_service",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "premium" => PlanCategory::Premium,
            "full_service" => PlanCategory::FullService,
            _ => PlanCategory::Standard,
        }
    }
}

/// Usage ceiling for one feature under a plan.
///
/// Stored as NULL for unlimited and a non-negative integer otherwise; no
/// sentinel value ever participates in quota arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ceiling {
    Bounded(i64),
    Unlimited,
}

impl Ceiling {
    pub fn from_db(value: Option<i32>) -> Self {
        match value {
            Some(n) => Ceiling::Bounded(i64::from(n)),
            None => Ceiling::Unlimited,
        }
    }

    pub fn to_db(&self) -> Option<i32> {
        match self {
            Ceiling::Bounded(n) => Some(*n as i32),
            Ceiling::Unlimited => None,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Ceiling::Unlimited)
    }
}

/// Subscription plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub plan_id: Uuid,
    pub product_line: String,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub validity_days: i32,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Per-feature ceiling row of a plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlanFeature {
    pub plan_id: Uuid,
    pub feature: String,
    pub ceiling: Option<i32>,
}

impl PlanFeature {
    pub fn ceiling(&self) -> Ceiling {
        Ceiling::from_db(self.ceiling)
    }
}

/// Input for creating a plan.
#[derive(Debug, Clone)]
pub struct CreatePlan {
    pub product_line: ProductLine,
    pub name: String,
    pub category: PlanCategory,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub validity_days: i32,
    pub features: Vec<CreatePlanFeature>,
}

/// Input for one feature ceiling of a new plan.
#[derive(Debug, Clone)]
pub struct CreatePlanFeature {
    pub feature: String,
    pub ceiling: Ceiling,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_round_trips_through_db_representation() {
        assert_eq!(Ceiling::from_db(None), Ceiling::Unlimited);
        assert_eq!(Ceiling::from_db(Some(5)), Ceiling::Bounded(5));
        assert_eq!(Ceiling::Bounded(0).to_db(), Some(0));
        assert_eq!(Ceiling::Unlimited.to_db(), None);
    }

    #[test]
    fn product_line_string_conversions() {
        assert_eq!(ProductLine::Recruiter.as_str(), "recruiter");
        assert_eq!(
            ProductLine::from_string("training_institution"),
            ProductLine::TrainingInstitution
        );
    }
}
