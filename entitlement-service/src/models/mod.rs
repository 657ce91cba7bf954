//! Domain models for entitlement-service.

mod decision;
mod plan;
mod subscription;
mod usage;

pub use decision::{Decision, DenialReason, Remaining};
pub use plan::{
    features, Ceiling, CreatePlan, CreatePlanFeature, Plan, PlanCategory, PlanFeature, ProductLine,
};
pub use subscription::{CreateSubscription, Subscription, SubscriptionStatus};
pub use usage::UsageCounter;
