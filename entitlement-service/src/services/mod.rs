//! Services module for entitlement-service.

pub mod catalog;
pub mod database;
pub mod entitlement;
pub mod ledger;
pub mod meter;
pub mod metrics;

pub use catalog::PlanCatalog;
pub use database::Database;
pub use entitlement::EntitlementService;
pub use ledger::SubscriptionLedger;
pub use meter::UsageMeter;
pub use metrics::{
    get_metrics, init_metrics, record_decision, record_subscription_operation,
    record_usage_increment,
};
