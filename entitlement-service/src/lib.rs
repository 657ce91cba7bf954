//! Entitlement Service - Subscription plans, usage metering and authorization
//! for the talent marketplace.

pub mod config;
pub mod models;
pub mod services;
