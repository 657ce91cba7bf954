//! service-core: Shared infrastructure for the marketplace service crates.
pub mod config;
pub mod error;
pub mod observability;

pub use serde;
pub use tokio;
pub use tracing;
