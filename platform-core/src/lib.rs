//! platform-core: Shared infrastructure for the notification billing platform.
pub mod config;
pub mod error;
pub mod observability;

pub use anyhow;
pub use tracing;
