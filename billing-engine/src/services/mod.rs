//! Engine services: storage boundary, rollup, rate resolution, allowance
//! allocation, usage queries, metrics.

pub mod allowance;
pub mod database;
pub mod metrics;
pub mod queries;
pub mod rates;
pub mod rollup;
pub mod store;

pub use database::PgStore;
pub use metrics::{get_metrics, init_metrics};
pub use queries::UsageQueryEngine;
pub use rollup::{RollupBuilder, RollupFailure, RollupOutcome};
pub use store::{MemoryStore, UsageStore};
