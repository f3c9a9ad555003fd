//! Unit rates, append-only and time-varying.

use super::event::NotificationChannel;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One rate row. A rate becomes effective exactly at `valid_from` and stays
/// in effect until a later row supersedes it; rows are never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rate {
    pub channel: NotificationChannel,
    pub valid_from: DateTime<Utc>,
    pub price: Decimal,
}
