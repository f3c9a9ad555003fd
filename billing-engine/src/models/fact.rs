//! Daily usage fact rows, the engine's persisted output.

use super::event::NotificationChannel;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The composite natural key of a fact row.
///
/// At most one row exists per key; the rollup replaces the row's measures
/// wholesale on conflict.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactKey {
    pub local_date: NaiveDate,
    pub template_id: Uuid,
    pub service_id: Uuid,
    pub channel: NotificationChannel,
    pub provider: String,
    pub rate_multiplier: Decimal,
    pub international: bool,
    pub rate: Decimal,
}

/// One daily aggregate row per natural key.
///
/// `billable_units` and `notifications_sent` always hold the full current
/// total for the key's day, never an increment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyUsageFact {
    pub local_date: NaiveDate,
    pub template_id: Uuid,
    pub service_id: Uuid,
    pub channel: NotificationChannel,
    pub provider: String,
    pub rate_multiplier: Decimal,
    pub international: bool,
    pub rate: Decimal,
    pub billable_units: i64,
    pub notifications_sent: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DailyUsageFact {
    pub fn key(&self) -> FactKey {
        FactKey {
            local_date: self.local_date,
            template_id: self.template_id,
            service_id: self.service_id,
            channel: self.channel,
            provider: self.provider.clone(),
            rate_multiplier: self.rate_multiplier,
            international: self.international,
            rate: self.rate,
        }
    }

    /// Billable units with the rate multiplier applied.
    pub fn chargeable_units(&self) -> Decimal {
        Decimal::from(self.billable_units) * self.rate_multiplier
    }
}
