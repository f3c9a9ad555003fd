//! Derived reporting rows. None of these are persisted; they exist only for
//! the duration of a query.

use super::event::NotificationChannel;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Per-fact allocation output of the free allowance allocator.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRow {
    pub local_date: NaiveDate,
    pub channel: NotificationChannel,
    pub provider: String,
    pub rate: Decimal,
    pub rate_multiplier: Decimal,
    pub notifications_sent: i64,
    pub billable_units: i64,
    /// billable_units x rate_multiplier.
    pub chargeable_units: Decimal,
    /// Chargeable units accumulated on strictly earlier dates.
    pub cumulative_before: Decimal,
    /// Free allowance still available before this row, floored at zero.
    pub remaining_before: Decimal,
    pub free_allowance_used: Decimal,
    pub charged_units: Decimal,
    pub cost: Decimal,
}

/// Yearly totals, one row per (channel, rate).
#[derive(Debug, Clone, Serialize)]
pub struct UsageTotalsRow {
    pub channel: NotificationChannel,
    pub rate: Decimal,
    pub notifications_sent: i64,
    pub chargeable_units: Decimal,
    pub free_allowance_used: Decimal,
    pub charged_units: Decimal,
    pub cost: Decimal,
}

/// Monthly totals, one row per (month, channel, rate).
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyUsageRow {
    /// First day of the month.
    pub month: NaiveDate,
    pub channel: NotificationChannel,
    pub rate: Decimal,
    pub notifications_sent: i64,
    pub chargeable_units: Decimal,
    pub free_allowance_used: Decimal,
    pub charged_units: Decimal,
    pub cost: Decimal,
}

/// Platform-wide daily volumes across all services.
#[derive(Debug, Clone, Serialize)]
pub struct PlatformDailyVolume {
    pub local_date: NaiveDate,
    pub sms_notifications: i64,
    /// Raw fragment count, before the rate multiplier.
    pub sms_fragments: i64,
    /// Fragments with the rate multiplier applied.
    pub sms_chargeable_units: Decimal,
    pub emails_sent: i64,
}

/// Per-provider daily SMS volumes.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderDailyVolume {
    pub local_date: NaiveDate,
    pub provider: String,
    pub sms_notifications: i64,
    pub sms_fragments: i64,
    pub sms_chargeable_units: Decimal,
    pub cost: Decimal,
}

/// Per-service volume totals joined with the applicable annual billing row.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceVolumeRow {
    pub service_id: Uuid,
    pub service_name: String,
    pub organization_id: Option<Uuid>,
    pub sms_notifications: i64,
    pub sms_chargeable_units: Decimal,
    pub emails_sent: i64,
    /// From the most recent annual billing row at or before the report's
    /// financial year; absent when the service has none.
    pub free_sms_fragment_limit: Option<i64>,
    pub financial_year_start: Option<i32>,
}

/// Per-service usage within an organization's yearly report.
///
/// Services with no billing rows still get a zeroed row, never an omission.
#[derive(Debug, Clone, Serialize)]
pub struct OrganizationServiceUsage {
    pub service_id: Uuid,
    pub service_name: String,
    pub sms_notifications: i64,
    pub chargeable_units: Decimal,
    pub free_allowance_used: Decimal,
    pub charged_units: Decimal,
    pub cost: Decimal,
    pub emails_sent: i64,
}

impl OrganizationServiceUsage {
    pub fn zeroed(service_id: Uuid, service_name: String) -> Self {
        Self {
            service_id,
            service_name,
            sms_notifications: 0,
            chargeable_units: Decimal::ZERO,
            free_allowance_used: Decimal::ZERO,
            charged_units: Decimal::ZERO,
            cost: Decimal::ZERO,
            emails_sent: 0,
        }
    }
}
