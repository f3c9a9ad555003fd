//! Domain models for the billing engine.

mod annual_billing;
mod event;
mod fact;
mod rate;
mod report;
mod service;

pub use annual_billing::AnnualBilling;
pub use event::{ApiKeyType, NotificationChannel, NotificationStatus, RawNotificationEvent};
pub use fact::{DailyUsageFact, FactKey};
pub use rate::Rate;
pub use report::{
    MonthlyUsageRow, OrganizationServiceUsage, PlatformDailyVolume, ProviderDailyVolume,
    ServiceVolumeRow, UsageRow, UsageTotalsRow,
};
pub use service::Service;
