#![allow(dead_code)]

use billing_engine::clock::FixedClock;
use billing_engine::models::{
    AnnualBilling, ApiKeyType, DailyUsageFact, NotificationChannel, NotificationStatus, Rate,
    RawNotificationEvent, Service,
};
use billing_engine::services::{MemoryStore, RollupBuilder, UsageQueryEngine};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

pub fn zone() -> Tz {
    "Europe/London".parse().expect("zone")
}

pub fn utc(s: &str) -> DateTime<Utc> {
    s.parse().expect("test timestamp")
}

pub fn date(s: &str) -> NaiveDate {
    s.parse().expect("test date")
}

pub fn dec(s: &str) -> Decimal {
    s.parse().expect("test decimal")
}

pub fn sms_event(
    service_id: Uuid,
    template_id: Uuid,
    billable_units: i64,
    created_at: &str,
) -> RawNotificationEvent {
    RawNotificationEvent {
        id: Uuid::new_v4(),
        service_id,
        template_id,
        channel: NotificationChannel::Sms,
        status: NotificationStatus::Delivered,
        key_type: ApiKeyType::Normal,
        billable_units,
        rate_multiplier: None,
        international: None,
        provider: Some("mmg".to_string()),
        created_at: utc(created_at),
    }
}

pub fn email_event(service_id: Uuid, template_id: Uuid, created_at: &str) -> RawNotificationEvent {
    RawNotificationEvent {
        id: Uuid::new_v4(),
        service_id,
        template_id,
        channel: NotificationChannel::Email,
        status: NotificationStatus::Delivered,
        key_type: ApiKeyType::Normal,
        billable_units: 0,
        rate_multiplier: None,
        international: None,
        provider: Some("ses".to_string()),
        created_at: utc(created_at),
    }
}

pub fn service(id: Uuid, name: &str) -> Service {
    Service {
        id,
        name: name.to_string(),
        active: true,
        restricted: false,
        count_as_live: true,
        organization_id: None,
        permissions: vec![NotificationChannel::Sms, NotificationChannel::Email],
    }
}

pub fn sms_rate(valid_from: &str, price: &str) -> Rate {
    Rate {
        channel: NotificationChannel::Sms,
        valid_from: utc(valid_from),
        price: dec(price),
    }
}

pub fn annual_billing(service_id: Uuid, financial_year_start: i32, limit: i64) -> AnnualBilling {
    AnnualBilling {
        service_id,
        financial_year_start,
        free_sms_fragment_limit: limit,
    }
}

pub fn sms_fact(
    service_id: Uuid,
    local_date: &str,
    billable_units: i64,
    rate: &str,
) -> DailyUsageFact {
    DailyUsageFact {
        local_date: date(local_date),
        template_id: Uuid::new_v4(),
        service_id,
        channel: NotificationChannel::Sms,
        provider: "mmg".to_string(),
        rate_multiplier: Decimal::ONE,
        international: false,
        rate: dec(rate),
        billable_units,
        notifications_sent: billable_units,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn email_fact(service_id: Uuid, local_date: &str, sent: i64) -> DailyUsageFact {
    DailyUsageFact {
        local_date: date(local_date),
        template_id: Uuid::new_v4(),
        service_id,
        channel: NotificationChannel::Email,
        provider: "ses".to_string(),
        rate_multiplier: Decimal::ONE,
        international: false,
        rate: Decimal::ZERO,
        billable_units: 0,
        notifications_sent: sent,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn rollup(store: &Arc<MemoryStore>) -> RollupBuilder<MemoryStore> {
    RollupBuilder::new(Arc::clone(store), zone())
}

/// Query engine pinned to the given instant.
pub fn engine(store: &Arc<MemoryStore>, now: &str) -> UsageQueryEngine<MemoryStore, FixedClock> {
    UsageQueryEngine::new(Arc::clone(store), FixedClock::new(utc(now)), zone())
}
