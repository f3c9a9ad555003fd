//! The storage boundary.
//!
//! `UsageStore` is the only coordination point the engine needs: the fact
//! upsert is atomic insert-or-full-replace on the composite natural key, so
//! concurrent rebuilds of the same (day, service) converge on identical rows.

use crate::models::{AnnualBilling, DailyUsageFact, FactKey, Rate, RawNotificationEvent, Service};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use platform_core::error::AppError;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Raw events created in the half-open UTC window, optionally for one
    /// service.
    async fn events_in_window(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        service_id: Option<Uuid>,
    ) -> Result<Vec<RawNotificationEvent>, AppError>;

    /// Distinct services with raw events in the window.
    async fn service_ids_with_events(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, AppError>;

    /// Insert the fact row, or replace the existing row's measures wholesale
    /// on natural-key conflict. Never increments.
    async fn upsert_fact(&self, fact: &DailyUsageFact) -> Result<(), AppError>;

    /// Fact rows for one service in an inclusive local-date range, ordered by
    /// local_date ascending.
    async fn facts_for_service(
        &self,
        service_id: Uuid,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<DailyUsageFact>, AppError>;

    /// Fact rows across all services in an inclusive local-date range.
    async fn facts_in_range(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<DailyUsageFact>, AppError>;

    /// All rates, ordered by valid_from descending.
    async fn rates(&self) -> Result<Vec<Rate>, AppError>;

    async fn annual_billing(
        &self,
        service_id: Uuid,
        financial_year_start: i32,
    ) -> Result<Option<AnnualBilling>, AppError>;

    /// The annual billing row with the greatest financial_year_start at or
    /// before the given year.
    async fn latest_annual_billing(
        &self,
        service_id: Uuid,
        up_to_year: i32,
    ) -> Result<Option<AnnualBilling>, AppError>;

    async fn service(&self, service_id: Uuid) -> Result<Option<Service>, AppError>;

    async fn services(&self) -> Result<Vec<Service>, AppError>;

    async fn organization_services(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<Service>, AppError>;
}

/// Embedded store for tests and local runs.
///
/// The upsert is a keyed read-modify-write under one lock, which preserves
/// the same full-replace semantics the Postgres store gets from
/// `ON CONFLICT DO UPDATE`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    events: Vec<RawNotificationEvent>,
    facts: HashMap<FactKey, DailyUsageFact>,
    rates: Vec<Rate>,
    annual_billing: Vec<AnnualBilling>,
    services: HashMap<Uuid, Service>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_event(&self, event: RawNotificationEvent) {
        self.inner.write().await.events.push(event);
    }

    pub async fn add_rate(&self, rate: Rate) {
        let mut inner = self.inner.write().await;
        inner.rates.push(rate);
        inner
            .rates
            .sort_by(|a, b| b.valid_from.cmp(&a.valid_from));
    }

    pub async fn add_annual_billing(&self, row: AnnualBilling) {
        self.inner.write().await.annual_billing.push(row);
    }

    pub async fn add_service(&self, service: Service) {
        self.inner.write().await.services.insert(service.id, service);
    }

    pub async fn fact_count(&self) -> usize {
        self.inner.read().await.facts.len()
    }
}

fn sorted_facts(mut facts: Vec<DailyUsageFact>) -> Vec<DailyUsageFact> {
    facts.sort_by(|a, b| {
        (a.local_date, a.service_id, a.template_id, &a.provider)
            .cmp(&(b.local_date, b.service_id, b.template_id, &b.provider))
    });
    facts
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn events_in_window(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        service_id: Option<Uuid>,
    ) -> Result<Vec<RawNotificationEvent>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.created_at >= from && e.created_at < until)
            .filter(|e| service_id.map_or(true, |id| e.service_id == id))
            .cloned()
            .collect())
    }

    async fn service_ids_with_events(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, AppError> {
        let inner = self.inner.read().await;
        let mut ids: Vec<Uuid> = inner
            .events
            .iter()
            .filter(|e| e.created_at >= from && e.created_at < until)
            .map(|e| e.service_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn upsert_fact(&self, fact: &DailyUsageFact) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        let key = fact.key();
        match inner.facts.get_mut(&key) {
            Some(existing) => {
                existing.billable_units = fact.billable_units;
                existing.notifications_sent = fact.notifications_sent;
                existing.updated_at = Utc::now();
            }
            None => {
                inner.facts.insert(key, fact.clone());
            }
        }
        Ok(())
    }

    async fn facts_for_service(
        &self,
        service_id: Uuid,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<DailyUsageFact>, AppError> {
        let inner = self.inner.read().await;
        Ok(sorted_facts(
            inner
                .facts
                .values()
                .filter(|f| {
                    f.service_id == service_id && f.local_date >= from && f.local_date <= until
                })
                .cloned()
                .collect(),
        ))
    }

    async fn facts_in_range(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<DailyUsageFact>, AppError> {
        let inner = self.inner.read().await;
        Ok(sorted_facts(
            inner
                .facts
                .values()
                .filter(|f| f.local_date >= from && f.local_date <= until)
                .cloned()
                .collect(),
        ))
    }

    async fn rates(&self) -> Result<Vec<Rate>, AppError> {
        Ok(self.inner.read().await.rates.clone())
    }

    async fn annual_billing(
        &self,
        service_id: Uuid,
        financial_year_start: i32,
    ) -> Result<Option<AnnualBilling>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .annual_billing
            .iter()
            .find(|b| b.service_id == service_id && b.financial_year_start == financial_year_start)
            .cloned())
    }

    async fn latest_annual_billing(
        &self,
        service_id: Uuid,
        up_to_year: i32,
    ) -> Result<Option<AnnualBilling>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .annual_billing
            .iter()
            .filter(|b| b.service_id == service_id && b.financial_year_start <= up_to_year)
            .max_by_key(|b| b.financial_year_start)
            .cloned())
    }

    async fn service(&self, service_id: Uuid) -> Result<Option<Service>, AppError> {
        Ok(self.inner.read().await.services.get(&service_id).cloned())
    }

    async fn services(&self) -> Result<Vec<Service>, AppError> {
        let inner = self.inner.read().await;
        let mut services: Vec<Service> = inner.services.values().cloned().collect();
        services.sort_by_key(|s| s.id);
        Ok(services)
    }

    async fn organization_services(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<Service>, AppError> {
        let inner = self.inner.read().await;
        let mut services: Vec<Service> = inner
            .services
            .values()
            .filter(|s| s.organization_id == Some(organization_id))
            .cloned()
            .collect();
        services.sort_by_key(|s| s.id);
        Ok(services)
    }
}
