//! Usage queries over persisted fact rows.
//!
//! Every query is either HISTORICAL (its range ends before today, answered
//! purely from stored facts) or LIVE (its range includes today, in which case
//! today's facts are rebuilt for every affected service before reading).
//! The rebuild is a full-replace upsert, so concurrent LIVE callers converge
//! on identical stored state. A rebuild error fails the whole query; a
//! partial answer would break the exact running total the allowance math
//! depends on.

use crate::clock::Clock;
use crate::models::{
    DailyUsageFact, MonthlyUsageRow, NotificationChannel, OrganizationServiceUsage,
    PlatformDailyVolume, ProviderDailyVolume, ServiceVolumeRow, UsageRow, UsageTotalsRow,
};
use crate::period::{month_of, FinancialYear};
use crate::services::allowance;
use crate::services::metrics::record_usage_query;
use crate::services::rollup::RollupBuilder;
use crate::services::store::UsageStore;
use chrono::NaiveDate;
use chrono_tz::Tz;
use platform_core::error::AppError;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[derive(Default)]
struct Totals {
    notifications_sent: i64,
    chargeable_units: Decimal,
    free_allowance_used: Decimal,
    charged_units: Decimal,
    cost: Decimal,
}

pub struct UsageQueryEngine<S: UsageStore, C: Clock> {
    store: Arc<S>,
    rollup: RollupBuilder<S>,
    clock: C,
    zone: Tz,
}

impl<S: UsageStore, C: Clock> UsageQueryEngine<S, C> {
    pub fn new(store: Arc<S>, clock: C, zone: Tz) -> Self {
        let rollup = RollupBuilder::new(Arc::clone(&store), zone);
        Self {
            store,
            rollup,
            clock,
            zone,
        }
    }

    fn today(&self) -> NaiveDate {
        self.clock.today(self.zone)
    }

    /// Rebuild today's facts for one service when the range includes today.
    async fn extend_today_for(
        &self,
        service_id: Uuid,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<(), AppError> {
        let today = self.today();
        if from <= today && today <= until {
            self.rollup.rebuild_service_day(today, service_id).await?;
        }
        Ok(())
    }

    /// Rebuild today's facts for every service with events today, when the
    /// range includes today.
    async fn extend_today_all(&self, from: NaiveDate, until: NaiveDate) -> Result<(), AppError> {
        let today = self.today();
        if from <= today && today <= until {
            let (window_start, window_end) = crate::period::day_window_utc(today, self.zone);
            let service_ids = self
                .store
                .service_ids_with_events(window_start, window_end)
                .await?;
            for service_id in service_ids {
                self.rollup.rebuild_service_day(today, service_id).await?;
            }
        }
        Ok(())
    }

    /// The free SMS fragment limit a service gets for a financial year.
    ///
    /// Chargeable SMS usage with no annual billing row is an error; a service
    /// that sent nothing chargeable simply has no allowance.
    async fn free_limit_for(
        &self,
        service_id: Uuid,
        year: FinancialYear,
        sms_facts: &[DailyUsageFact],
    ) -> Result<i64, AppError> {
        if let Some(row) = self
            .store
            .annual_billing(service_id, year.start_year())
            .await?
        {
            return Ok(row.free_sms_fragment_limit);
        }
        let chargeable: Decimal = sms_facts.iter().map(|f| f.chargeable_units()).sum();
        if chargeable > Decimal::ZERO {
            return Err(AppError::MissingAnnualBilling {
                service_id,
                financial_year: year.start_year(),
            });
        }
        Ok(0)
    }

    async fn allocated_year_rows(
        &self,
        service_id: Uuid,
        year: FinancialYear,
        until: NaiveDate,
    ) -> Result<(Vec<UsageRow>, Vec<DailyUsageFact>), AppError> {
        let facts = self
            .store
            .facts_for_service(service_id, year.first_day(), until)
            .await?;

        let (sms_facts, email_facts): (Vec<DailyUsageFact>, Vec<DailyUsageFact>) = facts
            .into_iter()
            .partition(|f| f.channel == NotificationChannel::Sms);

        let limit = self.free_limit_for(service_id, year, &sms_facts).await?;
        Ok((allowance::allocate(&sms_facts, limit), email_facts))
    }

    /// Yearly totals for one service, one row per (channel, rate).
    #[instrument(skip(self))]
    pub async fn totals_for_year(
        &self,
        service_id: Uuid,
        year: FinancialYear,
    ) -> Result<Vec<UsageTotalsRow>, AppError> {
        record_usage_query("totals_for_year");
        self.totals_between(service_id, year, year.first_day(), year.last_day())
            .await
    }

    /// Totals for a sub-range of one financial year.
    ///
    /// The range must lie within a single financial year; the allocation
    /// still runs from April 1 so the free allowance consumed before the
    /// range start is accounted for.
    #[instrument(skip(self))]
    pub async fn totals_for_range(
        &self,
        service_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<UsageTotalsRow>, AppError> {
        record_usage_query("totals_for_range");
        let year = FinancialYear::single_year_range(start, end)?;
        self.totals_between(service_id, year, start, end).await
    }

    async fn totals_between(
        &self,
        service_id: Uuid,
        year: FinancialYear,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<UsageTotalsRow>, AppError> {
        self.extend_today_for(service_id, start, end).await?;

        let (sms_rows, email_facts) = self.allocated_year_rows(service_id, year, end).await?;

        let mut totals: BTreeMap<(NotificationChannel, Decimal), Totals> = BTreeMap::new();
        for row in &sms_rows {
            if row.local_date < start {
                continue;
            }
            let entry = totals.entry((row.channel, row.rate)).or_default();
            entry.notifications_sent += row.notifications_sent;
            entry.chargeable_units += row.chargeable_units;
            entry.free_allowance_used += row.free_allowance_used;
            entry.charged_units += row.charged_units;
            entry.cost += row.cost;
        }
        for fact in email_facts
            .iter()
            .filter(|f| f.local_date >= start && f.local_date <= end)
        {
            let entry = totals.entry((fact.channel, fact.rate)).or_default();
            entry.notifications_sent += fact.notifications_sent;
            entry.chargeable_units += fact.chargeable_units();
        }

        Ok(totals
            .into_iter()
            .map(|((channel, rate), t)| UsageTotalsRow {
                channel,
                rate,
                notifications_sent: t.notifications_sent,
                chargeable_units: t.chargeable_units,
                free_allowance_used: t.free_allowance_used,
                charged_units: t.charged_units,
                cost: t.cost,
            })
            .collect())
    }

    /// Monthly totals for one service's financial year, one row per
    /// (month, channel, rate).
    #[instrument(skip(self))]
    pub async fn monthly_for_year(
        &self,
        service_id: Uuid,
        year: FinancialYear,
    ) -> Result<Vec<MonthlyUsageRow>, AppError> {
        record_usage_query("monthly_for_year");
        self.extend_today_for(service_id, year.first_day(), year.last_day())
            .await?;

        let (sms_rows, email_facts) = self
            .allocated_year_rows(service_id, year, year.last_day())
            .await?;

        let mut totals: BTreeMap<(NaiveDate, NotificationChannel, Decimal), Totals> =
            BTreeMap::new();
        for row in &sms_rows {
            let entry = totals
                .entry((month_of(row.local_date), row.channel, row.rate))
                .or_default();
            entry.notifications_sent += row.notifications_sent;
            entry.chargeable_units += row.chargeable_units;
            entry.free_allowance_used += row.free_allowance_used;
            entry.charged_units += row.charged_units;
            entry.cost += row.cost;
        }
        for fact in &email_facts {
            let entry = totals
                .entry((month_of(fact.local_date), fact.channel, fact.rate))
                .or_default();
            entry.notifications_sent += fact.notifications_sent;
            entry.chargeable_units += fact.chargeable_units();
        }

        Ok(totals
            .into_iter()
            .map(|((month, channel, rate), t)| MonthlyUsageRow {
                month,
                channel,
                rate,
                notifications_sent: t.notifications_sent,
                chargeable_units: t.chargeable_units,
                free_allowance_used: t.free_allowance_used,
                charged_units: t.charged_units,
                cost: t.cost,
            })
            .collect())
    }

    /// Cross-service daily volumes, inclusive of both bounds.
    #[instrument(skip(self))]
    pub async fn platform_daily_volumes(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PlatformDailyVolume>, AppError> {
        record_usage_query("platform_daily_volumes");
        check_range(start, end)?;
        self.extend_today_all(start, end).await?;

        let facts = self.store.facts_in_range(start, end).await?;

        let mut days: BTreeMap<NaiveDate, PlatformDailyVolume> = BTreeMap::new();
        for fact in &facts {
            let day = days
                .entry(fact.local_date)
                .or_insert_with(|| PlatformDailyVolume {
                    local_date: fact.local_date,
                    sms_notifications: 0,
                    sms_fragments: 0,
                    sms_chargeable_units: Decimal::ZERO,
                    emails_sent: 0,
                });
            match fact.channel {
                NotificationChannel::Sms => {
                    day.sms_notifications += fact.notifications_sent;
                    day.sms_fragments += fact.billable_units;
                    day.sms_chargeable_units += fact.chargeable_units();
                }
                NotificationChannel::Email => {
                    day.emails_sent += fact.notifications_sent;
                }
            }
        }

        Ok(days.into_values().collect())
    }

    /// Per-provider daily SMS volumes, priced at the full rate with no
    /// allowance applied.
    #[instrument(skip(self))]
    pub async fn daily_provider_volumes(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ProviderDailyVolume>, AppError> {
        record_usage_query("daily_provider_volumes");
        check_range(start, end)?;
        self.extend_today_all(start, end).await?;

        let facts = self.store.facts_in_range(start, end).await?;

        let mut rows: BTreeMap<(NaiveDate, String), ProviderDailyVolume> = BTreeMap::new();
        for fact in facts
            .iter()
            .filter(|f| f.channel == NotificationChannel::Sms)
        {
            let row = rows
                .entry((fact.local_date, fact.provider.clone()))
                .or_insert_with(|| ProviderDailyVolume {
                    local_date: fact.local_date,
                    provider: fact.provider.clone(),
                    sms_notifications: 0,
                    sms_fragments: 0,
                    sms_chargeable_units: Decimal::ZERO,
                    cost: Decimal::ZERO,
                });
            let chargeable = fact.chargeable_units();
            row.sms_notifications += fact.notifications_sent;
            row.sms_fragments += fact.billable_units;
            row.sms_chargeable_units += chargeable;
            row.cost += chargeable * fact.rate;
        }

        Ok(rows.into_values().collect())
    }

    /// Per-service volume totals for live production services, joined with
    /// the most recent annual billing row at or before the range's end year.
    #[instrument(skip(self))]
    pub async fn volumes_by_service(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ServiceVolumeRow>, AppError> {
        record_usage_query("volumes_by_service");
        check_range(start, end)?;
        self.extend_today_all(start, end).await?;

        let facts = self.store.facts_in_range(start, end).await?;
        let mut by_service: HashMap<Uuid, (i64, Decimal, i64)> = HashMap::new();
        for fact in &facts {
            let entry = by_service
                .entry(fact.service_id)
                .or_insert((0, Decimal::ZERO, 0));
            match fact.channel {
                NotificationChannel::Sms => {
                    entry.0 += fact.notifications_sent;
                    entry.1 += fact.chargeable_units();
                }
                NotificationChannel::Email => entry.2 += fact.notifications_sent,
            }
        }

        let end_year = FinancialYear::containing(end).start_year();
        let mut rows = Vec::new();
        for service in self.store.services().await? {
            if !service.active || service.restricted || !service.count_as_live {
                continue;
            }
            let (sms_notifications, sms_chargeable_units, emails_sent) = by_service
                .get(&service.id)
                .cloned()
                .unwrap_or((0, Decimal::ZERO, 0));
            let billing = self
                .store
                .latest_annual_billing(service.id, end_year)
                .await?;
            rows.push(ServiceVolumeRow {
                service_id: service.id,
                service_name: service.name,
                organization_id: service.organization_id,
                sms_notifications,
                sms_chargeable_units,
                emails_sent,
                free_sms_fragment_limit: billing.as_ref().map(|b| b.free_sms_fragment_limit),
                financial_year_start: billing.as_ref().map(|b| b.financial_year_start),
            });
        }

        Ok(rows)
    }

    /// Yearly usage for every service in an organization, keyed by service
    /// id. Services with no fact rows still appear zeroed.
    #[instrument(skip(self))]
    pub async fn usage_year_for_organization(
        &self,
        organization_id: Uuid,
        year: FinancialYear,
        include_all_services: bool,
    ) -> Result<HashMap<Uuid, OrganizationServiceUsage>, AppError> {
        record_usage_query("usage_year_for_organization");

        let mut usage = HashMap::new();
        for service in self.store.organization_services(organization_id).await? {
            if !include_all_services && !service.is_live() {
                continue;
            }

            self.extend_today_for(service.id, year.first_day(), year.last_day())
                .await?;
            let (sms_rows, email_facts) = self
                .allocated_year_rows(service.id, year, year.last_day())
                .await?;

            let mut row = OrganizationServiceUsage::zeroed(service.id, service.name.clone());
            for sms in &sms_rows {
                row.sms_notifications += sms.notifications_sent;
                row.chargeable_units += sms.chargeable_units;
                row.free_allowance_used += sms.free_allowance_used;
                row.charged_units += sms.charged_units;
                row.cost += sms.cost;
            }
            for fact in &email_facts {
                row.emails_sent += fact.notifications_sent;
            }

            usage.insert(service.id, row);
        }

        Ok(usage)
    }

    /// Free allowance left for a service immediately before a cutoff date.
    #[instrument(skip(self))]
    pub async fn remaining_allowance_as_of(
        &self,
        service_id: Uuid,
        year: FinancialYear,
        cutoff: NaiveDate,
    ) -> Result<Decimal, AppError> {
        record_usage_query("remaining_allowance_as_of");

        let today = self.today();
        if year.contains(today) && today < cutoff {
            self.rollup.rebuild_service_day(today, service_id).await?;
        }

        let facts = self
            .store
            .facts_for_service(service_id, year.first_day(), year.last_day())
            .await?;
        let sms_facts: Vec<DailyUsageFact> = facts
            .into_iter()
            .filter(|f| f.channel == NotificationChannel::Sms)
            .collect();
        let limit = self.free_limit_for(service_id, year, &sms_facts).await?;

        Ok(allowance::remaining_allowance_as_of(
            &sms_facts, limit, cutoff,
        ))
    }
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<(), AppError> {
    if start > end {
        return Err(AppError::InvalidDateRange(format!(
            "start {start} is after end {end}"
        )));
    }
    Ok(())
}
