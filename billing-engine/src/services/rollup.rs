//! Daily rollup of raw notification events into fact rows.

use crate::models::{ApiKeyType, DailyUsageFact, NotificationChannel};
use crate::period::day_window_utc;
use crate::services::metrics::{record_facts_upserted, record_rollup_unit};
use crate::services::rates::resolve_rate;
use crate::services::store::UsageStore;
use chrono::{Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use platform_core::error::AppError;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// One failed, independently retryable rebuild unit.
///
/// `service_id` is absent when the day-level event scan itself failed before
/// any per-service work could start.
#[derive(Debug)]
pub struct RollupFailure {
    pub day: NaiveDate,
    pub service_id: Option<Uuid>,
    pub error: AppError,
}

/// Result of a batch rebuild. Failed units are reported, never re-raised, so
/// the caller can retry exactly those units.
#[derive(Debug, Default)]
pub struct RollupOutcome {
    pub facts_written: usize,
    pub failures: Vec<RollupFailure>,
}

impl RollupOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(PartialEq, Eq, Hash, PartialOrd, Ord)]
struct GroupKey {
    template_id: Uuid,
    channel: NotificationChannel,
    provider: String,
    rate_multiplier: Decimal,
    international: bool,
}

/// Rebuilds daily usage facts from raw events.
///
/// Every rebuild writes the full current total for each (day, key), so
/// re-running it over already-aggregated days is a no-op on stored data.
pub struct RollupBuilder<S: UsageStore> {
    store: Arc<S>,
    zone: Tz,
}

impl<S: UsageStore> RollupBuilder<S> {
    pub fn new(store: Arc<S>, zone: Tz) -> Self {
        Self { store, zone }
    }

    /// Rebuild one (day, service) unit and return the fact rows written.
    #[instrument(skip(self), fields(zone = %self.zone))]
    pub async fn rebuild_service_day(
        &self,
        day: NaiveDate,
        service_id: Uuid,
    ) -> Result<Vec<DailyUsageFact>, AppError> {
        let (window_start, window_end) = day_window_utc(day, self.zone);

        let events = self
            .store
            .events_in_window(window_start, window_end, Some(service_id))
            .await?;
        let service = self.store.service(service_id).await?;
        let rates = self.store.rates().await?;

        let mut groups: HashMap<GroupKey, (i64, i64)> = HashMap::new();
        for event in events {
            if event.key_type == ApiKeyType::Test {
                continue;
            }
            if !event.status.is_billable(event.channel) {
                continue;
            }
            if let Some(service) = &service {
                if !service.allows(event.channel) {
                    continue;
                }
            }

            let key = GroupKey {
                template_id: event.template_id,
                channel: event.channel,
                provider: event.provider.unwrap_or_else(|| "unknown".to_string()),
                rate_multiplier: event.rate_multiplier.unwrap_or(Decimal::ONE),
                international: event.international.unwrap_or(false),
            };
            let entry = groups.entry(key).or_insert((0, 0));
            entry.0 += event.billable_units;
            entry.1 += 1;
        }

        let mut groups: Vec<(GroupKey, (i64, i64))> = groups.into_iter().collect();
        groups.sort_by(|a, b| a.0.cmp(&b.0));

        let mut facts = Vec::with_capacity(groups.len());
        for (key, (billable_units, notifications_sent)) in groups {
            let rate = resolve_rate(&rates, key.channel, day, self.zone)?;
            let now = Utc::now();
            let fact = DailyUsageFact {
                local_date: day,
                template_id: key.template_id,
                service_id,
                channel: key.channel,
                provider: key.provider,
                rate_multiplier: key.rate_multiplier,
                international: key.international,
                rate,
                billable_units,
                notifications_sent,
                created_at: now,
                updated_at: now,
            };
            self.store.upsert_fact(&fact).await?;
            record_facts_upserted(fact.channel.as_str(), 1);
            facts.push(fact);
        }

        info!(
            day = %day,
            service_id = %service_id,
            facts = facts.len(),
            "Rebuilt daily usage facts"
        );

        Ok(facts)
    }

    /// Rebuild one day for every service with events in its window.
    ///
    /// Each (day, service) unit fails independently; one bad service never
    /// blocks the rest of the day.
    #[instrument(skip(self))]
    pub async fn rebuild_day(&self, day: NaiveDate) -> Result<RollupOutcome, AppError> {
        let (window_start, window_end) = day_window_utc(day, self.zone);
        let service_ids = self
            .store
            .service_ids_with_events(window_start, window_end)
            .await?;

        let mut outcome = RollupOutcome::default();
        for service_id in service_ids {
            match self.rebuild_service_day(day, service_id).await {
                Ok(facts) => {
                    record_rollup_unit("success");
                    outcome.facts_written += facts.len();
                }
                Err(err) => {
                    record_rollup_unit("failure");
                    error!(
                        day = %day,
                        service_id = %service_id,
                        error = %err,
                        "Rollup unit failed"
                    );
                    outcome.failures.push(RollupFailure {
                        day,
                        service_id: Some(service_id),
                        error: err,
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// Rebuild an inclusive day range, isolating failures per day and per
    /// service. Only an inverted range is rejected up front.
    #[instrument(skip(self))]
    pub async fn rebuild_range(
        &self,
        from: NaiveDate,
        until: NaiveDate,
    ) -> Result<RollupOutcome, AppError> {
        if from > until {
            return Err(AppError::InvalidDateRange(format!(
                "start {from} is after end {until}"
            )));
        }

        let mut outcome = RollupOutcome::default();
        let mut day = from;
        while day <= until {
            match self.rebuild_day(day).await {
                Ok(daily) => {
                    outcome.facts_written += daily.facts_written;
                    outcome.failures.extend(daily.failures);
                }
                Err(err) => {
                    record_rollup_unit("failure");
                    error!(day = %day, error = %err, "Day scan failed");
                    outcome.failures.push(RollupFailure {
                        day,
                        service_id: None,
                        error: err,
                    });
                }
            }
            day += Duration::days(1);
        }

        Ok(outcome)
    }
}
