//! FIFO depletion of the annual free SMS allowance.
//!
//! The allowance is consumed by the earliest usage first; once it runs out,
//! every later row in the financial year is charged in full. Rows sharing a
//! local date are all computed against the same prior-days cumulative total,
//! so their relative order within the day never changes any figure. That can
//! let two same-day rows both see the tail of the allowance; the behavior is
//! deliberate and must not be tie-broken away.

use crate::models::{DailyUsageFact, UsageRow};
use rust_decimal::Decimal;

/// Allocate the free allowance across a service's SMS fact rows for one
/// financial year, producing one derived row per fact.
///
/// `facts` must all belong to the same service and financial year; they are
/// processed in ascending local-date order regardless of input order.
pub fn allocate(facts: &[DailyUsageFact], free_sms_fragment_limit: i64) -> Vec<UsageRow> {
    let mut ordered: Vec<&DailyUsageFact> = facts.iter().collect();
    ordered.sort_by_key(|f| f.local_date);

    let limit = Decimal::from(free_sms_fragment_limit);
    let mut rows = Vec::with_capacity(ordered.len());

    let mut cumulative = Decimal::ZERO;
    let mut idx = 0;
    while idx < ordered.len() {
        let day = ordered[idx].local_date;
        let cumulative_before = cumulative;
        let remaining_before = (limit - cumulative_before).max(Decimal::ZERO);

        while idx < ordered.len() && ordered[idx].local_date == day {
            let fact = ordered[idx];
            let chargeable = fact.chargeable_units();
            let free_used = remaining_before.min(chargeable);
            let charged = (chargeable - remaining_before).max(Decimal::ZERO);

            rows.push(UsageRow {
                local_date: fact.local_date,
                channel: fact.channel,
                provider: fact.provider.clone(),
                rate: fact.rate,
                rate_multiplier: fact.rate_multiplier,
                notifications_sent: fact.notifications_sent,
                billable_units: fact.billable_units,
                chargeable_units: chargeable,
                cumulative_before,
                remaining_before,
                free_allowance_used: free_used,
                charged_units: charged,
                cost: charged * fact.rate,
            });

            cumulative += chargeable;
            idx += 1;
        }
    }

    rows
}

/// Free allowance left immediately before a cutoff date.
///
/// Only rows dated strictly before the cutoff deplete the figure; usage on
/// the cutoff day itself does not count.
pub fn remaining_allowance_as_of(
    facts: &[DailyUsageFact],
    free_sms_fragment_limit: i64,
    cutoff: chrono::NaiveDate,
) -> Decimal {
    let used: Decimal = facts
        .iter()
        .filter(|f| f.local_date < cutoff)
        .map(|f| f.chargeable_units())
        .sum();
    (Decimal::from(free_sms_fragment_limit) - used).max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationChannel;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn date(s: &str) -> NaiveDate {
        s.parse().expect("test date")
    }

    fn dec(s: &str) -> Decimal {
        s.parse().expect("test decimal")
    }

    fn sms_fact(local_date: &str, billable_units: i64, multiplier: &str) -> DailyUsageFact {
        DailyUsageFact {
            local_date: date(local_date),
            template_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            channel: NotificationChannel::Sms,
            provider: "mmg".to_string(),
            rate_multiplier: dec(multiplier),
            international: false,
            rate: dec("0.0158"),
            billable_units,
            notifications_sent: billable_units,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn depletes_earliest_usage_first() {
        let facts = vec![
            sms_fact("2019-04-01", 4, "1"),
            sms_fact("2019-04-02", 4, "1"),
            sms_fact("2019-04-03", 4, "1"),
        ];

        let rows = allocate(&facts, 10);

        let charged: Vec<Decimal> = rows.iter().map(|r| r.charged_units).collect();
        let free: Vec<Decimal> = rows.iter().map(|r| r.free_allowance_used).collect();
        assert_eq!(charged, vec![dec("0"), dec("0"), dec("2")]);
        assert_eq!(free, vec![dec("4"), dec("4"), dec("2")]);
        assert_eq!(rows[2].cost, dec("2") * dec("0.0158"));
    }

    #[test]
    fn free_plus_charged_always_equals_chargeable() {
        let facts = vec![
            sms_fact("2019-04-01", 7, "1"),
            sms_fact("2019-05-10", 3, "2.5"),
            sms_fact("2019-06-20", 11, "1"),
            sms_fact("2020-03-31", 2, "3"),
        ];

        let rows = allocate(&facts, 12);

        for row in &rows {
            assert_eq!(row.free_allowance_used + row.charged_units, row.chargeable_units);
        }
        let total_free: Decimal = rows.iter().map(|r| r.free_allowance_used).sum();
        assert!(total_free <= dec("12"));
    }

    #[test]
    fn input_order_does_not_matter() {
        let mut facts = vec![
            sms_fact("2019-04-03", 4, "1"),
            sms_fact("2019-04-01", 4, "1"),
            sms_fact("2019-04-02", 4, "1"),
        ];
        let rows = allocate(&facts, 10);
        assert_eq!(rows[0].local_date, date("2019-04-01"));
        assert_eq!(rows[2].charged_units, dec("2"));

        facts.reverse();
        let again = allocate(&facts, 10);
        assert_eq!(again[2].charged_units, dec("2"));
    }

    #[test]
    fn same_day_rows_share_the_prior_cumulative() {
        let facts = vec![
            sms_fact("2019-04-01", 8, "1"),
            sms_fact("2019-04-02", 4, "1"),
            sms_fact("2019-04-02", 4, "1"),
        ];

        let rows = allocate(&facts, 10);

        // Both April 2 rows see cumulative_before = 8 and remaining = 2, so
        // each claims 2 free units. The overlap is the documented behavior.
        assert_eq!(rows[1].cumulative_before, dec("8"));
        assert_eq!(rows[2].cumulative_before, dec("8"));
        assert_eq!(rows[1].free_allowance_used, dec("2"));
        assert_eq!(rows[2].free_allowance_used, dec("2"));
        assert_eq!(rows[1].charged_units, dec("2"));
        assert_eq!(rows[2].charged_units, dec("2"));
    }

    #[test]
    fn remainder_cutoff_is_strictly_before() {
        let facts = vec![
            sms_fact("2019-05-01", 2, "1"),
            sms_fact("2019-05-31", 3, "1"),
        ];

        assert_eq!(remaining_allowance_as_of(&facts, 10, date("2019-05-15")), dec("8"));
        // The cutoff day's own usage is excluded.
        assert_eq!(remaining_allowance_as_of(&facts, 10, date("2019-05-31")), dec("8"));
        assert_eq!(remaining_allowance_as_of(&facts, 10, date("2019-06-01")), dec("5"));
    }

    #[test]
    fn remainder_floors_at_zero() {
        let facts = vec![sms_fact("2019-05-01", 20, "1")];
        assert_eq!(remaining_allowance_as_of(&facts, 10, date("2019-06-01")), Decimal::ZERO);
    }
}
