//! Financial-year and local calendar-day arithmetic.
//!
//! The platform bills against UK financial years (April 1 through March 31)
//! and buckets usage by local calendar day in a configured IANA time zone,
//! while all storage timestamps are UTC.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use platform_core::error::AppError;

/// A financial year, identified by the calendar year it starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FinancialYear(i32);

impl FinancialYear {
    pub fn new(start_year: i32) -> Self {
        Self(start_year)
    }

    pub fn start_year(&self) -> i32 {
        self.0
    }

    /// April 1 of the start year.
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.0, 4, 1).expect("April 1 is a valid date")
    }

    /// March 31 of the following year.
    pub fn last_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.0 + 1, 3, 31).expect("March 31 is a valid date")
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first_day() && date <= self.last_day()
    }

    /// The financial year a local calendar date falls in.
    pub fn containing(date: NaiveDate) -> Self {
        if date.month() >= 4 {
            Self(date.year())
        } else {
            Self(date.year() - 1)
        }
    }

    /// Validate that an inclusive date range lies within one financial year.
    pub fn single_year_range(start: NaiveDate, end: NaiveDate) -> Result<Self, AppError> {
        if start > end {
            return Err(AppError::InvalidDateRange(format!(
                "start {start} is after end {end}"
            )));
        }
        let fy = Self::containing(start);
        if !fy.contains(end) {
            return Err(AppError::InvalidDateRange(format!(
                "{start} to {end} spans more than one financial year"
            )));
        }
        Ok(fy)
    }
}

/// The UTC instant at which a local calendar day begins.
pub fn local_midnight_utc(day: NaiveDate, zone: Tz) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::MIN);
    match zone.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // A spring-forward gap can swallow midnight; the day then starts when
        // local clocks resume.
        LocalResult::None => {
            let mut probe = midnight + Duration::minutes(30);
            loop {
                if let Some(dt) = zone.from_local_datetime(&probe).earliest() {
                    break dt.with_timezone(&Utc);
                }
                probe += Duration::minutes(30);
            }
        }
    }
}

/// The half-open UTC window covering one local calendar day.
pub fn day_window_utc(day: NaiveDate, zone: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        local_midnight_utc(day, zone),
        local_midnight_utc(day + Duration::days(1), zone),
    )
}

/// First day of the month a local date falls in, used for monthly buckets.
pub fn month_of(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).expect("first of month is a valid date")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().expect("test date")
    }

    #[test]
    fn financial_year_runs_april_to_march() {
        let fy = FinancialYear::new(2019);
        assert_eq!(fy.first_day(), date("2019-04-01"));
        assert_eq!(fy.last_day(), date("2020-03-31"));
        assert!(fy.contains(date("2020-01-15")));
        assert!(!fy.contains(date("2020-04-01")));
    }

    #[test]
    fn containing_splits_at_april() {
        assert_eq!(FinancialYear::containing(date("2019-03-31")).start_year(), 2018);
        assert_eq!(FinancialYear::containing(date("2019-04-01")).start_year(), 2019);
    }

    #[test]
    fn single_year_range_rejects_spans() {
        assert!(FinancialYear::single_year_range(date("2019-05-01"), date("2019-06-30")).is_ok());
        assert!(matches!(
            FinancialYear::single_year_range(date("2019-03-01"), date("2019-04-02")),
            Err(AppError::InvalidDateRange(_))
        ));
        assert!(matches!(
            FinancialYear::single_year_range(date("2019-06-01"), date("2019-05-01")),
            Err(AppError::InvalidDateRange(_))
        ));
    }

    #[test]
    fn london_midnight_is_utc_2300_in_summer() {
        let zone: Tz = "Europe/London".parse().expect("zone");
        let instant = local_midnight_utc(date("2018-10-01"), zone);
        assert_eq!(instant.to_rfc3339(), "2018-09-30T23:00:00+00:00");

        let winter = local_midnight_utc(date("2018-12-01"), zone);
        assert_eq!(winter.to_rfc3339(), "2018-12-01T00:00:00+00:00");
    }
}
