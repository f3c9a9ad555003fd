//! Clock capability.
//!
//! "Today" is an explicit dependency of the query engine rather than ambient
//! process state, so reports can be replayed against a fixed instant.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    /// The current local calendar day in the given reporting zone.
    fn today(&self, zone: Tz) -> NaiveDate {
        self.now_utc().with_timezone(&zone).date_naive()
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant, for replayed reports and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.now
    }
}
