//! Time-varying rate resolution.

use crate::models::{NotificationChannel, Rate};
use crate::period::local_midnight_utc;
use chrono::NaiveDate;
use chrono_tz::Tz;
use platform_core::error::AppError;
use rust_decimal::Decimal;
use tracing::warn;

/// Resolve the unit price in effect for a channel on a local calendar day.
///
/// The rate that applies is the one with the latest `valid_from` at or before
/// local midnight of the day. Email is always free, so it never needs a rate
/// row. SMS with no applicable rate is an error, not a zero price.
pub fn resolve_rate(
    rates: &[Rate],
    channel: NotificationChannel,
    day: NaiveDate,
    zone: Tz,
) -> Result<Decimal, AppError> {
    if channel == NotificationChannel::Email {
        return Ok(Decimal::ZERO);
    }

    let day_start = local_midnight_utc(day, zone);

    let mut best: Option<&Rate> = None;
    for rate in rates
        .iter()
        .filter(|r| r.channel == channel && r.valid_from <= day_start)
    {
        match best {
            None => best = Some(rate),
            Some(current) if rate.valid_from > current.valid_from => best = Some(rate),
            Some(current) if rate.valid_from == current.valid_from => {
                // Two rows claiming the same instant is a data problem; the
                // first one wins so resolution stays deterministic.
                warn!(
                    channel = channel.as_str(),
                    valid_from = %rate.valid_from,
                    "Duplicate rate valid_from, keeping first"
                );
            }
            Some(_) => {}
        }
    }

    best.map(|r| r.price).ok_or(AppError::MissingRate {
        channel: channel.to_string(),
        date: day,
    })
}
