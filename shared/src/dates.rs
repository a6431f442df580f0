//! Calendar-local date handling.
//!
//! Reservations live in a fixed named time zone (Asia/Tokyo, no DST), with
//! check-in fixed at 18:00 local and check-out at 10:00 local. Guests quote
//! dates loosely ("1/1" in late December means next January 1st), so parsed
//! dates that already lie in the past roll forward one year.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::{Error, Result};

/// Named zone sent to the calendar service alongside event times.
pub const ZONE_NAME: &str = "Asia/Tokyo";

/// Check-in is fixed at 18:00 local.
pub const CHECKIN_HOUR: u32 = 18;
/// Check-out is fixed at 10:00 local.
pub const CHECKOUT_HOUR: u32 = 10;

/// Asia/Tokyo offset. The zone has no DST, so a fixed +09:00 is exact.
pub fn zone_offset() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).unwrap()
}

/// Current instant in calendar-local time.
pub fn now_local() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&zone_offset())
}

/// Today's date formatted as `YYYY/MM/DD`.
pub fn today_string(now: DateTime<FixedOffset>) -> String {
    now.format("%Y/%m/%d").to_string()
}

/// Parse a guest-supplied date.
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, datetime forms thereof, and
/// year-less `M/D` or `M-D` (taken in the current local year; the rollover
/// in [`roll_forward`] moves past occurrences into next year).
pub fn parse_flexible_date(
    field: &str,
    input: &str,
    now: DateTime<FixedOffset>,
) -> Result<NaiveDate> {
    let s = input.trim();

    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }

    for sep in ['/', '-'] {
        if let Some((month, day)) = s.split_once(sep) {
            if let (Ok(month), Ok(day)) = (month.trim().parse(), day.trim().parse()) {
                if let Some(date) = NaiveDate::from_ymd_opt(now.year(), month, day) {
                    return Ok(date);
                }
            }
        }
    }

    Err(Error::Validation(format!(
        "{}: unrecognized date '{}'",
        field, input
    )))
}

/// Move a date already in the past forward one year.
///
/// The comparison uses the date's local midnight against `now`, so a date
/// quoted without a year in late December lands in January of next year.
pub fn roll_forward(date: NaiveDate, now: DateTime<FixedOffset>) -> NaiveDate {
    if at_local_hour(date, 0) < now {
        add_one_year(date)
    } else {
        date
    }
}

fn add_one_year(date: NaiveDate) -> NaiveDate {
    // Feb 29 has no successor next year; land on Mar 1.
    date.with_year(date.year() + 1)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(date.year() + 1, 3, 1).unwrap())
}

/// Check-in instant (18:00 local) for a stay starting on `date`.
pub fn checkin_time(date: NaiveDate) -> DateTime<FixedOffset> {
    at_local_hour(date, CHECKIN_HOUR)
}

/// Check-out instant (10:00 local) for a stay ending on `date`.
pub fn checkout_time(date: NaiveDate) -> DateTime<FixedOffset> {
    at_local_hour(date, CHECKOUT_HOUR)
}

fn at_local_hour(date: NaiveDate, hour: u32) -> DateTime<FixedOffset> {
    zone_offset()
        .from_local_datetime(&date.and_hms_opt(hour, 0, 0).unwrap())
        .unwrap()
}

/// Parse the `dateTime` field of a calendar event into its local date.
pub fn event_date(date_time: &str) -> Result<NaiveDate> {
    DateTime::parse_from_rfc3339(date_time)
        .or_else(|_| DateTime::parse_from_str(date_time, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|dt| dt.date_naive())
        .map_err(|e| Error::Upstream(format!("Invalid event datetime '{}': {}", date_time, e)))
}
