//! Service-day time arithmetic.
//!
//! Schedule times are seconds since the start of the service day, which is
//! "noon minus 12 hours" in the agency zone. This keeps trips that run past
//! midnight (`25:10:00`) and days with a DST change correct.

use chrono::{Duration, NaiveDate, TimeZone};
use chrono_tz::Tz;

/// Parses `HH:MM:SS` (or `H:MM:SS`) into seconds since service-day start.
/// Hours may exceed 23.
pub fn parse_service_time(value: &str) -> Option<u32> {
    let mut parts = value.trim().split(':');
    let hours: u32 = parts.next()?.parse().ok()?;
    let minutes: u32 = parts.next()?.parse().ok()?;
    let seconds: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes > 59 || seconds > 59 {
        return None;
    }
    Some(hours * 3600 + minutes * 60 + seconds)
}

/// Parses a GTFS `YYYYMMDD` date.
pub fn parse_service_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d").ok()
}

/// Epoch seconds at which the service day `date` starts in `tz`.
pub fn service_day_start(date: NaiveDate, tz: Tz) -> Option<i64> {
    let noon = date.and_hms_opt(12, 0, 0)?;
    let local_noon = tz.from_local_datetime(&noon).earliest()?;
    Some((local_noon - Duration::hours(12)).timestamp())
}

/// Epoch seconds of a schedule time on a service date.
pub fn scheduled_epoch(date: NaiveDate, tz: Tz, seconds: u32) -> Option<i64> {
    Some(service_day_start(date, tz)? + i64::from(seconds))
}

/// Picks the service date among yesterday, today and tomorrow (in `tz`) on
/// which `seconds` lands closest to `reference`.
pub fn closest_service_date(seconds: u32, reference: i64, tz: Tz) -> Option<NaiveDate> {
    let today = tz.timestamp_opt(reference, 0).single()?.date_naive();
    [today.pred_opt()?, today, today.succ_opt()?]
        .into_iter()
        .filter_map(|date| {
            let at = scheduled_epoch(date, tz, seconds)?;
            Some((date, (at - reference).abs()))
        })
        .min_by_key(|(_, gap)| *gap)
        .map(|(date, _)| date)
}
