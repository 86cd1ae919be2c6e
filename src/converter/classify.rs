//! Past/future classification of calls and delay formatting.

/// A call is past once its live departure is behind `now`, or its live
/// arrival is more than `grace_secs` behind. Values `<= 0` count as absent.
pub fn is_past(live_arrival: Option<i64>, live_departure: Option<i64>, now: i64, grace_secs: i64) -> bool {
    if live_departure.is_some_and(|d| d > 0 && d < now) {
        return true;
    }
    live_arrival.is_some_and(|a| a > 0 && a < now - grace_secs)
}

/// Makes a per-stop classification monotone along the trip: every stop
/// before the last past stop is past as well.
pub fn partition(past: &mut [bool]) {
    if let Some(last) = past.iter().rposition(|p| *p) {
        for p in &mut past[..last] {
            *p = true;
        }
    }
}

/// ISO-8601 duration, e.g. `PT1M45S`, `-PT30S`, `PT0S`.
pub fn iso_duration(seconds: i64) -> String {
    if seconds == 0 {
        return "PT0S".to_string();
    }
    let sign = if seconds < 0 { "-" } else { "" };
    let total = seconds.unsigned_abs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);

    let mut out = format!("{sign}PT");
    if h > 0 {
        out.push_str(&format!("{h}H"));
    }
    if m > 0 {
        out.push_str(&format!("{m}M"));
    }
    if s > 0 {
        out.push_str(&format!("{s}S"));
    }
    out
}

/// Delay in seconds when both sides are known.
pub fn delay(expected: Option<i64>, aimed: Option<i64>) -> Option<i64> {
    Some(expected? - aimed?)
}

/// `ArrivalStatus` / `DepartureStatus` for a delay; unknown delays are on time.
pub fn status(delay: Option<i64>) -> &'static str {
    match delay {
        Some(d) if d <= -60 => "early",
        Some(d) if d >= 60 => "delayed",
        _ => "onTime",
    }
}
