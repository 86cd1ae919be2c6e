//! External trip references.
//!
//! Static lookups always use the bare trip id; a composed key only appears in
//! emitted references.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TripKeyStrategy {
    #[default]
    Raw,
    StartDateTrip,
    AgencyTrip,
    AgencyStartDateTrip,
}

/// Composes the external trip key. A missing start date drops the date part.
pub fn compose(trip_id: &str, agency: &str, start_date: Option<&str>, strategy: TripKeyStrategy) -> String {
    let date = start_date.filter(|d| !d.is_empty());
    match (strategy, date) {
        (TripKeyStrategy::Raw, _) => trip_id.to_string(),
        (TripKeyStrategy::StartDateTrip, Some(date)) => format!("{date}_{trip_id}"),
        (TripKeyStrategy::StartDateTrip, None) => trip_id.to_string(),
        (TripKeyStrategy::AgencyTrip, _) => format!("{agency}_{trip_id}"),
        (TripKeyStrategy::AgencyStartDateTrip, Some(date)) => format!("{agency}_{date}_{trip_id}"),
        (TripKeyStrategy::AgencyStartDateTrip, None) => format!("{agency}_{trip_id}"),
    }
}
