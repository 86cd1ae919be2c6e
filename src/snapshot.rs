//! Per-feed-timestamp vehicle positions.
//!
//! Live coordinates are projected onto the trip path; trips without
//! coordinates are placed by interpolating between the expected times of
//! their next two onward stops.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::geometry::Coord;
use crate::live_index::{LiveIndex, LiveTrip};
use crate::static_index::StaticIndex;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TripPosition {
    pub coord: Option<Coord>,
    pub bearing: Option<f64>,
    pub distance_along_route_km: Option<f64>,
    /// Next stop the vehicle has not yet passed.
    pub immediate_stop_id: Option<String>,
    /// Position derived from the schedule rather than observed.
    pub interpolated: bool,
}

#[derive(Debug)]
pub struct Snapshot {
    feed_timestamp: i64,
    trips: Arc<HashMap<String, TripPosition>>,
    prior: Option<Arc<Snapshot>>,
}

impl Snapshot {
    pub fn build(live: &LiveIndex, static_index: &StaticIndex, now: i64) -> Self {
        let trips: HashMap<String, TripPosition> = live
            .trips()
            .iter()
            .map(|trip| (trip.trip_id.clone(), locate(trip, static_index, now)))
            .collect();
        debug!(
            trips = trips.len(),
            interpolated = trips.values().filter(|p| p.interpolated).count(),
            "Snapshot positions located"
        );
        Self {
            feed_timestamp: live.feed_timestamp(),
            trips: Arc::new(trips),
            prior: None,
        }
    }

    /// Links `prior` as the previous snapshot, dropping its own history.
    fn with_prior(mut self, prior: Option<&Snapshot>) -> Self {
        self.prior = prior.map(|p| {
            Arc::new(Snapshot {
                feed_timestamp: p.feed_timestamp,
                trips: Arc::clone(&p.trips),
                prior: None,
            })
        });
        self
    }

    pub fn feed_timestamp(&self) -> i64 {
        self.feed_timestamp
    }

    pub fn trip(&self, trip_id: &str) -> Option<&TripPosition> {
        self.trips.get(trip_id)
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }

    pub fn prior(&self) -> Option<&Snapshot> {
        self.prior.as_deref()
    }
}

/// Snapshot of one live generation, built on first use and reused while the
/// feed timestamp has not advanced. The last snapshot of the previous
/// generation is only ever linked as the prior, never served.
#[derive(Debug, Default)]
pub struct SnapshotTracker {
    current: Mutex<Option<Arc<Snapshot>>>,
    prior: Option<Arc<Snapshot>>,
}

impl SnapshotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker for the generation replacing the one `previous` served.
    pub fn following(previous: &SnapshotTracker) -> Self {
        Self {
            current: Mutex::new(None),
            prior: previous.latest().or_else(|| previous.prior.clone()),
        }
    }

    /// Most recent snapshot built by this tracker.
    pub fn latest(&self) -> Option<Arc<Snapshot>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot for the live index, built only when its feed timestamp is
    /// newer than the last one.
    pub fn snapshot(&self, live: &LiveIndex, static_index: &StaticIndex, now: i64) -> Arc<Snapshot> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = current.as_ref() {
            if live.feed_timestamp() <= prev.feed_timestamp {
                return Arc::clone(prev);
            }
        }
        debug!(feed_timestamp = live.feed_timestamp(), "Building snapshot");
        let prior = current.as_deref().or(self.prior.as_deref());
        let built = Arc::new(Snapshot::build(live, static_index, now).with_prior(prior));
        *current = Some(Arc::clone(&built));
        built
    }
}

fn locate(trip: &LiveTrip, static_index: &StaticIndex, now: i64) -> TripPosition {
    let stop_distances = onward_distances(trip, static_index);
    let path = static_index.trip_path(&trip.trip_id);

    let (coord, distance, interpolated) = match trip.position {
        Some(coord) => {
            let distance = path.as_ref().and_then(|p| p.view().distance_along(coord));
            (Some(coord), distance, false)
        }
        None => match interpolate_distance(trip, &stop_distances, now) {
            Some(distance) => {
                let coord = path.as_ref().and_then(|p| p.view().coordinate_at(distance));
                (coord, Some(distance), coord.is_some())
            }
            None => (None, None, false),
        },
    };

    let immediate_stop_id = match distance {
        Some(vehicle_km) => trip
            .onward_stops
            .iter()
            .zip(&stop_distances)
            .find(|(_, d)| d.is_some_and(|d| d >= vehicle_km))
            .map(|(stop, _)| stop)
            .or_else(|| trip.onward_stops.first()),
        None => trip.onward_stops.first(),
    }
    .map(|stop| stop.stop_id.clone());

    TripPosition {
        coord,
        bearing: trip.bearing,
        distance_along_route_km: distance,
        immediate_stop_id,
        interpolated,
    }
}

/// Distance along the trip of each onward stop, aligned with `onward_stops`.
pub fn onward_distances(trip: &LiveTrip, static_index: &StaticIndex) -> Vec<Option<f64>> {
    let Some(static_trip) = static_index.trip(&trip.trip_id) else {
        return vec![None; trip.onward_stops.len()];
    };
    let distances = static_index.trip_stop_distances(&trip.trip_id);
    trip.onward_stops
        .iter()
        .map(|stop| {
            let index = static_trip.matching_index(&stop.stop_id, stop.stop_sequence)?;
            distances.get(index).copied().flatten()
        })
        .collect()
}

/// Distance between the first two onward stops that have both an expected
/// time and a distance, clamped to those stops.
fn interpolate_distance(trip: &LiveTrip, stop_distances: &[Option<f64>], now: i64) -> Option<f64> {
    let mut known = trip
        .onward_stops
        .iter()
        .zip(stop_distances)
        .filter_map(|(stop, d)| Some((stop.eta_or_etd()?, (*d)?)));
    let (t1, d1) = known.next()?;
    let (t2, d2) = known.next()?;

    if now <= t1 || t2 <= t1 {
        return Some(d1);
    }
    if now >= t2 {
        return Some(d2);
    }
    let fraction = (now - t1) as f64 / (t2 - t1) as f64;
    Some(d1 + (d2 - d1) * fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_index::{OnwardStop, RealtimeMessages, StopRelationship};
    use crate::static_index::StaticOptions;
    use crate::static_index::loader::MemorySource;
    use approx::assert_abs_diff_eq;

    fn trip(stops: &[(&str, Option<i64>)]) -> LiveTrip {
        LiveTrip {
            trip_id: "T".into(),
            onward_stops: stops
                .iter()
                .map(|(id, eta)| OnwardStop {
                    stop_id: id.to_string(),
                    stop_sequence: None,
                    eta: *eta,
                    etd: None,
                    schedule_relationship: StopRelationship::Scheduled,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_interpolation_between_two_etas() {
        let t = trip(&[("S1", Some(1000)), ("S2", Some(1120))]);
        let d = [Some(1.0), Some(1.6)];
        assert_abs_diff_eq!(interpolate_distance(&t, &d, 1060).unwrap(), 1.3, epsilon = 1e-9);
        assert_eq!(interpolate_distance(&t, &d, 900), Some(1.0));
        assert_eq!(interpolate_distance(&t, &d, 1000), Some(1.0));
        assert_eq!(interpolate_distance(&t, &d, 5000), Some(1.6));
    }

    #[test]
    fn test_interpolation_skips_stops_without_eta_or_distance() {
        let t = trip(&[("S0", None), ("S1", Some(1000)), ("SX", Some(1010)), ("S2", Some(1120))]);
        let d = [Some(0.2), Some(1.0), None, Some(1.6)];
        // S0 has no eta, SX no distance
        assert_abs_diff_eq!(interpolate_distance(&t, &d, 1060).unwrap(), 1.3, epsilon = 1e-9);
    }

    #[test]
    fn test_interpolation_needs_two_points() {
        let t = trip(&[("S1", Some(1000))]);
        assert_eq!(interpolate_distance(&t, &[Some(1.0)], 1000), None);
    }

    fn single_stop_index() -> StaticIndex {
        StaticIndex::load(
            &mut MemorySource::default()
                .with_table("agency.txt", "agency_id,agency_timezone\nA,UTC\n")
                .with_table("routes.txt", "route_id\nR\n")
                .with_table("stops.txt", "stop_id\nS\n")
                .with_table("trips.txt", "route_id,service_id,trip_id\nR,WK,T\n")
                .with_table("stop_times.txt", "trip_id,stop_id,stop_sequence\nT,S,1\n"),
            &StaticOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_tracker_reuses_snapshot_until_feed_timestamp_advances() {
        let static_index = single_stop_index();
        let tracker = SnapshotTracker::new();
        let empty = RealtimeMessages::default();

        let first = tracker.snapshot(&LiveIndex::build(&empty, &static_index, 100), &static_index, 100);
        let same = tracker.snapshot(&LiveIndex::build(&empty, &static_index, 100), &static_index, 150);
        assert!(Arc::ptr_eq(&first, &same));
        let older = tracker.snapshot(&LiveIndex::build(&empty, &static_index, 90), &static_index, 150);
        assert!(Arc::ptr_eq(&first, &older));

        let newer = tracker.snapshot(&LiveIndex::build(&empty, &static_index, 200), &static_index, 200);
        assert_eq!(newer.feed_timestamp(), 200);
        assert_eq!(newer.prior().map(Snapshot::feed_timestamp), Some(100));
        assert!(newer.prior().and_then(Snapshot::prior).is_none());

        let latest = tracker.snapshot(&LiveIndex::build(&empty, &static_index, 300), &static_index, 300);
        assert_eq!(latest.prior().map(Snapshot::feed_timestamp), Some(200));
        assert!(latest.prior().and_then(Snapshot::prior).is_none());
    }

    #[test]
    fn test_following_tracker_rebuilds_even_for_older_feed() {
        let static_index = single_stop_index();
        let empty = RealtimeMessages::default();
        let first = SnapshotTracker::new();
        let old = first.snapshot(&LiveIndex::build(&empty, &static_index, 500), &static_index, 500);

        let next = SnapshotTracker::following(&first);
        assert!(next.latest().is_none());
        let fresh = next.snapshot(&LiveIndex::build(&empty, &static_index, 400), &static_index, 510);
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert_eq!(fresh.feed_timestamp(), 400);
        assert_eq!(fresh.prior().map(Snapshot::feed_timestamp), Some(500));

        // a generation that never built one still passes its prior along
        let idle = SnapshotTracker::following(&SnapshotTracker::following(&first));
        let later = idle.snapshot(&LiveIndex::build(&empty, &static_index, 600), &static_index, 600);
        assert_eq!(later.prior().map(Snapshot::feed_timestamp), Some(500));
    }

    #[test]
    fn test_immediate_stop_falls_back_to_first_onward_stop() {
        let t = trip(&[("S1", None), ("S2", None)]);
        let static_index = StaticIndex::load(
            &mut MemorySource::default()
                .with_table("agency.txt", "agency_id,agency_timezone\nA,UTC\n")
                .with_table("routes.txt", "route_id\nR\n")
                .with_table("stops.txt", "stop_id\nS1\nS2\n")
                .with_table("trips.txt", "route_id,service_id,trip_id\nR,WK,other\n")
                .with_table("stop_times.txt", "trip_id,stop_id,stop_sequence\nother,S1,1\n"),
            &StaticOptions::default(),
        )
        .unwrap();
        let position = locate(&t, &static_index, 0);
        assert_eq!(position.immediate_stop_id.as_deref(), Some("S1"));
        assert!(position.coord.is_none());
        assert!(position.distance_along_route_km.is_none());
        assert!(!position.interpolated);
    }
}
