//! One generation of real-time observations, indexed by trip and stop.
//!
//! Built from the three decoded feed messages and replaced wholesale on every
//! refresh. Any of the three messages may be absent.

pub mod alerts;

use std::collections::HashMap;

use chrono::{NaiveDate, TimeZone};
use chrono_tz::Tz;
use tracing::{debug, info};

pub use alerts::{AlertIndex, InformedEntity, LiveAlert};

use crate::geometry::Coord;
use crate::gtfs_rt::trip_update::StopTimeEvent;
use crate::gtfs_rt::{FeedMessage, TripUpdate, VehiclePosition, trip_descriptor};
use crate::static_index::StaticIndex;
use crate::static_index::model::{StopTime, Trip};
use crate::static_index::time::{closest_service_date, parse_service_date, scheduled_epoch};
use crate::warnings::{WarningKind, Warnings};

pub use crate::gtfs_rt::trip_update::stop_time_update::ScheduleRelationship as StopRelationship;

/// The three live feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    TripUpdates,
    VehiclePositions,
    Alerts,
}

impl FeedKind {
    pub const ALL: [FeedKind; 3] = [
        FeedKind::TripUpdates,
        FeedKind::VehiclePositions,
        FeedKind::Alerts,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FeedKind::TripUpdates => "trip_updates",
            FeedKind::VehiclePositions => "vehicle_positions",
            FeedKind::Alerts => "alerts",
        }
    }
}

/// Decoded messages of one fetch cycle. `None` marks a feed that failed.
#[derive(Debug, Default, Clone)]
pub struct RealtimeMessages {
    pub trip_updates: Option<FeedMessage>,
    pub vehicle_positions: Option<FeedMessage>,
    pub alerts: Option<FeedMessage>,
}

impl RealtimeMessages {
    pub fn get(&self, kind: FeedKind) -> Option<&FeedMessage> {
        match kind {
            FeedKind::TripUpdates => self.trip_updates.as_ref(),
            FeedKind::VehiclePositions => self.vehicle_positions.as_ref(),
            FeedKind::Alerts => self.alerts.as_ref(),
        }
    }

    pub fn set(&mut self, kind: FeedKind, message: Option<FeedMessage>) {
        match kind {
            FeedKind::TripUpdates => self.trip_updates = message,
            FeedKind::VehiclePositions => self.vehicle_positions = message,
            FeedKind::Alerts => self.alerts = message,
        }
    }
}

/// A stop still ahead of (or just passed by) a live trip.
#[derive(Debug, Clone, PartialEq)]
pub struct OnwardStop {
    pub stop_id: String,
    pub stop_sequence: Option<u32>,
    /// Expected arrival, epoch seconds.
    pub eta: Option<i64>,
    /// Expected departure, epoch seconds.
    pub etd: Option<i64>,
    pub schedule_relationship: StopRelationship,
}

impl OnwardStop {
    pub fn eta_or_etd(&self) -> Option<i64> {
        self.eta.or(self.etd)
    }

    pub fn etd_or_eta(&self) -> Option<i64> {
        self.etd.or(self.eta)
    }

    pub fn is_skipped(&self) -> bool {
        self.schedule_relationship == StopRelationship::Skipped
    }
}

#[derive(Debug, Clone, Default)]
pub struct LiveTrip {
    pub trip_id: String,
    pub route_id: Option<String>,
    pub direction_id: Option<String>,
    /// `YYYYMMDD` as published.
    pub start_date: Option<String>,
    /// Published start date, or the inferred one when absent.
    pub service_date: Option<NaiveDate>,
    pub vehicle_ref: Option<String>,
    pub position: Option<Coord>,
    pub bearing: Option<f64>,
    pub speed: Option<f64>,
    pub congestion_level: Option<i32>,
    pub occupancy_status: Option<i32>,
    pub vehicle_timestamp: Option<i64>,
    pub trip_update_timestamp: Option<i64>,
    pub onward_stops: Vec<OnwardStop>,
    pub has_trip_update: bool,
    /// Added or unscheduled service not in the timetable.
    pub unscheduled: bool,
}

impl LiveTrip {
    pub fn onward_stop(&self, stop_id: &str) -> Option<&OnwardStop> {
        self.onward_stops.iter().find(|s| s.stop_id == stop_id)
    }

    /// Time the observation was made: vehicle timestamp, else trip update timestamp.
    pub fn recorded_at(&self) -> Option<i64> {
        self.vehicle_timestamp.or(self.trip_update_timestamp)
    }
}

#[derive(Debug, Default)]
pub struct LiveIndex {
    feed_timestamp: i64,
    trips: Vec<LiveTrip>,
    by_trip: HashMap<String, usize>,
    by_stop: HashMap<String, Vec<usize>>,
    alerts: AlertIndex,
    trip_update_count: usize,
    vehicle_position_count: usize,
    missing_feeds: Vec<FeedKind>,
    warnings: Warnings,
}

impl LiveIndex {
    /// Indexes one message set. `now` (epoch seconds) stands in for the feed
    /// timestamp when no header carries one.
    #[tracing::instrument(skip_all, fields(now = now))]
    pub fn build(messages: &RealtimeMessages, static_index: &StaticIndex, now: i64) -> Self {
        let feed_timestamp = FeedKind::ALL
            .iter()
            .filter_map(|kind| messages.get(*kind))
            .filter_map(|m| m.header.timestamp)
            .map(|t| t as i64)
            .max()
            .unwrap_or(now);

        let mut index = LiveIndex {
            feed_timestamp,
            missing_feeds: FeedKind::ALL
                .into_iter()
                .filter(|kind| messages.get(*kind).is_none())
                .collect(),
            ..Default::default()
        };

        let tz = static_index.timezone();
        if let Some(message) = &messages.trip_updates {
            for entity in &message.entity {
                if entity.is_deleted.unwrap_or(false) {
                    continue;
                }
                if let Some(tu) = &entity.trip_update {
                    index.trip_update_count += 1;
                    index.ingest_trip_update(&entity.id, tu, static_index, tz, now);
                }
            }
        }

        if let Some(message) = &messages.vehicle_positions {
            for entity in &message.entity {
                if entity.is_deleted.unwrap_or(false) {
                    continue;
                }
                if let Some(vp) = &entity.vehicle {
                    index.vehicle_position_count += 1;
                    index.ingest_vehicle_position(&entity.id, vp, static_index, tz, now);
                }
            }
        }

        for (position, trip) in index.trips.iter().enumerate() {
            for stop in &trip.onward_stops {
                let slot = index.by_stop.entry(stop.stop_id.clone()).or_default();
                if slot.last() != Some(&position) {
                    slot.push(position);
                }
            }
        }

        index.alerts = AlertIndex::build(messages.alerts.as_ref(), static_index);

        info!(
            feed_timestamp,
            trips = index.trips.len(),
            trip_updates = index.trip_update_count,
            vehicle_positions = index.vehicle_position_count,
            alerts = index.alerts.len(),
            missing = ?index.missing_feeds.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            "Live index built"
        );
        index.warnings.emit("live_index");
        index
    }

    fn ingest_trip_update(
        &mut self,
        entity_id: &str,
        tu: &TripUpdate,
        static_index: &StaticIndex,
        tz: Tz,
        now: i64,
    ) {
        let Some(trip_id) = tu.trip.trip_id.as_deref().filter(|id| !id.is_empty()) else {
            self.warnings.record(WarningKind::NoTripId, entity_id);
            return;
        };
        if self.by_trip.contains_key(trip_id) {
            self.warnings.record(WarningKind::DuplicateTrip, trip_id);
            return;
        }

        let static_trip = static_index.trip(trip_id);
        if static_trip.is_none() {
            self.warnings.record(WarningKind::TripNotInStatic, trip_id);
        }

        let mut raw = Vec::with_capacity(tu.stop_time_update.len());
        for stu in &tu.stop_time_update {
            let stop_id = stu
                .stop_id
                .clone()
                .filter(|id| !id.is_empty())
                .or_else(|| {
                    let seq = stu.stop_sequence?;
                    Some(static_trip?.stop_time_by_sequence(seq)?.stop_id.clone())
                });
            let Some(stop_id) = stop_id else {
                self.warnings.record(WarningKind::NoStopId, trip_id);
                continue;
            };
            raw.push(RawStop {
                stop_id,
                stop_sequence: stu.stop_sequence,
                arrival: stu.arrival.as_ref().map(EventTime::from_event),
                departure: stu.departure.as_ref().map(EventTime::from_event),
                schedule_relationship: stu.schedule_relationship(),
            });
        }

        let start_date = tu.trip.start_date.clone().filter(|d| !d.is_empty());
        let service_date = match start_date.as_deref().and_then(parse_service_date) {
            Some(date) => Some(date),
            None => {
                self.warnings.record(WarningKind::NoStartDate, trip_id);
                infer_service_date(static_trip, &raw, tz, now)
            }
        };

        let onward_stops = raw
            .into_iter()
            .map(|stop| stop.resolve(static_trip, service_date, tz))
            .collect();

        let unscheduled = matches!(
            tu.trip.schedule_relationship(),
            trip_descriptor::ScheduleRelationship::Added
                | trip_descriptor::ScheduleRelationship::Unscheduled
        );

        let trip = LiveTrip {
            trip_id: trip_id.to_string(),
            route_id: tu.trip.route_id.clone().filter(|id| !id.is_empty()),
            direction_id: tu.trip.direction_id.map(|d| d.to_string()),
            start_date,
            service_date,
            vehicle_ref: tu.vehicle.as_ref().and_then(vehicle_label),
            trip_update_timestamp: tu.timestamp.map(|t| t as i64),
            onward_stops,
            has_trip_update: true,
            unscheduled,
            ..Default::default()
        };
        self.by_trip.insert(trip.trip_id.clone(), self.trips.len());
        self.trips.push(trip);
    }

    fn ingest_vehicle_position(
        &mut self,
        entity_id: &str,
        vp: &VehiclePosition,
        static_index: &StaticIndex,
        tz: Tz,
        now: i64,
    ) {
        let Some(descriptor) = &vp.trip else {
            self.warnings.record(WarningKind::NoTripId, entity_id);
            return;
        };
        let Some(trip_id) = descriptor.trip_id.as_deref().filter(|id| !id.is_empty()) else {
            self.warnings.record(WarningKind::NoTripId, entity_id);
            return;
        };

        let position = match self.by_trip.get(trip_id).copied() {
            Some(position) => position,
            None => {
                let static_trip = static_index.trip(trip_id);
                if static_trip.is_none() {
                    self.warnings.record(WarningKind::TripNotInStatic, trip_id);
                }
                let start_date = descriptor.start_date.clone().filter(|d| !d.is_empty());
                let service_date = match start_date.as_deref().and_then(parse_service_date) {
                    Some(date) => Some(date),
                    None => {
                        self.warnings.record(WarningKind::NoStartDate, trip_id);
                        infer_service_date(static_trip, &[], tz, now)
                    }
                };
                debug!(trip_id, "Vehicle position without trip update");
                self.trips.push(LiveTrip {
                    trip_id: trip_id.to_string(),
                    route_id: descriptor.route_id.clone().filter(|id| !id.is_empty()),
                    direction_id: descriptor.direction_id.map(|d| d.to_string()),
                    start_date,
                    service_date,
                    ..Default::default()
                });
                self.by_trip.insert(trip_id.to_string(), self.trips.len() - 1);
                self.trips.len() - 1
            }
        };

        let trip = &mut self.trips[position];
        if trip.vehicle_ref.is_none() {
            trip.vehicle_ref = vp.vehicle.as_ref().and_then(vehicle_label);
        }
        if trip.route_id.is_none() {
            trip.route_id = descriptor.route_id.clone().filter(|id| !id.is_empty());
        }
        if trip.direction_id.is_none() {
            trip.direction_id = descriptor.direction_id.map(|d| d.to_string());
        }
        if let Some(p) = &vp.position {
            trip.position = Some(Coord::new(f64::from(p.longitude), f64::from(p.latitude)));
            trip.bearing = p.bearing.map(f64::from);
            trip.speed = p.speed.map(f64::from);
        }
        trip.congestion_level = vp.congestion_level;
        trip.occupancy_status = vp.occupancy_status;
        trip.vehicle_timestamp = vp.timestamp.map(|t| t as i64);
    }

    /// Max of the header timestamps, else the build-time clock.
    pub fn feed_timestamp(&self) -> i64 {
        self.feed_timestamp
    }

    /// Every live trip, in feed order.
    pub fn trips(&self) -> &[LiveTrip] {
        &self.trips
    }

    pub fn trip(&self, trip_id: &str) -> Option<&LiveTrip> {
        self.by_trip.get(trip_id).map(|i| &self.trips[*i])
    }

    /// Trips with a trip update, in feed order.
    pub fn trip_update_trips(&self) -> impl Iterator<Item = &LiveTrip> {
        self.trips.iter().filter(|t| t.has_trip_update)
    }

    /// Trips whose onward stops include `stop_id`.
    pub fn trips_at_stop(&self, stop_id: &str) -> impl Iterator<Item = &LiveTrip> {
        self.by_stop
            .get(stop_id)
            .into_iter()
            .flatten()
            .map(|i| &self.trips[*i])
    }

    pub fn alerts(&self) -> &AlertIndex {
        &self.alerts
    }

    pub fn trip_update_count(&self) -> usize {
        self.trip_update_count
    }

    pub fn vehicle_position_count(&self) -> usize {
        self.vehicle_position_count
    }

    pub fn missing_feeds(&self) -> &[FeedKind] {
        &self.missing_feeds
    }

    pub fn warnings(&self) -> &Warnings {
        &self.warnings
    }
}

fn vehicle_label(vehicle: &crate::gtfs_rt::VehicleDescriptor) -> Option<String> {
    vehicle
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .or_else(|| vehicle.label.clone().filter(|l| !l.is_empty()))
}

#[derive(Debug, Clone, Copy)]
struct EventTime {
    time: Option<i64>,
    delay: Option<i32>,
}

impl EventTime {
    fn from_event(event: &StopTimeEvent) -> Self {
        Self {
            time: event.time.filter(|t| *t > 0),
            delay: event.delay,
        }
    }
}

#[derive(Debug)]
struct RawStop {
    stop_id: String,
    stop_sequence: Option<u32>,
    arrival: Option<EventTime>,
    departure: Option<EventTime>,
    schedule_relationship: StopRelationship,
}

impl RawStop {
    fn observed(&self) -> Option<i64> {
        self.arrival
            .and_then(|e| e.time)
            .or_else(|| self.departure.and_then(|e| e.time))
    }

    fn resolve(self, trip: Option<&Trip>, date: Option<NaiveDate>, tz: Tz) -> OnwardStop {
        let row = trip.and_then(|t| t.matching_stop_time(&self.stop_id, self.stop_sequence));
        let scheduled = |secs: Option<u32>| -> Option<i64> { scheduled_epoch(date?, tz, secs?) };
        let eta = self.arrival.and_then(|e| {
            e.time.or_else(|| {
                let base = scheduled(row.and_then(StopTime::arrival_or_departure))?;
                Some(base + i64::from(e.delay?))
            })
        });
        let etd = self.departure.and_then(|e| {
            e.time.or_else(|| {
                let base = scheduled(row.and_then(StopTime::departure_or_arrival))?;
                Some(base + i64::from(e.delay?))
            })
        });
        OnwardStop {
            stop_id: self.stop_id,
            stop_sequence: self.stop_sequence,
            eta,
            etd,
            schedule_relationship: self.schedule_relationship,
        }
    }
}

/// Service date for a trip without a published start date.
///
/// The first stop carrying both an absolute live time and a scheduled time
/// decides; otherwise the origin departure is compared with `now`. Trips
/// unknown to the schedule use the local date of `now`.
fn infer_service_date(trip: Option<&Trip>, raw: &[RawStop], tz: Tz, now: i64) -> Option<NaiveDate> {
    if let Some(trip) = trip {
        for stop in raw {
            let Some(observed) = stop.observed() else {
                continue;
            };
            let scheduled = trip.matching_stop_time(&stop.stop_id, stop.stop_sequence)
                .and_then(StopTime::arrival_or_departure);
            if let Some(scheduled) = scheduled {
                return closest_service_date(scheduled, observed, tz);
            }
        }
        if let Some(origin) = trip.origin().and_then(StopTime::departure_or_arrival) {
            return closest_service_date(origin, now, tz);
        }
    }
    tz.timestamp_opt(now, 0).single().map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::trip_update::StopTimeUpdate;
    use crate::gtfs_rt::{
        FeedEntity, FeedHeader, Position, TripDescriptor, VehicleDescriptor, vehicle_position,
    };
    use crate::static_index::StaticOptions;
    use crate::static_index::loader::MemorySource;
    use chrono::Utc;

    #[test]
    fn test_feed_timestamp_is_max_header_or_now() {
        let index = static_index();
        let messages = RealtimeMessages {
            trip_updates: Some(feed(Some(100), vec![])),
            vehicle_positions: Some(feed(Some(300), vec![])),
            alerts: Some(feed(None, vec![])),
        };
        assert_eq!(LiveIndex::build(&messages, &index, 5).feed_timestamp(), 300);

        let live = LiveIndex::build(&RealtimeMessages::default(), &index, 42);
        assert_eq!(live.feed_timestamp(), 42);
        assert_eq!(live.missing_feeds().len(), 3);
        assert!(live.trips().is_empty());
    }

    #[test]
    fn test_trip_update_vehicle_ref_wins_over_vehicle_position() {
        let index = static_index();
        let mut tu = trip_update("T1", Some("20240304"), vec![stu("B", Some(at(8, 6, 45)), None)]);
        tu.vehicle = Some(VehicleDescriptor {
            id: Some("bus-tu".into()),
            ..Default::default()
        });
        let mut vp = vehicle_position("T1");
        vp.vehicle = Some(VehicleDescriptor {
            id: Some("bus-vp".into()),
            ..Default::default()
        });

        let messages = RealtimeMessages {
            trip_updates: Some(feed(None, vec![tu_entity(tu)])),
            vehicle_positions: Some(feed(None, vec![vp_entity(vp)])),
            alerts: None,
        };
        let live = LiveIndex::build(&messages, &index, at(8, 6, 0));
        let trip = live.trip("T1").unwrap();
        assert_eq!(trip.vehicle_ref.as_deref(), Some("bus-tu"));
        assert_eq!(trip.position, Some(Coord::new(-73.5, 40.5)));
        assert_eq!(trip.bearing, Some(90.0));
        assert_eq!(trip.occupancy_status, Some(vehicle_position::OccupancyStatus::Full as i32));
        assert_eq!(live.trips().len(), 1);
        assert_eq!(live.vehicle_position_count(), 1);
    }

    #[test]
    fn test_vehicle_position_only_trip_is_indexed() {
        let index = static_index();
        let messages = RealtimeMessages {
            vehicle_positions: Some(feed(None, vec![vp_entity(vehicle_position("T1"))])),
            ..Default::default()
        };
        let live = LiveIndex::build(&messages, &index, at(8, 1, 0));
        let trip = live.trip("T1").unwrap();
        assert!(!trip.has_trip_update);
        assert!(trip.onward_stops.is_empty());
        assert_eq!(trip.vehicle_ref, None);
        assert_eq!(live.trip_update_trips().count(), 0);
        assert_eq!(live.warnings().count(WarningKind::NoStartDate), 1);
    }

    #[test]
    fn test_delay_only_event_resolves_against_schedule() {
        let index = static_index();
        let mut update = stu("B", None, None);
        update.departure = Some(StopTimeEvent {
            delay: Some(105),
            ..Default::default()
        });
        let tu = trip_update("T1", Some("20240304"), vec![update]);
        let messages = RealtimeMessages {
            trip_updates: Some(feed(None, vec![tu_entity(tu)])),
            ..Default::default()
        };
        let live = LiveIndex::build(&messages, &index, at(8, 6, 0));
        let stop = &live.trip("T1").unwrap().onward_stops[0];
        assert_eq!(stop.etd, Some(at(8, 6, 45)));
        assert_eq!(stop.eta, None);
    }

    #[test]
    fn test_stop_sequence_only_update_resolves_stop_id() {
        let index = static_index();
        let update = StopTimeUpdate {
            stop_sequence: Some(3),
            arrival: Some(StopTimeEvent {
                time: Some(at(8, 10, 0)),
                ..Default::default()
            }),
            ..Default::default()
        };
        let orphan = StopTimeUpdate {
            stop_sequence: Some(99),
            ..Default::default()
        };
        let tu = trip_update("T1", Some("20240304"), vec![update, orphan]);
        let messages = RealtimeMessages {
            trip_updates: Some(feed(None, vec![tu_entity(tu)])),
            ..Default::default()
        };
        let live = LiveIndex::build(&messages, &index, at(8, 0, 0));
        let trip = live.trip("T1").unwrap();
        assert_eq!(trip.onward_stops.len(), 1);
        assert_eq!(trip.onward_stops[0].stop_id, "C");
        assert_eq!(live.trips_at_stop("C").count(), 1);
        assert_eq!(live.trips_at_stop("A").count(), 0);
        assert_eq!(live.warnings().count(WarningKind::NoStopId), 1);
    }

    #[test]
    fn test_missing_start_date_is_inferred() {
        let index = static_index();
        let tu = trip_update("T1", None, vec![stu("B", Some(at(8, 6, 0)), None)]);
        let messages = RealtimeMessages {
            trip_updates: Some(feed(None, vec![tu_entity(tu)])),
            ..Default::default()
        };
        let live = LiveIndex::build(&messages, &index, at(8, 0, 0));
        let trip = live.trip("T1").unwrap();
        assert_eq!(trip.start_date, None);
        assert_eq!(trip.service_date, NaiveDate::from_ymd_opt(2024, 3, 4));
        assert_eq!(live.warnings().count(WarningKind::NoStartDate), 1);
    }

    #[test]
    fn test_schedule_relationship_preserved_and_duplicates_dropped() {
        let index = static_index();
        let mut skipped = stu("B", None, None);
        skipped.schedule_relationship = Some(StopRelationship::Skipped as i32);
        let first = trip_update("T1", Some("20240304"), vec![skipped]);
        let second = trip_update("T1", Some("20240304"), vec![]);
        let messages = RealtimeMessages {
            trip_updates: Some(feed(None, vec![tu_entity(first), tu_entity(second)])),
            ..Default::default()
        };
        let live = LiveIndex::build(&messages, &index, at(8, 0, 0));
        let trip = live.trip("T1").unwrap();
        assert!(trip.onward_stops[0].is_skipped());
        assert_eq!(live.trips().len(), 1);
        assert_eq!(live.trip_update_count(), 2);
        assert_eq!(live.warnings().count(WarningKind::DuplicateTrip), 1);
    }

    // 2024-03-04 in UTC
    fn at(h: u32, m: u32, s: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap().timestamp()
    }

    fn static_index() -> StaticIndex {
        let mut source = MemorySource::default()
            .with_table("agency.txt", "agency_id,agency_name,agency_timezone\nMTA,Metro,UTC\n")
            .with_table("routes.txt", "route_id,route_type\nR1,3\n")
            .with_table(
                "stops.txt",
                "stop_id,stop_name,stop_lat,stop_lon\nA,A,0.0,0.0\nB,B,0.01,0.0\nC,C,0.02,0.0\n",
            )
            .with_table("trips.txt", "route_id,service_id,trip_id\nR1,WK,T1\n")
            .with_table(
                "stop_times.txt",
                "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
                 T1,08:00:00,08:00:00,A,1\nT1,08:05:00,08:05:00,B,2\nT1,08:10:00,08:10:00,C,3\n",
            );
        StaticIndex::load(&mut source, &StaticOptions::default()).unwrap()
    }

    fn feed(timestamp: Option<u64>, entity: Vec<FeedEntity>) -> FeedMessage {
        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".into(),
                timestamp,
                ..Default::default()
            },
            entity,
        }
    }

    fn trip_update(trip_id: &str, start_date: Option<&str>, updates: Vec<StopTimeUpdate>) -> TripUpdate {
        TripUpdate {
            trip: TripDescriptor {
                trip_id: Some(trip_id.into()),
                start_date: start_date.map(str::to_string),
                ..Default::default()
            },
            stop_time_update: updates,
            ..Default::default()
        }
    }

    fn stu(stop_id: &str, arrival: Option<i64>, departure: Option<i64>) -> StopTimeUpdate {
        let event = |t: Option<i64>| {
            t.map(|time| StopTimeEvent {
                time: Some(time),
                ..Default::default()
            })
        };
        StopTimeUpdate {
            stop_id: Some(stop_id.into()),
            arrival: event(arrival),
            departure: event(departure),
            ..Default::default()
        }
    }

    fn vehicle_position(trip_id: &str) -> VehiclePosition {
        VehiclePosition {
            trip: Some(TripDescriptor {
                trip_id: Some(trip_id.into()),
                ..Default::default()
            }),
            position: Some(Position {
                latitude: 40.5,
                longitude: -73.5,
                bearing: Some(90.0),
                ..Default::default()
            }),
            occupancy_status: Some(vehicle_position::OccupancyStatus::Full as i32),
            ..Default::default()
        }
    }

    fn tu_entity(tu: TripUpdate) -> FeedEntity {
        FeedEntity {
            id: format!("tu-{}", tu.trip.trip_id.clone().unwrap_or_default()),
            trip_update: Some(tu),
            ..Default::default()
        }
    }

    fn vp_entity(vp: VehiclePosition) -> FeedEntity {
        FeedEntity {
            id: "vp".into(),
            vehicle: Some(vp),
            ..Default::default()
        }
    }
}
