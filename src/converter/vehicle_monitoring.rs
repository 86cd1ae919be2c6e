//! `VehicleMonitoringDelivery`: one activity per live trip.

use std::collections::BTreeSet;

use tracing::debug;

use super::BuildContext;
use super::journey::{self, CallChoice, JourneyOptions};
use crate::error::BuildError;
use crate::request::{DetailLevel, VehicleMonitoringQuery};
use crate::siri::{VehicleActivity, VehicleMonitoringDelivery};
use crate::warnings::Warnings;

/// Builds the delivery and collects the alerts touching the emitted trips.
pub fn build(
    ctx: &BuildContext<'_>,
    query: &VehicleMonitoringQuery,
) -> Result<(VehicleMonitoringDelivery, BTreeSet<usize>), BuildError> {
    let options = JourneyOptions {
        call: CallChoice::Next,
        onward_calls: match query.detail_level {
            DetailLevel::Calls => Some(query.max_onward_calls.unwrap_or(usize::MAX)),
            DetailLevel::Normal => None,
        },
    };

    let mut warnings = Warnings::new();
    let mut alerts = BTreeSet::new();
    let mut activities = Vec::with_capacity(ctx.live.trips().len());
    for trip in ctx.live.trips() {
        let static_trip = ctx.static_index.trip(&trip.trip_id);
        let route_id = journey::route_id_of(trip, static_trip);
        if !ctx.operated_by(query.operator_ref.as_deref(), route_id) {
            continue;
        }
        let trip_alerts = ctx.alerts_for_trip(&trip.trip_id, route_id);
        let journey = journey::monitored_vehicle_journey(ctx, trip, options, &trip_alerts, &mut warnings);
        activities.push(VehicleActivity {
            recorded_at_time: journey::recorded_at(ctx, trip),
            monitored_vehicle_journey: journey,
        });
        alerts.extend(trip_alerts);
        ctx.cancel.check()?;
    }

    debug!(activities = activities.len(), alerts = alerts.len(), "Vehicle monitoring built");
    warnings.emit("vehicle_monitoring");
    Ok((
        VehicleMonitoringDelivery {
            response_timestamp: ctx.response_timestamp(),
            valid_until: ctx.valid_until(),
            vehicle_activity: activities,
        },
        alerts,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{CancelToken, ConverterSettings};
    use crate::gtfs_rt::trip_update::{StopTimeEvent, StopTimeUpdate};
    use crate::gtfs_rt::{
        FeedEntity, FeedHeader, FeedMessage, Position, TripDescriptor, TripUpdate, VehiclePosition,
    };
    use crate::live_index::{LiveIndex, RealtimeMessages};
    use crate::snapshot::Snapshot;
    use crate::static_index::loader::MemorySource;
    use crate::static_index::{StaticIndex, StaticOptions};
    use chrono::{TimeZone, Utc};

    // 2024-03-04 in UTC
    fn at(h: u32, m: u32, s: u32) -> i64 {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap().timestamp()
    }

    fn static_index() -> StaticIndex {
        let mut source = MemorySource::default()
            .with_table("agency.txt", "agency_id,agency_timezone\nMTA,UTC\n")
            .with_table("routes.txt", "route_id,route_short_name,route_type\nR1,1,0\n")
            .with_table(
                "stops.txt",
                "stop_id,stop_name,stop_lat,stop_lon\nA,Alpha,0.0,0.0\nB,Bravo,0.0,0.01\nC,Charlie,0.0,0.02\n",
            )
            .with_table("trips.txt", "route_id,service_id,trip_id,block_id\nR1,WK,T1,BLK\n")
            .with_table(
                "stop_times.txt",
                "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
                 T1,08:00:00,08:00:00,A,1\nT1,08:05:00,08:05:00,B,2\nT1,08:10:00,08:10:00,C,3\n",
            );
        StaticIndex::load(&mut source, &StaticOptions::default()).unwrap()
    }

    fn messages(with_position: bool) -> RealtimeMessages {
        let stu = |stop: &str, seq: u32, time: i64| StopTimeUpdate {
            stop_id: Some(stop.into()),
            stop_sequence: Some(seq),
            departure: Some(StopTimeEvent {
                time: Some(time),
                ..Default::default()
            }),
            ..Default::default()
        };
        let trip = TripDescriptor {
            trip_id: Some("T1".into()),
            start_date: Some("20240304".into()),
            ..Default::default()
        };
        let header = FeedHeader {
            gtfs_realtime_version: "2.0".into(),
            timestamp: Some(at(8, 6, 0) as u64),
            ..Default::default()
        };
        let trip_updates = FeedMessage {
            header: header.clone(),
            entity: vec![FeedEntity {
                id: "tu".into(),
                trip_update: Some(TripUpdate {
                    trip: trip.clone(),
                    stop_time_update: vec![stu("B", 2, at(8, 6, 45)), stu("C", 3, at(8, 11, 45))],
                    ..Default::default()
                }),
                ..Default::default()
            }],
        };
        let vehicle_positions = FeedMessage {
            header,
            entity: vec![FeedEntity {
                id: "vp".into(),
                vehicle: Some(VehiclePosition {
                    trip: Some(trip),
                    position: Some(Position {
                        latitude: 0.0,
                        longitude: 0.008,
                        speed: Some(6.5),
                        ..Default::default()
                    }),
                    timestamp: Some(at(8, 5, 50) as u64),
                    congestion_level: Some(2),
                    ..Default::default()
                }),
                ..Default::default()
            }],
        };
        RealtimeMessages {
            trip_updates: Some(trip_updates),
            vehicle_positions: with_position.then_some(vehicle_positions),
            alerts: None,
        }
    }

    fn run(live: &LiveIndex, index: &StaticIndex, query: &VehicleMonitoringQuery) -> VehicleMonitoringDelivery {
        let now = at(8, 6, 0);
        let snapshot = Snapshot::build(live, index, now);
        let settings = ConverterSettings::default();
        let cancel = CancelToken::new();
        let ctx = BuildContext {
            static_index: index,
            live,
            snapshot: &snapshot,
            settings: &settings,
            now,
            cancel: &cancel,
        };
        build(&ctx, query).unwrap().0
    }

    #[test]
    fn test_activity_fields() {
        let index = static_index();
        let live = LiveIndex::build(&messages(true), &index, at(8, 6, 0));
        let delivery = run(&live, &index, &VehicleMonitoringQuery::default());

        assert_eq!(delivery.vehicle_activity.len(), 1);
        let activity = &delivery.vehicle_activity[0];
        assert_eq!(activity.recorded_at_time, "2024-03-04T08:05:50Z");
        let mvj = &activity.monitored_vehicle_journey;
        assert_eq!(mvj.line_ref, "MTA:Line:R1");
        assert_eq!(mvj.direction_ref, "0");
        assert_eq!(mvj.published_line_name, "1");
        assert_eq!(mvj.vehicle_mode.as_deref(), Some("tram"));
        assert_eq!(mvj.delay, "PT1M45S");
        assert_eq!(mvj.block_ref.as_deref(), Some("BLK"));
        assert_eq!(mvj.origin_name.as_deref(), Some("Alpha"));
        assert_eq!(mvj.destination_ref.as_deref(), Some("C"));
        assert_eq!(mvj.in_congestion, Some(true));
        assert_eq!(mvj.velocity, Some(6.5));
        assert!(mvj.monitored);
        assert!(mvj.onward_calls.is_none());

        let call = mvj.monitored_call.as_ref().unwrap();
        assert_eq!(call.stop_point_ref, "B");
        assert_eq!(call.stop_point_name.as_deref(), Some("Bravo"));
        assert!(!call.vehicle_at_stop);
        let distances = &call.extensions.as_ref().unwrap().distances;
        assert_eq!(distances.stops_from_call, 0);
        assert_eq!(distances.presentable_distance, "0.1 miles");
    }

    #[test]
    fn test_detail_level_calls_adds_onward_calls() {
        let index = static_index();
        let live = LiveIndex::build(&messages(true), &index, at(8, 6, 0));
        let query = VehicleMonitoringQuery {
            detail_level: DetailLevel::Calls,
            max_onward_calls: Some(5),
            ..Default::default()
        };
        let delivery = run(&live, &index, &query);
        let onward = delivery.vehicle_activity[0]
            .monitored_vehicle_journey
            .onward_calls
            .as_ref()
            .unwrap();
        assert_eq!(onward.onward_call.len(), 1);
        assert_eq!(onward.onward_call[0].stop_point_ref, "C");
        assert_eq!(
            onward.onward_call[0].aimed_arrival_time.as_deref(),
            Some("2024-03-04T08:10:00+00:00")
        );
    }

    #[test]
    fn test_location_falls_back_to_snapshot() {
        let index = static_index();
        let live = LiveIndex::build(&messages(false), &index, at(8, 6, 0));
        let delivery = run(&live, &index, &VehicleMonitoringQuery::default());
        let mvj = &delivery.vehicle_activity[0].monitored_vehicle_journey;
        // now is before the first ETA, so the vehicle sits at B
        let location = mvj.vehicle_location.unwrap();
        approx::assert_abs_diff_eq!(location.longitude, 0.01, epsilon = 1e-6);
        assert!(mvj.monitored);
        assert_eq!(mvj.in_congestion, None);
    }

    #[test]
    fn test_cancelled_build_stops() {
        let index = static_index();
        let live = LiveIndex::build(&messages(true), &index, at(8, 6, 0));
        let snapshot = Snapshot::build(&live, &index, at(8, 6, 0));
        let settings = ConverterSettings::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = BuildContext {
            static_index: &index,
            live: &live,
            snapshot: &snapshot,
            settings: &settings,
            now: at(8, 6, 0),
            cancel: &cancel,
        };
        assert!(matches!(
            build(&ctx, &VehicleMonitoringQuery::default()),
            Err(BuildError::Cancelled)
        ));
    }
}
