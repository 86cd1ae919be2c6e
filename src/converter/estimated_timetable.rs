//! `EstimatedTimetableDelivery`: complete journeys split into recorded and
//! estimated calls.

use tracing::debug;

use super::classify::{self, is_past};
use super::journey::{self, destination_name, published_line_name, scheduled};
use super::{BuildContext, UNKNOWN_ROUTE};
use crate::error::BuildError;
use crate::live_index::{LiveTrip, OnwardStop};
use crate::request::EstimatedTimetableQuery;
use crate::siri::{
    EstimatedCall, EstimatedCalls, EstimatedJourneyVersionFrame, EstimatedTimetableDelivery,
    EstimatedVehicleJourney, RecordedCall, RecordedCalls,
};
use crate::static_index::model::{Route, StopTime, Trip};
use crate::warnings::{WarningKind, Warnings};

pub const VERSION: &str = "2.0";

/// One stop of the journey with whatever is known about it.
struct CallRow<'a> {
    stop_id: &'a str,
    order: u32,
    scheduled: Option<&'a StopTime>,
    live: Option<&'a OnwardStop>,
}

impl CallRow<'_> {
    fn aimed_arrival(&self, ctx: &BuildContext<'_>, trip: &LiveTrip) -> Option<i64> {
        scheduled(ctx, trip, self.scheduled.and_then(StopTime::arrival_or_departure))
    }

    fn aimed_departure(&self, ctx: &BuildContext<'_>, trip: &LiveTrip) -> Option<i64> {
        scheduled(ctx, trip, self.scheduled.and_then(StopTime::departure_or_arrival))
    }

    fn cancelled(&self) -> bool {
        self.live.is_some_and(OnwardStop::is_skipped)
    }

    fn request_stop(&self) -> bool {
        self.scheduled.is_some_and(StopTime::is_request_stop)
    }
}

pub fn build(ctx: &BuildContext<'_>, query: &EstimatedTimetableQuery) -> Result<EstimatedTimetableDelivery, BuildError> {
    let mut warnings = Warnings::new();
    let mut journeys = Vec::new();
    for trip in ctx.live.trip_update_trips() {
        let static_trip = ctx.static_index.trip(&trip.trip_id);
        let route_id = journey::route_id_of(trip, static_trip);
        if let Some(line) = &query.line_ref {
            if route_id != Some(line.as_str()) {
                continue;
            }
        }
        if !ctx.operated_by(query.operator_ref.as_deref(), route_id) {
            continue;
        }
        journeys.push(vehicle_journey(ctx, trip, static_trip, route_id, &mut warnings));
        ctx.cancel.check()?;
    }

    debug!(journeys = journeys.len(), "Estimated timetable built");
    warnings.emit("estimated_timetable");
    Ok(EstimatedTimetableDelivery {
        version: VERSION.to_string(),
        response_timestamp: ctx.local_millis(ctx.now),
        estimated_journey_version_frame: vec![EstimatedJourneyVersionFrame {
            recorded_at_time: ctx.local_millis(ctx.live.feed_timestamp()),
            estimated_vehicle_journey: journeys,
        }],
    })
}

fn vehicle_journey(
    ctx: &BuildContext<'_>,
    trip: &LiveTrip,
    static_trip: Option<&Trip>,
    route_id: Option<&str>,
    warnings: &mut Warnings,
) -> EstimatedVehicleJourney {
    let route_id = match route_id {
        Some(id) => id.to_string(),
        None => {
            warnings.record(WarningKind::NoRouteId, &trip.trip_id);
            UNKNOWN_ROUTE.to_string()
        }
    };
    let route = ctx.static_index.route(&route_id);
    let rows = call_rows(trip, static_trip);
    let complete = static_trip.is_some_and(|t| !t.stop_times.is_empty());
    if !complete {
        warnings.record(WarningKind::NoStaticTimes, &trip.trip_id);
    }

    let grace = ctx.settings.grace_period_secs;
    let mut past: Vec<bool> = rows
        .iter()
        .map(|row| match row.live {
            Some(live) => is_past(live.eta, live.etd, ctx.now, grace),
            None => is_past(row.aimed_arrival(ctx, trip), row.aimed_departure(ctx, trip), ctx.now, grace),
        })
        .collect();
    classify::partition(&mut past);

    let mut recorded = Vec::new();
    let mut estimated = Vec::new();
    for (row, passed) in rows.iter().zip(past) {
        if passed {
            recorded.push(recorded_call(ctx, trip, row));
        } else {
            estimated.push(estimated_call(ctx, trip, row));
        }
    }

    let stop_name = |st: &StopTime| ctx.static_index.stop_name(&st.stop_id).map(str::to_string);
    let start_date = ctx.start_date_of(trip);
    EstimatedVehicleJourney {
        line_ref: ctx.line_ref(&route_id),
        direction_ref: trip
            .direction_id
            .clone()
            .or_else(|| static_trip.and_then(|t| t.direction_id.clone()))
            .unwrap_or_else(|| "0".to_string()),
        framed_vehicle_journey_ref: ctx.framed_journey_ref(
            &trip.trip_id,
            start_date.as_deref(),
            trip.unscheduled,
        ),
        vehicle_mode: route.and_then(Route::vehicle_mode).map(str::to_string),
        published_line_name: published_line_name(ctx.static_index, &route_id, warnings),
        operator_ref: ctx.operator_of(Some(&route_id)).to_string(),
        origin_name: static_trip.and_then(Trip::origin).and_then(stop_name),
        destination_name: destination_name(ctx.static_index, static_trip),
        monitored: !recorded.is_empty() && !estimated.is_empty(),
        block_ref: ctx.static_index.trip_block(&trip.trip_id).map(str::to_string),
        vehicle_ref: trip.vehicle_ref.clone(),
        recorded_calls: (!recorded.is_empty()).then_some(RecordedCalls {
            recorded_call: recorded,
        }),
        estimated_calls: (!estimated.is_empty()).then_some(EstimatedCalls {
            estimated_call: estimated,
        }),
        is_complete_stop_sequence: complete,
    }
}

/// The static stop sequence joined with live stops, or the live stops alone
/// when the schedule does not know the trip.
fn call_rows<'a>(trip: &'a LiveTrip, static_trip: Option<&'a Trip>) -> Vec<CallRow<'a>> {
    let Some(static_trip) = static_trip.filter(|t| !t.stop_times.is_empty()) else {
        return trip
            .onward_stops
            .iter()
            .enumerate()
            .map(|(i, stop)| CallRow {
                stop_id: &stop.stop_id,
                order: stop.stop_sequence.unwrap_or(i as u32 + 1),
                scheduled: None,
                live: Some(stop),
            })
            .collect();
    };

    let mut live: Vec<Option<&OnwardStop>> = vec![None; static_trip.stop_times.len()];
    for stop in &trip.onward_stops {
        if let Some(i) = static_trip.matching_index(&stop.stop_id, stop.stop_sequence) {
            if live[i].is_none() {
                live[i] = Some(stop);
            }
        }
    }
    static_trip
        .stop_times
        .iter()
        .zip(live)
        .map(|(st, live)| CallRow {
            stop_id: &st.stop_id,
            order: st.stop_sequence,
            scheduled: Some(st),
            live,
        })
        .collect()
}

fn recorded_call(ctx: &BuildContext<'_>, trip: &LiveTrip, row: &CallRow<'_>) -> RecordedCall {
    RecordedCall {
        stop_point_ref: ctx.settings.field_mutators.stop_point_ref(row.stop_id),
        order: row.order,
        stop_point_name: ctx.static_index.stop_name(row.stop_id).map(str::to_string),
        cancellation: row.cancelled(),
        request_stop: row.request_stop(),
        aimed_arrival_time: row.aimed_arrival(ctx, trip).map(|t| ctx.local(t)),
        actual_arrival_time: row.live.and_then(|l| l.eta).map(|t| ctx.local(t)),
        aimed_departure_time: row.aimed_departure(ctx, trip).map(|t| ctx.local(t)),
        actual_departure_time: row.live.and_then(|l| l.etd).map(|t| ctx.local(t)),
    }
}

fn estimated_call(ctx: &BuildContext<'_>, trip: &LiveTrip, row: &CallRow<'_>) -> EstimatedCall {
    let aimed_arrival = row.aimed_arrival(ctx, trip);
    let aimed_departure = row.aimed_departure(ctx, trip);
    let expected_arrival = row.live.and_then(OnwardStop::eta_or_etd).or(aimed_arrival);
    let expected_departure = row.live.and_then(OnwardStop::etd_or_eta).or(aimed_departure);
    EstimatedCall {
        stop_point_ref: ctx.settings.field_mutators.stop_point_ref(row.stop_id),
        order: row.order,
        stop_point_name: ctx.static_index.stop_name(row.stop_id).map(str::to_string),
        cancellation: row.cancelled(),
        request_stop: row.request_stop(),
        aimed_arrival_time: aimed_arrival.map(|t| ctx.local(t)),
        expected_arrival_time: expected_arrival.map(|t| ctx.local(t)),
        arrival_status: classify::status(classify::delay(expected_arrival, aimed_arrival)).to_string(),
        aimed_departure_time: aimed_departure.map(|t| ctx.local(t)),
        expected_departure_time: expected_departure.map(|t| ctx.local(t)),
        departure_status: classify::status(classify::delay(expected_departure, aimed_departure)).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::{CancelToken, ConverterSettings};
    use crate::gtfs_rt::trip_update::{StopTimeEvent, StopTimeUpdate, stop_time_update};
    use crate::gtfs_rt::{FeedEntity, FeedHeader, FeedMessage, TripDescriptor, TripUpdate};
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
            .with_table("routes.txt", "route_id,route_short_name\nR1,1\nR2,2\n")
            .with_table("stops.txt", "stop_id,stop_name\nA,Alpha\nB,Bravo\nC,Charlie\n")
            .with_table("trips.txt", "route_id,service_id,trip_id,block_id\nR1,WK,T1,B12\n")
            .with_table(
                "stop_times.txt",
                "trip_id,arrival_time,departure_time,stop_id,stop_sequence,pickup_type\n\
                 T1,08:00:00,08:00:00,A,1,0\nT1,08:05:00,08:05:00,B,2,0\nT1,08:10:00,08:10:00,C,3,2\n",
            );
        StaticIndex::load(&mut source, &StaticOptions::default()).unwrap()
    }

    fn stu(stop: &str, time: i64) -> StopTimeUpdate {
        let event = Some(StopTimeEvent {
            time: Some(time),
            ..Default::default()
        });
        StopTimeUpdate {
            stop_id: Some(stop.into()),
            arrival: event,
            departure: event,
            ..Default::default()
        }
    }

    fn live(index: &StaticIndex, trip_id: &str, updates: Vec<StopTimeUpdate>, now: i64) -> LiveIndex {
        let message = FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".into(),
                timestamp: Some(now as u64),
                ..Default::default()
            },
            entity: vec![FeedEntity {
                id: "1".into(),
                trip_update: Some(TripUpdate {
                    trip: TripDescriptor {
                        trip_id: Some(trip_id.into()),
                        start_date: Some("20240304".into()),
                        ..Default::default()
                    },
                    stop_time_update: updates,
                    ..Default::default()
                }),
                ..Default::default()
            }],
        };
        let messages = RealtimeMessages {
            trip_updates: Some(message),
            ..Default::default()
        };
        LiveIndex::build(&messages, index, now)
    }

    fn run(index: &StaticIndex, live: &LiveIndex, query: &EstimatedTimetableQuery, now: i64) -> EstimatedTimetableDelivery {
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
        build(&ctx, query).unwrap()
    }

    #[test]
    fn test_recorded_and_estimated_partition() {
        let index = static_index();
        let now = at(8, 7, 0);
        let live = live(&index, "T1", vec![stu("B", at(8, 5, 0)), stu("C", at(8, 10, 0))], now);
        let delivery = run(&index, &live, &EstimatedTimetableQuery::default(), now);

        assert_eq!(delivery.version, "2.0");
        assert_eq!(delivery.response_timestamp, "2024-03-04T08:07:00.000+00:00");
        let journey = &delivery.estimated_journey_version_frame[0].estimated_vehicle_journey[0];
        let recorded = &journey.recorded_calls.as_ref().unwrap().recorded_call;
        let estimated = &journey.estimated_calls.as_ref().unwrap().estimated_call;
        assert_eq!(recorded.iter().map(|c| c.order).collect::<Vec<_>>(), [1, 2]);
        assert_eq!(estimated.iter().map(|c| c.order).collect::<Vec<_>>(), [3]);
        assert!(recorded[0].actual_departure_time.is_none());
        assert_eq!(recorded[1].actual_departure_time.as_deref(), Some("2024-03-04T08:05:00+00:00"));
        assert_eq!(estimated[0].arrival_status, "onTime");
        assert!(estimated[0].request_stop);
        assert!(journey.monitored);
        assert!(journey.is_complete_stop_sequence);
        assert_eq!(journey.origin_name.as_deref(), Some("Alpha"));
        assert_eq!(journey.destination_name.as_deref(), Some("Charlie"));
        assert_eq!(journey.published_line_name, "1");
        assert_eq!(journey.block_ref.as_deref(), Some("B12"));
    }

    #[test]
    fn test_skipped_stop_is_cancelled() {
        let index = static_index();
        let now = at(7, 50, 0);
        let mut skipped = stu("B", at(8, 5, 0));
        skipped.schedule_relationship = Some(stop_time_update::ScheduleRelationship::Skipped as i32);
        let live = live(&index, "T1", vec![skipped], now);
        let delivery = run(&index, &live, &EstimatedTimetableQuery::default(), now);
        let journey = &delivery.estimated_journey_version_frame[0].estimated_vehicle_journey[0];
        let estimated = &journey.estimated_calls.as_ref().unwrap().estimated_call;
        assert_eq!(estimated.len(), 3);
        assert!(!estimated[0].cancellation);
        assert!(estimated[1].cancellation);
        assert!(journey.recorded_calls.is_none());
        assert!(!journey.monitored);
        // no live data: expected falls back to aimed
        assert_eq!(estimated[0].expected_departure_time, estimated[0].aimed_departure_time);
    }

    #[test]
    fn test_unknown_trip_uses_live_stops_only() {
        let index = static_index();
        let now = at(8, 0, 0);
        let live = live(&index, "ghost", vec![stu("B", at(8, 5, 0)), stu("C", at(8, 9, 0))], now);
        let delivery = run(&index, &live, &EstimatedTimetableQuery::default(), now);
        let journey = &delivery.estimated_journey_version_frame[0].estimated_vehicle_journey[0];
        assert!(!journey.is_complete_stop_sequence);
        assert_eq!(journey.line_ref, "MTA:Line:UNKNOWN");
        let estimated = &journey.estimated_calls.as_ref().unwrap().estimated_call;
        assert_eq!(estimated.iter().map(|c| c.order).collect::<Vec<_>>(), [1, 2]);
        assert!(estimated.iter().all(|c| c.aimed_arrival_time.is_none()));
        assert!(estimated.iter().all(|c| c.arrival_status == "onTime"));
    }

    #[test]
    fn test_line_filter_excludes_other_routes() {
        let index = static_index();
        let now = at(8, 0, 0);
        let live = live(&index, "T1", vec![stu("B", at(8, 5, 0))], now);
        let query = EstimatedTimetableQuery {
            line_ref: Some("R2".into()),
            ..Default::default()
        };
        let delivery = run(&index, &live, &query, now);
        assert!(delivery.estimated_journey_version_frame[0].estimated_vehicle_journey.is_empty());
    }
}
