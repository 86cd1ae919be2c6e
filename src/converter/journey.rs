//! `MonitoredVehicleJourney` shared by vehicle and stop monitoring.

use std::collections::BTreeSet;

use super::classify::{self, iso_duration};
use super::distance::presentable_distance;
use super::{BuildContext, UNKNOWN_ROUTE};
use crate::live_index::{LiveTrip, OnwardStop};
use crate::siri::{
    Distances, Extensions, MonitoredCall, MonitoredVehicleJourney, OnwardCall, OnwardCalls,
    VehicleLocation,
};
use crate::snapshot::{TripPosition, onward_distances};
use crate::static_index::StaticIndex;
use crate::static_index::model::{Route, StopTime, Trip};
use crate::static_index::time::scheduled_epoch;
use crate::warnings::{WarningKind, Warnings};

/// Vehicle within this many km of the call is at the stop.
const AT_STOP_KM: f64 = 0.05;

/// Which onward stop becomes the `MonitoredCall`.
#[derive(Debug, Clone, Copy)]
pub(crate) enum CallChoice<'q> {
    /// First onward stop not yet passed.
    Next,
    Stop(&'q str),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct JourneyOptions<'q> {
    pub call: CallChoice<'q>,
    /// `None` omits `OnwardCalls`.
    pub onward_calls: Option<usize>,
}

/// The static route of a live trip, falling back to the schedule's route id.
pub(crate) fn route_id_of<'a>(trip: &'a LiveTrip, static_trip: Option<&'a Trip>) -> Option<&'a str> {
    trip.route_id
        .as_deref()
        .or_else(|| static_trip.map(|t| t.route_id.as_str()))
}

/// Route short name, else its long name, else the route id.
pub(crate) fn published_line_name(static_index: &StaticIndex, route_id: &str, warnings: &mut Warnings) -> String {
    if let Some(name) = static_index.route_short_name(route_id) {
        return name.to_string();
    }
    warnings.record(WarningKind::NoRouteShortName, route_id);
    static_index
        .route(route_id)
        .and_then(|r| r.long_name.clone())
        .unwrap_or_else(|| route_id.to_string())
}

/// Name of the last scheduled stop, else the trip headsign.
pub(crate) fn destination_name(static_index: &StaticIndex, static_trip: Option<&Trip>) -> Option<String> {
    let static_trip = static_trip?;
    static_trip
        .destination()
        .and_then(|st| static_index.stop_name(&st.stop_id))
        .map(str::to_string)
        .or_else(|| static_trip.headsign.clone())
}

/// `RecordedAtTime` of a trip, never later than the response.
pub(crate) fn recorded_at(ctx: &BuildContext<'_>, trip: &LiveTrip) -> String {
    let at = trip.recorded_at().unwrap_or_else(|| ctx.live.feed_timestamp());
    ctx.utc(at.min(ctx.now))
}

pub(crate) fn occupancy(status: Option<i32>) -> Option<&'static str> {
    match status? {
        0 | 1 => Some("manySeatsAvailable"),
        2 => Some("seatsAvailable"),
        3 | 4 => Some("standingAvailable"),
        5 => Some("full"),
        6 | 8 => Some("notAcceptingPassengers"),
        7 => Some("unknown"),
        _ => None,
    }
}

pub(crate) fn in_congestion(level: Option<i32>) -> Option<bool> {
    match level? {
        0 | 1 => Some(false),
        2..=4 => Some(true),
        _ => None,
    }
}

/// Index of the onward stop picked by `choice`.
pub(crate) fn call_index(ctx: &BuildContext<'_>, trip: &LiveTrip, choice: CallChoice<'_>) -> Option<usize> {
    match choice {
        CallChoice::Next => {
            if trip.onward_stops.is_empty() {
                return None;
            }
            let grace = ctx.settings.grace_period_secs;
            Some(
                trip.onward_stops
                    .iter()
                    .position(|s| !classify::is_past(s.eta, s.etd, ctx.now, grace))
                    .unwrap_or(0),
            )
        }
        CallChoice::Stop(stop_id) => trip.onward_stops.iter().position(|s| s.stop_id == stop_id),
    }
}

pub(crate) fn monitored_vehicle_journey(
    ctx: &BuildContext<'_>,
    trip: &LiveTrip,
    options: JourneyOptions<'_>,
    alerts: &BTreeSet<usize>,
    warnings: &mut Warnings,
) -> MonitoredVehicleJourney {
    let static_index = ctx.static_index;
    let static_trip = static_index.trip(&trip.trip_id);

    let route_id = match route_id_of(trip, static_trip) {
        Some(id) => id.to_string(),
        None => {
            warnings.record(WarningKind::NoRouteId, &trip.trip_id);
            UNKNOWN_ROUTE.to_string()
        }
    };
    let route = static_index.route(&route_id);

    let direction_ref = trip
        .direction_id
        .clone()
        .or_else(|| static_trip.and_then(|t| t.direction_id.clone()))
        .unwrap_or_else(|| "0".to_string());

    let start_date = ctx.start_date_of(trip);
    let mutators = &ctx.settings.field_mutators;
    let origin = static_trip.and_then(Trip::origin);
    let destination = static_trip.and_then(Trip::destination);

    let position = ctx.snapshot.trip(&trip.trip_id);
    let vehicle_location = trip
        .position
        .or_else(|| position.and_then(|p| p.coord))
        .map(|c| VehicleLocation {
            longitude: c.lon,
            latitude: c.lat,
        });
    if vehicle_location.is_none() {
        warnings.record(WarningKind::NoLatLon, &trip.trip_id);
    }
    if trip.onward_stops.is_empty() {
        warnings.record(WarningKind::NoOnwardStops, &trip.trip_id);
    }

    let distances = onward_distances(trip, static_index);
    let call_at = call_index(ctx, trip, options.call);

    let mut delay = None;
    let mut monitored_call = None;
    let mut onward_calls = None;
    if let Some(call_at) = call_at {
        let stop = &trip.onward_stops[call_at];
        let row = static_trip.and_then(|t| t.matching_stop_time(&stop.stop_id, stop.stop_sequence));
        if row.is_none() {
            warnings.record(WarningKind::NoStaticTimes, &trip.trip_id);
        }
        let aimed = row.and_then(|r| scheduled(ctx, trip, r.departure_or_arrival()));
        delay = classify::delay(stop.etd_or_eta(), aimed);

        let vehicle_km = position.and_then(|p| p.distance_along_route_km);
        let vehicle_at_stop = match (distances[call_at], vehicle_km) {
            (Some(call_km), Some(vehicle_km)) => (call_km - vehicle_km).abs() <= AT_STOP_KM,
            _ => false,
        };

        monitored_call = Some(MonitoredCall {
            stop_point_ref: mutators.stop_point_ref(&stop.stop_id),
            stop_point_name: static_index.stop_name(&stop.stop_id).map(str::to_string),
            vehicle_at_stop,
            request_stop: row.is_some_and(StopTime::is_request_stop),
            aimed_arrival_time: row
                .and_then(|r| scheduled(ctx, trip, r.arrival_or_departure()))
                .map(|t| ctx.local(t)),
            expected_arrival_time: stop.eta.map(|t| ctx.local(t)),
            aimed_departure_time: aimed.map(|t| ctx.local(t)),
            expected_departure_time: stop.etd.map(|t| ctx.local(t)),
            extensions: extensions(ctx, trip, position, &distances, call_at),
        });

        if let Some(limit) = options.onward_calls {
            let calls: Vec<OnwardCall> = trip
                .onward_stops
                .iter()
                .enumerate()
                .skip(call_at + 1)
                .take(limit)
                .map(|(i, onward)| onward_call(ctx, trip, static_trip, onward, position, &distances, i))
                .collect();
            if !calls.is_empty() {
                onward_calls = Some(OnwardCalls { onward_call: calls });
            }
        }
    }

    MonitoredVehicleJourney {
        line_ref: ctx.line_ref(&route_id),
        direction_ref,
        framed_vehicle_journey_ref: ctx.framed_journey_ref(
            &trip.trip_id,
            start_date.as_deref(),
            trip.unscheduled,
        ),
        journey_pattern_ref: static_trip.and_then(|t| t.shape_id.clone()),
        published_line_name: published_line_name(static_index, &route_id, warnings),
        operator_ref: ctx.operator_of(Some(&route_id)).to_string(),
        origin_ref: origin.map(|st| mutators.origin_ref(&st.stop_id)),
        origin_name: origin
            .and_then(|st| static_index.stop_name(&st.stop_id))
            .map(str::to_string),
        destination_ref: destination.map(|st| mutators.destination_ref(&st.stop_id)),
        destination_name: destination_name(static_index, static_trip),
        situation_ref: ctx.situation_refs(alerts),
        monitored: vehicle_location.is_some() || trip.has_trip_update,
        vehicle_location,
        bearing: trip.bearing.or_else(|| position.and_then(|p| p.bearing)),
        velocity: trip.speed,
        occupancy: occupancy(trip.occupancy_status).map(str::to_string),
        in_congestion: in_congestion(trip.congestion_level),
        vehicle_mode: route.and_then(Route::vehicle_mode).map(str::to_string),
        delay: delay.map_or_else(|| iso_duration(0), iso_duration),
        block_ref: static_index.trip_block(&trip.trip_id).map(str::to_string),
        vehicle_ref: trip.vehicle_ref.clone(),
        monitored_call,
        onward_calls,
    }
}

/// Scheduled epoch of a service-day offset on the trip's service date.
pub(crate) fn scheduled(ctx: &BuildContext<'_>, trip: &LiveTrip, seconds: Option<u32>) -> Option<i64> {
    scheduled_epoch(trip.service_date?, ctx.static_index.timezone(), seconds?)
}

fn onward_call(
    ctx: &BuildContext<'_>,
    trip: &LiveTrip,
    static_trip: Option<&Trip>,
    stop: &OnwardStop,
    position: Option<&TripPosition>,
    distances: &[Option<f64>],
    at: usize,
) -> OnwardCall {
    let row = static_trip.and_then(|t| t.matching_stop_time(&stop.stop_id, stop.stop_sequence));
    OnwardCall {
        stop_point_ref: ctx.settings.field_mutators.stop_point_ref(&stop.stop_id),
        stop_point_name: ctx.static_index.stop_name(&stop.stop_id).map(str::to_string),
        aimed_arrival_time: row
            .and_then(|r| scheduled(ctx, trip, r.arrival_or_departure()))
            .map(|t| ctx.local(t)),
        expected_arrival_time: stop.eta.map(|t| ctx.local(t)),
        expected_departure_time: stop.etd.map(|t| ctx.local(t)),
        extensions: extensions(ctx, trip, position, distances, at),
    }
}

/// Distance extensions of the call at onward position `at`; omitted when the
/// vehicle or the call cannot be placed on the route.
fn extensions(
    ctx: &BuildContext<'_>,
    trip: &LiveTrip,
    position: Option<&TripPosition>,
    distances: &[Option<f64>],
    at: usize,
) -> Option<Extensions> {
    let position = position?;
    let vehicle_km = position.distance_along_route_km?;
    let call_km = distances.get(at).copied().flatten()?;

    let immediate = position
        .immediate_stop_id
        .as_deref()
        .and_then(|id| trip.onward_stops.iter().position(|s| s.stop_id == id))
        .unwrap_or(0);
    let stops_from_call = at.saturating_sub(immediate);
    let to_call_km = (call_km - vehicle_km).max(0.0);
    let to_next_km = distances
        .get(immediate)
        .copied()
        .flatten()
        .map_or(to_call_km, |next_km| (next_km - vehicle_km).max(0.0));

    Some(Extensions {
        distances: Distances {
            presentable_distance: presentable_distance(stops_from_call, to_call_km, to_next_km),
            distance_from_call: Some(ctx.round_distance(to_call_km * 1000.0)),
            stops_from_call,
            call_distance_along_route: Some(ctx.round_distance(call_km * 1000.0)),
        },
    })
}
