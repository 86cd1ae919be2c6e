//! `StopMonitoringDelivery`: vehicles approaching one stop.

use std::collections::BTreeSet;

use tracing::debug;

use super::BuildContext;
use super::classify;
use super::journey::{self, CallChoice, JourneyOptions};
use crate::error::BuildError;
use crate::live_index::LiveTrip;
use crate::request::StopMonitoringQuery;
use crate::siri::{MonitoredStopVisit, StopMonitoringDelivery};
use crate::warnings::Warnings;

#[derive(Debug, Clone, Copy)]
struct Candidate<'a> {
    trip: &'a LiveTrip,
    route_id: Option<&'a str>,
    /// ETA at the monitored stop, ETD when there is no ETA.
    eta: i64,
}

/// Builds the delivery and collects the alerts touching the stop or the
/// emitted trips.
pub fn build(
    ctx: &BuildContext<'_>,
    query: &StopMonitoringQuery,
) -> Result<(StopMonitoringDelivery, BTreeSet<usize>), BuildError> {
    let stop_id = query.monitoring_ref.as_str();
    let candidates: Vec<Candidate<'_>> = ctx
        .live
        .trips_at_stop(stop_id)
        .filter_map(|trip| candidate(ctx, trip, query))
        .collect();
    let total = candidates.len();
    let selected = select(
        candidates,
        query.maximum_stop_visits,
        query.minimum_stop_visits_per_line.unwrap_or(0),
    );

    let options = JourneyOptions {
        call: CallChoice::Stop(stop_id),
        onward_calls: query.max_onward_calls,
    };
    let stop_alerts: BTreeSet<usize> = ctx.live.alerts().for_stop(stop_id).iter().copied().collect();

    let mut warnings = Warnings::new();
    let mut alerts = stop_alerts.clone();
    let mut visits = Vec::with_capacity(selected.len());
    for candidate in selected {
        let trip = candidate.trip;
        let mut trip_alerts = ctx.alerts_for_trip(&trip.trip_id, candidate.route_id);
        trip_alerts.extend(stop_alerts.iter().copied());
        let journey = journey::monitored_vehicle_journey(ctx, trip, options, &trip_alerts, &mut warnings);
        visits.push(MonitoredStopVisit {
            recorded_at_time: journey::recorded_at(ctx, trip),
            monitoring_ref: stop_id.to_string(),
            monitored_vehicle_journey: journey,
        });
        alerts.extend(trip_alerts);
        ctx.cancel.check()?;
    }

    debug!(stop_id, candidates = total, visits = visits.len(), "Stop monitoring built");
    warnings.emit("stop_monitoring");
    Ok((
        StopMonitoringDelivery {
            response_timestamp: ctx.response_timestamp(),
            valid_until: ctx.valid_until(),
            monitored_stop_visit: visits,
        },
        alerts,
    ))
}

/// A trip still to call at the stop that passes the line, direction and
/// operator filters.
fn candidate<'a>(ctx: &BuildContext<'a>, trip: &'a LiveTrip, query: &StopMonitoringQuery) -> Option<Candidate<'a>> {
    let static_trip = ctx.static_index.trip(&trip.trip_id);
    let route_id = journey::route_id_of(trip, static_trip);
    if let Some(line) = &query.line_ref {
        if route_id != Some(line.as_str()) {
            return None;
        }
    }
    if !ctx.operated_by(query.operator_ref.as_deref(), route_id) {
        return None;
    }
    if let Some(direction) = &query.direction_ref {
        let trip_direction = trip
            .direction_id
            .as_deref()
            .or_else(|| static_trip.and_then(|t| t.direction_id.as_deref()));
        if trip_direction != Some(direction.as_str()) {
            return None;
        }
    }
    let stop = trip.onward_stop(&query.monitoring_ref)?;
    if classify::is_past(stop.eta, stop.etd, ctx.now, ctx.settings.grace_period_secs) {
        return None;
    }
    Some(Candidate {
        trip,
        route_id,
        eta: stop.eta.filter(|t| *t > 0).or(stop.etd).unwrap_or(i64::MAX),
    })
}

/// Picks the visits to emit, ordered by ETA.
///
/// With a maximum, each line first gets up to `min_per_line` of its earliest
/// visits, the remaining slots are filled by the earliest of the rest, and the
/// result is cut to the maximum.
fn select(mut candidates: Vec<Candidate<'_>>, maximum: Option<usize>, min_per_line: usize) -> Vec<Candidate<'_>> {
    candidates.sort_by_key(|c| c.eta);
    let Some(maximum) = maximum else {
        return candidates;
    };

    let mut taken = vec![false; candidates.len()];
    if min_per_line > 0 {
        let mut lines: Vec<(Option<&str>, usize)> = Vec::new();
        for (i, c) in candidates.iter().enumerate() {
            let slot = match lines.iter().position(|(route, _)| *route == c.route_id) {
                Some(slot) => slot,
                None => {
                    lines.push((c.route_id, 0));
                    lines.len() - 1
                }
            };
            if lines[slot].1 < min_per_line {
                lines[slot].1 += 1;
                taken[i] = true;
            }
        }
    }

    let mut remaining = maximum.saturating_sub(taken.iter().filter(|t| **t).count());
    for flag in taken.iter_mut() {
        if remaining == 0 {
            break;
        }
        if !*flag {
            *flag = true;
            remaining -= 1;
        }
    }

    candidates
        .into_iter()
        .zip(taken)
        .filter_map(|(c, keep)| keep.then_some(c))
        .take(maximum)
        .collect()
}
