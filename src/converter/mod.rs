//! Conversion core: joins the static index, the live index and the snapshot
//! into SIRI deliveries.

pub mod classify;
pub mod distance;
pub mod estimated_timetable;
mod journey;
pub mod mutators;
pub mod situation_exchange;
pub mod stop_monitoring;
pub mod trip_key;
pub mod vehicle_monitoring;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use tracing::debug;

use crate::error::BuildError;
use crate::live_index::{LiveIndex, LiveTrip};
use crate::request::{Call, SiriRequest};
use crate::siri::{FramedVehicleJourneyRef, ServiceDelivery, Siri, SituationRef};
use crate::snapshot::Snapshot;
use crate::static_index::StaticIndex;
use mutators::FieldMutators;
use trip_key::TripKeyStrategy;

/// Route label used when neither the live feed nor the schedule knows the route.
pub const UNKNOWN_ROUTE: &str = "UNKNOWN";

#[derive(Debug, Clone)]
pub struct ConverterSettings {
    pub trip_key_strategy: TripKeyStrategy,
    /// Prefixed to the trip key of added or unscheduled trips.
    pub unscheduled_trip_indicator: String,
    pub field_mutators: FieldMutators,
    /// Decimal places of emitted distances.
    pub call_distance_digits: u32,
    pub grace_period_secs: i64,
    pub refresh_interval_secs: i64,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            trip_key_strategy: TripKeyStrategy::Raw,
            unscheduled_trip_indicator: String::new(),
            field_mutators: FieldMutators::default(),
            call_distance_digits: 2,
            grace_period_secs: 60,
            refresh_interval_secs: 30,
        }
    }
}

/// Cooperative cancellation flag shared between a transport and a build.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<(), BuildError> {
        if self.is_cancelled() {
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything one build reads. `now` is epoch seconds.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub static_index: &'a StaticIndex,
    pub live: &'a LiveIndex,
    pub snapshot: &'a Snapshot,
    pub settings: &'a ConverterSettings,
    pub now: i64,
    pub cancel: &'a CancelToken,
}

impl BuildContext<'_> {
    pub fn codespace(&self) -> &str {
        self.static_index.codespace()
    }

    /// RFC 3339 in UTC, whole seconds.
    pub fn utc(&self, epoch: i64) -> String {
        DateTime::<Utc>::from_timestamp(epoch, 0)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default()
    }

    /// RFC 3339 in the agency zone, whole seconds.
    pub fn local(&self, epoch: i64) -> String {
        self.static_index
            .timezone()
            .timestamp_opt(epoch, 0)
            .single()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, false))
            .unwrap_or_default()
    }

    /// RFC 3339 in the agency zone with milliseconds.
    pub fn local_millis(&self, epoch: i64) -> String {
        self.static_index
            .timezone()
            .timestamp_opt(epoch, 0)
            .single()
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, false))
            .unwrap_or_default()
    }

    pub fn response_timestamp(&self) -> String {
        self.utc(self.now)
    }

    /// Feed timestamp plus one refresh interval, never before `now`.
    pub fn valid_until(&self) -> String {
        let until = self.live.feed_timestamp() + self.settings.refresh_interval_secs;
        self.utc(until.max(self.now))
    }

    /// `OperatorRef` of a route: its agency, else the codespace.
    pub fn operator_of(&self, route_id: Option<&str>) -> &str {
        route_id
            .and_then(|id| self.static_index.route(id))
            .and_then(|r| r.agency_id.as_deref())
            .unwrap_or_else(|| self.codespace())
    }

    /// True when no operator is asked for or the route belongs to it.
    pub fn operated_by(&self, operator_ref: Option<&str>, route_id: Option<&str>) -> bool {
        operator_ref.is_none_or(|wanted| self.operator_of(route_id) == wanted)
    }

    pub fn line_ref(&self, route_id: &str) -> String {
        format!("{}:Line:{}", self.codespace(), route_id)
    }

    pub fn situation_number(&self, alert_id: &str) -> String {
        format!("{}:SituationNumber:{}", self.codespace(), alert_id)
    }

    /// External trip key with the configured strategy and unscheduled prefix.
    pub fn trip_key(&self, trip_id: &str, start_date: Option<&str>, unscheduled: bool) -> String {
        let key = trip_key::compose(
            trip_id,
            self.codespace(),
            start_date,
            self.settings.trip_key_strategy,
        );
        if unscheduled && !self.settings.unscheduled_trip_indicator.is_empty() {
            format!("{}{}", self.settings.unscheduled_trip_indicator, key)
        } else {
            key
        }
    }

    /// `DataFrameRef` is the service date, or today in the agency zone.
    pub fn data_frame_ref(&self, start_date: Option<&str>) -> String {
        let date = start_date.and_then(crate::static_index::time::parse_service_date);
        let date = match date {
            Some(date) => date,
            None => match self.static_index.timezone().timestamp_opt(self.now, 0).single() {
                Some(dt) => dt.date_naive(),
                None => return String::new(),
            },
        };
        date.format("%Y-%m-%d").to_string()
    }

    pub fn framed_journey_ref(&self, trip_id: &str, start_date: Option<&str>, unscheduled: bool) -> FramedVehicleJourneyRef {
        FramedVehicleJourneyRef {
            data_frame_ref: self.data_frame_ref(start_date),
            dated_vehicle_journey_ref: format!(
                "{}:ServiceJourney:{}",
                self.codespace(),
                self.trip_key(trip_id, start_date, unscheduled)
            ),
        }
    }

    /// Published or inferred start date of a live trip as `YYYYMMDD`.
    pub fn start_date_of(&self, trip: &LiveTrip) -> Option<String> {
        trip.start_date
            .clone()
            .or_else(|| trip.service_date.map(|d| d.format("%Y%m%d").to_string()))
    }

    /// Positions of alerts touching the trip or its route.
    pub fn alerts_for_trip(&self, trip_id: &str, route_id: Option<&str>) -> BTreeSet<usize> {
        let alerts = self.live.alerts();
        let mut found: BTreeSet<usize> = alerts.for_trip(trip_id).iter().copied().collect();
        if let Some(route_id) = route_id {
            found.extend(alerts.for_route(route_id).iter().copied());
        }
        found
    }

    pub fn situation_refs(&self, alerts: &BTreeSet<usize>) -> Vec<SituationRef> {
        alerts
            .iter()
            .filter_map(|i| self.live.alerts().get(*i))
            .map(|alert| SituationRef {
                situation_simple_ref: self.situation_number(&alert.id),
            })
            .collect()
    }

    pub fn round_distance(&self, value: f64) -> f64 {
        let factor = 10f64.powi(self.settings.call_distance_digits as i32);
        (value * factor).round() / factor
    }

    fn envelope(&self) -> ServiceDelivery {
        ServiceDelivery {
            response_timestamp: self.response_timestamp(),
            producer_ref: self.codespace().to_string(),
            ..Default::default()
        }
    }
}

/// Builds the response tree for a validated request.
#[tracing::instrument(skip_all, fields(call = request.call.kind(), format = %request.format))]
pub fn build(ctx: &BuildContext<'_>, request: &SiriRequest) -> Result<Siri, BuildError> {
    let mut delivery = ctx.envelope();
    match &request.call {
        Call::VehicleMonitoring(query) => {
            let (vm, alerts) = vehicle_monitoring::build(ctx, query)?;
            delivery.vehicle_monitoring_delivery.push(vm);
            if !alerts.is_empty() {
                delivery
                    .situation_exchange_delivery
                    .push(situation_exchange::build_for(ctx, &alerts)?);
            }
        }
        Call::StopMonitoring(query) => {
            let (sm, alerts) = stop_monitoring::build(ctx, query)?;
            delivery.stop_monitoring_delivery.push(sm);
            if !alerts.is_empty() {
                delivery
                    .situation_exchange_delivery
                    .push(situation_exchange::build_for(ctx, &alerts)?);
            }
        }
        Call::EstimatedTimetable(query) => {
            delivery
                .estimated_timetable_delivery
                .push(estimated_timetable::build(ctx, query)?);
        }
        Call::SituationExchange => {
            delivery
                .situation_exchange_delivery
                .push(situation_exchange::build(ctx)?);
        }
    }
    debug!("Response tree built");
    Ok(Siri {
        service_delivery: delivery,
    })
}
