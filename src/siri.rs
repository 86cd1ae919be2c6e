//! SIRI response tree.
//!
//! Field declaration order is element order: the XML writer walks the
//! serialized tree as-is.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Siri {
    pub service_delivery: ServiceDelivery,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceDelivery {
    pub response_timestamp: String,
    pub producer_ref: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vehicle_monitoring_delivery: Vec<VehicleMonitoringDelivery>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop_monitoring_delivery: Vec<StopMonitoringDelivery>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub estimated_timetable_delivery: Vec<EstimatedTimetableDelivery>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub situation_exchange_delivery: Vec<SituationExchangeDelivery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_condition: Option<ErrorCondition>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorCondition {
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FramedVehicleJourneyRef {
    pub data_frame_ref: String,
    pub dated_vehicle_journey_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VehicleLocation {
    pub longitude: f64,
    pub latitude: f64,
}

// Vehicle and stop monitoring

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VehicleMonitoringDelivery {
    pub response_timestamp: String,
    pub valid_until: String,
    pub vehicle_activity: Vec<VehicleActivity>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VehicleActivity {
    pub recorded_at_time: String,
    pub monitored_vehicle_journey: MonitoredVehicleJourney,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StopMonitoringDelivery {
    pub response_timestamp: String,
    pub valid_until: String,
    pub monitored_stop_visit: Vec<MonitoredStopVisit>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonitoredStopVisit {
    pub recorded_at_time: String,
    pub monitoring_ref: String,
    pub monitored_vehicle_journey: MonitoredVehicleJourney,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonitoredVehicleJourney {
    pub line_ref: String,
    pub direction_ref: String,
    pub framed_vehicle_journey_ref: FramedVehicleJourneyRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journey_pattern_ref: Option<String>,
    pub published_line_name: String,
    pub operator_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub situation_ref: Vec<SituationRef>,
    pub monitored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_location: Option<VehicleLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    /// Meters per second, as reported by the vehicle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupancy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_congestion: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_mode: Option<String>,
    pub delay: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitored_call: Option<MonitoredCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onward_calls: Option<OnwardCalls>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SituationRef {
    pub situation_simple_ref: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonitoredCall {
    pub stop_point_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_point_name: Option<String>,
    pub vehicle_at_stop: bool,
    pub request_stop: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aimed_arrival_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_arrival_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aimed_departure_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_departure_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OnwardCalls {
    pub onward_call: Vec<OnwardCall>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OnwardCall {
    pub stop_point_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_point_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aimed_arrival_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_arrival_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_departure_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Extensions>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Extensions {
    pub distances: Distances,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Distances {
    pub presentable_distance: String,
    pub distance_from_call: Option<f64>,
    pub stops_from_call: usize,
    pub call_distance_along_route: Option<f64>,
}

// Estimated timetable

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EstimatedTimetableDelivery {
    #[serde(rename = "version")]
    pub version: String,
    pub response_timestamp: String,
    pub estimated_journey_version_frame: Vec<EstimatedJourneyVersionFrame>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EstimatedJourneyVersionFrame {
    pub recorded_at_time: String,
    pub estimated_vehicle_journey: Vec<EstimatedVehicleJourney>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EstimatedVehicleJourney {
    pub line_ref: String,
    pub direction_ref: String,
    pub framed_vehicle_journey_ref: FramedVehicleJourneyRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_mode: Option<String>,
    pub published_line_name: String,
    pub operator_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_name: Option<String>,
    pub monitored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_calls: Option<RecordedCalls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_calls: Option<EstimatedCalls>,
    pub is_complete_stop_sequence: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordedCalls {
    pub recorded_call: Vec<RecordedCall>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordedCall {
    pub stop_point_ref: String,
    pub order: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_point_name: Option<String>,
    pub cancellation: bool,
    pub request_stop: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aimed_arrival_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_arrival_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aimed_departure_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_departure_time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EstimatedCalls {
    pub estimated_call: Vec<EstimatedCall>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EstimatedCall {
    pub stop_point_ref: String,
    pub order: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_point_name: Option<String>,
    pub cancellation: bool,
    pub request_stop: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aimed_arrival_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_arrival_time: Option<String>,
    pub arrival_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aimed_departure_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_departure_time: Option<String>,
    pub departure_status: String,
}

// Situation exchange

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SituationExchangeDelivery {
    pub response_timestamp: String,
    pub situations: Situations,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Situations {
    pub pt_situation_element: Vec<PtSituationElement>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PtSituationElement {
    pub participant_ref: String,
    pub situation_number: String,
    pub source: Source,
    pub progress: String,
    pub validity_period: ValidityPeriod,
    /// Always empty; rendered as a self-closing element.
    pub undefined_reason: String,
    pub severity: String,
    pub report_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info_links: Option<InfoLinks>,
    pub affects: Affects,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consequences: Option<Consequences>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InfoLinks {
    pub info_link: Vec<InfoLink>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InfoLink {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Source {
    pub source_type: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ValidityPeriod {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Affects {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networks: Option<Networks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_points: Option<StopPoints>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vehicle_journeys: Option<VehicleJourneys>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Networks {
    pub affected_network: Vec<AffectedNetwork>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AffectedNetwork {
    pub affected_line: Vec<AffectedLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AffectedLine {
    pub line_ref: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StopPoints {
    pub affected_stop_point: Vec<AffectedStopPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AffectedStopPoint {
    pub stop_point_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_point_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VehicleJourneys {
    pub affected_vehicle_journey: Vec<AffectedVehicleJourney>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AffectedVehicleJourney {
    pub framed_vehicle_journey_ref: FramedVehicleJourneyRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Consequences {
    pub consequence: Vec<Consequence>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Consequence {
    pub condition: String,
}

impl Siri {
    /// Error payload for a failed request.
    pub fn error(response_timestamp: String, producer_ref: String, description: String) -> Self {
        Siri {
            service_delivery: ServiceDelivery {
                response_timestamp,
                producer_ref,
                error_condition: Some(ErrorCondition { description }),
                ..Default::default()
            },
        }
    }
}
