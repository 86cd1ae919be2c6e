//! Validated requests. A [`SiriRequest`] is also the response-cache key, so
//! every field that changes the response bytes lives here.

use std::fmt;

/// Serialization of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    Xml,
}

impl Format {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(Format::Json),
            "xml" => Some(Format::Xml),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Xml => "application/xml",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Json => "json",
            Format::Xml => "xml",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DetailLevel {
    #[default]
    Normal,
    /// Adds `OnwardCalls` to every journey.
    Calls,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VehicleMonitoringQuery {
    pub detail_level: DetailLevel,
    pub max_onward_calls: Option<usize>,
    /// Agency id; trips of other operators are left out.
    pub operator_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StopMonitoringQuery {
    pub monitoring_ref: String,
    pub max_onward_calls: Option<usize>,
    /// Resolved route id.
    pub line_ref: Option<String>,
    pub direction_ref: Option<String>,
    pub maximum_stop_visits: Option<usize>,
    pub minimum_stop_visits_per_line: Option<usize>,
    pub operator_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct EstimatedTimetableQuery {
    /// Resolved route id.
    pub line_ref: Option<String>,
    pub operator_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    VehicleMonitoring(VehicleMonitoringQuery),
    StopMonitoring(StopMonitoringQuery),
    EstimatedTimetable(EstimatedTimetableQuery),
    SituationExchange,
}

impl Call {
    pub fn kind(&self) -> &'static str {
        match self {
            Call::VehicleMonitoring(_) => "vm",
            Call::StopMonitoring(_) => "sm",
            Call::EstimatedTimetable(_) => "et",
            Call::SituationExchange => "sx",
        }
    }
}

/// Which delivery a request asks for, before its parameters are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    VehicleMonitoring,
    StopMonitoring,
    EstimatedTimetable,
    SituationExchange,
}

impl CallKind {
    /// Accepts the short CLI names and the endpoint names.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "vm" | "vehicle-monitoring" => Some(CallKind::VehicleMonitoring),
            "sm" | "stop-monitoring" => Some(CallKind::StopMonitoring),
            "et" | "estimated-timetable" => Some(CallKind::EstimatedTimetable),
            "sx" | "situation-exchange" => Some(CallKind::SituationExchange),
            _ => None,
        }
    }
}

/// One fully validated request; hashable so it can key the response cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiriRequest {
    pub call: Call,
    pub format: Format,
}
