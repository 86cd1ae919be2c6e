//! Query parameter validation.
//!
//! Parameter names are matched case-insensitively. Every present parameter
//! is checked, whichever call it belongs to.

use std::collections::HashMap;

use crate::error::ValidationError;
use crate::request::{
    Call, CallKind, DetailLevel, EstimatedTimetableQuery, Format, SiriRequest, StopMonitoringQuery,
    VehicleMonitoringQuery,
};
use crate::static_index::StaticIndex;

pub const DIRECTION_REF: &str = "directionref";
pub const LINE_REF: &str = "lineref";
pub const MONITORING_REF: &str = "monitoringref";
pub const OPERATOR_REF: &str = "operatorref";
pub const MAXIMUM_STOP_VISITS: &str = "maximumstopvisits";
pub const MINIMUM_STOP_VISITS_PER_LINE: &str = "minimumstopvisitsperline";
pub const MAXIMUM_ONWARD_CALLS: &str = "maximumnumberofcallsonwards";
pub const DETAIL_LEVEL: &str = "vehiclemonitoringdetaillevel";

/// Query parameters with lowercased names. A repeated name keeps its last value.
#[derive(Debug, Clone, Default)]
pub struct Params(HashMap<String, String>);

impl Params {
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    fn count(&self, name: &'static str) -> Result<Option<usize>, ValidationError> {
        self.get(name)
            .map(|value| {
                value
                    .parse::<usize>()
                    .map_err(|_| ValidationError::NotANonNegativeInteger {
                        param: name,
                        value: value.to_string(),
                    })
            })
            .transpose()
    }
}

/// Checks `params` against the static index and builds the request.
pub fn validate(
    kind: CallKind,
    format: Format,
    params: &Params,
    static_index: &StaticIndex,
) -> Result<SiriRequest, ValidationError> {
    let direction_ref = match params.get(DIRECTION_REF) {
        Some(d @ ("0" | "1")) => Some(d.to_string()),
        Some(other) => {
            return Err(ValidationError::NotAllowed {
                param: DIRECTION_REF,
                value: other.to_string(),
                allowed: "0, 1",
            });
        }
        None => None,
    };

    let line_ref = match params.get(LINE_REF) {
        Some(value) => match static_index.resolve_line_ref(value) {
            Some(route) => Some(route.id.clone()),
            None => return Err(ValidationError::UnknownLine(value.to_string())),
        },
        None => None,
    };

    let operator_ref = match params.get(OPERATOR_REF) {
        Some(operator) if static_index.has_agency(operator) => Some(operator.to_string()),
        Some(operator) => return Err(ValidationError::UnknownOperator(operator.to_string())),
        None => None,
    };

    let maximum_stop_visits = params.count(MAXIMUM_STOP_VISITS)?;
    let minimum_stop_visits_per_line = params.count(MINIMUM_STOP_VISITS_PER_LINE)?;
    let max_onward_calls = params.count(MAXIMUM_ONWARD_CALLS)?;

    let detail_level = match params.get(DETAIL_LEVEL).map(str::to_ascii_lowercase) {
        None => DetailLevel::Normal,
        Some(level) if level == "normal" => DetailLevel::Normal,
        Some(level) if level == "calls" => DetailLevel::Calls,
        Some(other) => {
            return Err(ValidationError::NotAllowed {
                param: DETAIL_LEVEL,
                value: other,
                allowed: "normal, calls",
            });
        }
    };

    let monitoring_ref = match params.get(MONITORING_REF) {
        Some(stop) if static_index.has_stop(stop) => Some(stop.to_string()),
        Some(stop) => return Err(ValidationError::UnknownStop(stop.to_string())),
        None => None,
    };

    let call = match kind {
        CallKind::VehicleMonitoring => Call::VehicleMonitoring(VehicleMonitoringQuery {
            detail_level,
            max_onward_calls,
            operator_ref,
        }),
        CallKind::StopMonitoring => Call::StopMonitoring(StopMonitoringQuery {
            monitoring_ref: monitoring_ref.ok_or(ValidationError::Missing(MONITORING_REF))?,
            max_onward_calls,
            line_ref,
            direction_ref,
            maximum_stop_visits,
            minimum_stop_visits_per_line,
            operator_ref,
        }),
        CallKind::EstimatedTimetable => Call::EstimatedTimetable(EstimatedTimetableQuery {
            line_ref,
            operator_ref,
        }),
        CallKind::SituationExchange => Call::SituationExchange,
    };
    Ok(SiriRequest { call, format })
}
