//! In-memory schedule entities.

use crate::geometry::Coord;

#[derive(Debug, Clone)]
pub struct Agency {
    pub id: Option<String>,
    pub name: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    /// `route_type`; `None` when the column is empty or unparsable.
    pub route_type: Option<i32>,
    pub agency_id: Option<String>,
}

impl Route {
    /// SIRI vehicle mode for the basic GTFS route types.
    pub fn vehicle_mode(&self) -> Option<&'static str> {
        vehicle_mode(self.route_type?)
    }
}

/// Maps a GTFS route type to its SIRI `VehicleMode`. Type 0 is a tram.
pub fn vehicle_mode(route_type: i32) -> Option<&'static str> {
    if route_type < 0 {
        return None;
    }
    match route_type {
        0 => Some("tram"),
        1 => Some("metro"),
        2 => Some("rail"),
        3 => Some("bus"),
        4 => Some("ferry"),
        5 => Some("cableTram"),
        6 => Some("aerialLift"),
        7 => Some("funicular"),
        11 => Some("trolleybus"),
        12 => Some("monorail"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct Stop {
    pub id: String,
    pub name: Option<String>,
    pub coord: Option<Coord>,
}

/// One row of a trip's stop sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct StopTime {
    pub stop_id: String,
    pub stop_sequence: u32,
    /// Seconds since service-day start.
    pub arrival: Option<u32>,
    pub departure: Option<u32>,
    pub pickup_type: u8,
    pub drop_off_type: u8,
}

impl StopTime {
    /// Departure if scheduled, else arrival.
    pub fn departure_or_arrival(&self) -> Option<u32> {
        self.departure.or(self.arrival)
    }

    pub fn arrival_or_departure(&self) -> Option<u32> {
        self.arrival.or(self.departure)
    }

    /// Pickup or drop-off must be arranged by phone or with the driver.
    pub fn is_request_stop(&self) -> bool {
        matches!(self.pickup_type, 2 | 3) || matches!(self.drop_off_type, 2 | 3)
    }
}

#[derive(Debug, Clone)]
pub struct Trip {
    pub id: String,
    pub route_id: String,
    pub service_id: String,
    pub headsign: Option<String>,
    /// `"0"` or `"1"` when present.
    pub direction_id: Option<String>,
    pub shape_id: Option<String>,
    pub block_id: Option<String>,
    /// Ordered by `stop_sequence`, ties in file order.
    pub stop_times: Vec<StopTime>,
}

impl Trip {
    pub fn origin(&self) -> Option<&StopTime> {
        self.stop_times.first()
    }

    pub fn destination(&self) -> Option<&StopTime> {
        self.stop_times.last()
    }

    /// Position of the first visit of `stop_id`.
    pub fn stop_index(&self, stop_id: &str) -> Option<usize> {
        self.stop_times.iter().position(|st| st.stop_id == stop_id)
    }

    pub fn stop_time_by_sequence(&self, stop_sequence: u32) -> Option<&StopTime> {
        self.stop_times
            .iter()
            .find(|st| st.stop_sequence == stop_sequence)
    }

    /// Row for a live stop: by sequence when it agrees on the stop, else by stop id.
    pub fn matching_stop_time(&self, stop_id: &str, stop_sequence: Option<u32>) -> Option<&StopTime> {
        self.matching_index(stop_id, stop_sequence)
            .map(|i| &self.stop_times[i])
    }

    pub fn matching_index(&self, stop_id: &str, stop_sequence: Option<u32>) -> Option<usize> {
        stop_sequence
            .and_then(|seq| {
                self.stop_times
                    .iter()
                    .position(|st| st.stop_sequence == seq && st.stop_id == stop_id)
            })
            .or_else(|| self.stop_index(stop_id))
    }
}
