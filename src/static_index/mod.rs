//! Read-only lookup tables over the static schedule.
//!
//! Built once at startup and shared by every request without locking.

pub mod loader;
pub mod model;
pub mod shapes;
pub mod time;

use std::collections::HashMap;

use chrono_tz::Tz;
use tracing::{info, warn};

use crate::error::StaticLoadError;
use crate::geometry::{Coord, OwnedPolyline, Polyline, cumulative_km};
use loader::{LoadedTables, TableSource, load_tables};
use model::{Agency, Route, Stop, Trip};
use shapes::ShapeStore;

/// Settings the loader needs from configuration.
#[derive(Debug, Clone)]
pub struct StaticOptions {
    /// Zone used when `agency_timezone` is unset or unknown.
    pub fallback_timezone: Tz,
    /// Codespace override; defaults to the first agency's id.
    pub agency_id: Option<String>,
}

impl Default for StaticOptions {
    fn default() -> Self {
        Self {
            fallback_timezone: Tz::UTC,
            agency_id: None,
        }
    }
}

/// The path a trip travels: its shape when it has one, else its stops.
#[derive(Debug)]
pub enum RoutePath<'a> {
    Shape(Polyline<'a>),
    Stops(OwnedPolyline),
}

impl RoutePath<'_> {
    pub fn view(&self) -> Polyline<'_> {
        match self {
            RoutePath::Shape(line) => *line,
            RoutePath::Stops(owned) => owned.view(),
        }
    }
}

#[derive(Debug)]
pub struct StaticIndex {
    agencies: Vec<Agency>,
    codespace: String,
    timezone: Tz,
    routes: HashMap<String, Route>,
    stops: HashMap<String, Stop>,
    trips: HashMap<String, Trip>,
    shapes: ShapeStore,
}

impl StaticIndex {
    #[tracing::instrument(skip_all)]
    pub fn load<S: TableSource>(
        source: &mut S,
        options: &StaticOptions,
    ) -> Result<Self, StaticLoadError> {
        let tables = load_tables(source)?;
        let index = Self::from_tables(tables, options);
        info!(
            codespace = %index.codespace,
            timezone = %index.timezone,
            routes = index.routes.len(),
            trips = index.trips.len(),
            stops = index.stops.len(),
            shapes = index.shapes.len(),
            "Static index ready"
        );
        Ok(index)
    }

    fn from_tables(tables: LoadedTables, options: &StaticOptions) -> Self {
        let LoadedTables {
            agencies,
            routes,
            stops,
            trips,
            shapes,
        } = tables;

        let timezone = match agencies.iter().find_map(|a| a.timezone.as_deref()) {
            Some(name) => name.parse::<Tz>().unwrap_or_else(|_| {
                warn!(
                    timezone = name,
                    fallback = %options.fallback_timezone,
                    "Unknown agency timezone, using configured fallback"
                );
                options.fallback_timezone
            }),
            None => {
                warn!(
                    fallback = %options.fallback_timezone,
                    "agency.txt has no timezone, using configured fallback"
                );
                options.fallback_timezone
            }
        };

        let codespace = options
            .agency_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| agencies.iter().find_map(|a| a.id.clone()))
            .unwrap_or_default();

        Self {
            agencies,
            codespace,
            timezone,
            routes,
            stops,
            trips,
            shapes,
        }
    }

    /// Agency identifier used as the namespace prefix of emitted references.
    pub fn codespace(&self) -> &str {
        &self.codespace
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn agency_ids(&self) -> impl Iterator<Item = &str> {
        self.agencies.iter().filter_map(|a| a.id.as_deref())
    }

    /// True for any listed agency id and for the codespace itself.
    pub fn has_agency(&self, agency_id: &str) -> bool {
        agency_id == self.codespace || self.agency_ids().any(|id| id == agency_id)
    }

    pub fn route(&self, route_id: &str) -> Option<&Route> {
        self.routes.get(route_id)
    }

    /// `PublishedLineName` source; `None` for unknown routes or an empty column.
    pub fn route_short_name(&self, route_id: &str) -> Option<&str> {
        self.route(route_id)?.short_name.as_deref()
    }

    /// Resolves a `LineRef` query value, accepting `{agency}_{route}` or a bare route id.
    pub fn resolve_line_ref(&self, line_ref: &str) -> Option<&Route> {
        if let Some(route) = self.routes.get(line_ref) {
            return Some(route);
        }
        let (agency, route_id) = line_ref.split_once('_')?;
        if !self.has_agency(agency) {
            return None;
        }
        self.routes.get(route_id)
    }

    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stops.get(stop_id)
    }

    pub fn has_stop(&self, stop_id: &str) -> bool {
        self.stops.contains_key(stop_id)
    }

    pub fn stop_name(&self, stop_id: &str) -> Option<&str> {
        self.stop(stop_id)?.name.as_deref()
    }

    pub fn stop_coord(&self, stop_id: &str) -> Option<Coord> {
        self.stop(stop_id)?.coord
    }

    pub fn trip(&self, trip_id: &str) -> Option<&Trip> {
        self.trips.get(trip_id)
    }

    /// Block of the trip, for `BlockRef`.
    pub fn trip_block(&self, trip_id: &str) -> Option<&str> {
        self.trip(trip_id)?.block_id.as_deref()
    }

    /// Shape of the trip if it has a non-empty one, else the polyline through
    /// its stops that have coordinates.
    pub fn trip_path(&self, trip_id: &str) -> Option<RoutePath<'_>> {
        let trip = self.trip(trip_id)?;
        if let Some(line) = trip
            .shape_id
            .as_deref()
            .and_then(|id| self.shapes.get(id))
            .filter(|line| !line.is_empty())
        {
            return Some(RoutePath::Shape(line));
        }
        let points: Vec<Coord> = trip
            .stop_times
            .iter()
            .filter_map(|st| self.stop_coord(&st.stop_id))
            .collect();
        if points.is_empty() {
            return None;
        }
        Some(RoutePath::Stops(OwnedPolyline::new(points)))
    }

    /// Distance along the trip of every stop in its stop list, aligned by index.
    ///
    /// With a shape each stop is snapped onto it; without one the distances
    /// are haversine sums along the stop sequence. Stops without coordinates
    /// get `None`.
    pub fn trip_stop_distances(&self, trip_id: &str) -> Vec<Option<f64>> {
        let Some(trip) = self.trip(trip_id) else {
            return Vec::new();
        };
        let coords: Vec<Option<Coord>> = trip
            .stop_times
            .iter()
            .map(|st| self.stop_coord(&st.stop_id))
            .collect();

        let shape = trip
            .shape_id
            .as_deref()
            .and_then(|id| self.shapes.get(id))
            .filter(|line| !line.is_empty());
        if let Some(line) = shape {
            return coords
                .iter()
                .map(|c| c.and_then(|c| line.distance_along(c)))
                .collect();
        }

        let known: Vec<Coord> = coords.iter().flatten().copied().collect();
        let mut cum = cumulative_km(&known).into_iter();
        coords
            .iter()
            .map(|c| c.and_then(|_| cum.next()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use loader::MemorySource;

    fn source(agency_tz: &str, with_shape: bool) -> MemorySource {
        let mut source = MemorySource::default()
            .with_table(
                "agency.txt",
                &format!("agency_id,agency_name,agency_timezone\nMTA,Metro,{agency_tz}\n"),
            )
            .with_table(
                "routes.txt",
                "route_id,agency_id,route_short_name,route_type\nR1,MTA,1,0\n",
            )
            .with_table(
                "stops.txt",
                "stop_id,stop_name,stop_lat,stop_lon\n\
                 A,Alpha,0.0,0.0\nB,Beta,0.01,0.0\nC,Gamma,0.02,0.0\nX,NoCoord,,\n",
            )
            .with_table(
                "trips.txt",
                "route_id,service_id,trip_id,shape_id,block_id\nR1,WK,T1,S1,B7\nR1,WK,T2,,\n",
            )
            .with_table(
                "stop_times.txt",
                "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
                 T1,08:00:00,08:00:00,A,1\nT1,08:05:00,08:05:00,B,2\nT1,08:10:00,08:10:00,C,3\n\
                 T2,09:00:00,09:00:00,A,1\nT2,09:01:00,09:01:00,X,2\nT2,09:05:00,09:05:00,C,3\n",
            );
        if with_shape {
            source = source.with_table(
                "shapes.txt",
                "shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence\n\
                 S1,0.0,0.0,1\nS1,0.02,0.0,2\n",
            );
        }
        source
    }

    fn load(agency_tz: &str, with_shape: bool) -> StaticIndex {
        StaticIndex::load(&mut source(agency_tz, with_shape), &StaticOptions::default()).unwrap()
    }

    #[test]
    fn test_timezone_from_agency_or_fallback() {
        assert_eq!(load("America/New_York", false).timezone(), chrono_tz::America::New_York);
        assert_eq!(load("Not/AZone", false).timezone(), Tz::UTC);
        assert_eq!(load("", false).timezone(), Tz::UTC);
    }

    #[test]
    fn test_codespace_defaults_to_first_agency() {
        let index = load("UTC", false);
        assert_eq!(index.codespace(), "MTA");
        assert!(index.has_agency("MTA"));
        assert!(!index.has_agency("OTHER"));

        let options = StaticOptions {
            agency_id: Some("NYCT".into()),
            ..StaticOptions::default()
        };
        let index = StaticIndex::load(&mut source("UTC", false), &options).unwrap();
        assert_eq!(index.codespace(), "NYCT");
    }

    #[test]
    fn test_resolve_line_ref() {
        let index = load("UTC", false);
        assert_eq!(index.resolve_line_ref("R1").map(|r| r.id.as_str()), Some("R1"));
        assert_eq!(index.resolve_line_ref("MTA_R1").map(|r| r.id.as_str()), Some("R1"));
        assert!(index.resolve_line_ref("XX_R1").is_none());
        assert!(index.resolve_line_ref("R9").is_none());
    }

    #[test]
    fn test_lookups() {
        let index = load("UTC", false);
        assert_eq!(index.stop_name("B"), Some("Beta"));
        assert!(index.stop_coord("X").is_none());
        assert_eq!(index.route_short_name("R1"), Some("1"));
        assert_eq!(index.route_short_name("R9"), None);
        assert_eq!(index.trip_block("T1"), Some("B7"));
        assert_eq!(index.trip_block("T2"), None);
        assert_eq!(index.trip("T1").and_then(|t| t.stop_index("C")), Some(2));
    }

    #[test]
    fn test_distances_without_shape_skip_unknown_coordinates() {
        let index = load("UTC", false);
        let d = index.trip_stop_distances("T2");
        assert_eq!(d.len(), 3);
        assert_eq!(d[0], Some(0.0));
        assert!(d[1].is_none());
        assert_abs_diff_eq!(d[2].unwrap(), 2.2239, epsilon = 1e-3);
        assert!(matches!(index.trip_path("T2"), Some(RoutePath::Stops(_))));
    }

    #[test]
    fn test_distances_snap_onto_shape() {
        let index = load("UTC", true);
        let b = index.trip_stop_distances("T1")[1].unwrap();
        assert_abs_diff_eq!(b, 1.11195, epsilon = 1e-3);
        let path = index.trip_path("T1").unwrap();
        assert!(matches!(path, RoutePath::Shape(_)));
        assert_abs_diff_eq!(path.view().length_km(), 2.2239, epsilon = 1e-3);
    }
}
