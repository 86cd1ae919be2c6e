//! Reads the static schedule tables out of a zip archive, a directory or memory.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::PathBuf;

use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::model::{Agency, Route, Stop, StopTime, Trip};
use super::shapes::ShapeStore;
use super::time::parse_service_time;
use crate::error::StaticLoadError;
use crate::geometry::Coord;

/// Anything that can hand out the raw bytes of a named schedule table.
pub trait TableSource {
    /// Returns `None` when the table does not exist.
    fn read_table(&mut self, name: &str) -> Result<Option<Vec<u8>>, StaticLoadError>;
}

/// A zipped schedule, optionally with its tables nested in one folder.
pub struct ZipSource<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl ZipSource<Cursor<Vec<u8>>> {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, StaticLoadError> {
        Ok(Self {
            archive: ZipArchive::new(Cursor::new(bytes))?,
        })
    }
}

impl<R: Read + Seek> TableSource for ZipSource<R> {
    fn read_table(&mut self, name: &str) -> Result<Option<Vec<u8>>, StaticLoadError> {
        let suffix = format!("/{name}");
        let entry_name = self
            .archive
            .file_names()
            .find(|n| *n == name || n.ends_with(&suffix))
            .map(str::to_string);

        let Some(entry_name) = entry_name else {
            return Ok(None);
        };
        let mut file = self.archive.by_name(&entry_name)?;
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        Ok(Some(buf))
    }
}

/// An unpacked schedule directory.
pub struct DirSource(pub PathBuf);

impl TableSource for DirSource {
    fn read_table(&mut self, name: &str) -> Result<Option<Vec<u8>>, StaticLoadError> {
        let path = self.0.join(name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(path)?))
    }
}

/// Tables held in memory, keyed by file name.
#[derive(Debug, Default, Clone)]
pub struct MemorySource(pub HashMap<String, String>);

impl MemorySource {
    pub fn with_table(mut self, name: &str, content: &str) -> Self {
        self.0.insert(name.to_string(), content.to_string());
        self
    }
}

impl TableSource for MemorySource {
    fn read_table(&mut self, name: &str) -> Result<Option<Vec<u8>>, StaticLoadError> {
        Ok(self.0.get(name).map(|s| s.as_bytes().to_vec()))
    }
}

#[derive(Debug, Deserialize)]
struct AgencyRow {
    #[serde(default)]
    agency_id: Option<String>,
    #[serde(default)]
    agency_name: Option<String>,
    #[serde(default)]
    agency_timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RouteRow {
    route_id: String,
    #[serde(default)]
    agency_id: Option<String>,
    #[serde(default)]
    route_short_name: Option<String>,
    #[serde(default)]
    route_long_name: Option<String>,
    #[serde(default)]
    route_type: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct TripRow {
    trip_id: String,
    route_id: String,
    #[serde(default)]
    service_id: Option<String>,
    #[serde(default)]
    trip_headsign: Option<String>,
    #[serde(default)]
    direction_id: Option<String>,
    #[serde(default)]
    block_id: Option<String>,
    #[serde(default)]
    shape_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StopRow {
    stop_id: String,
    #[serde(default)]
    stop_name: Option<String>,
    #[serde(default)]
    stop_lat: Option<f64>,
    #[serde(default)]
    stop_lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StopTimeRow {
    trip_id: String,
    stop_id: String,
    stop_sequence: u32,
    #[serde(default)]
    arrival_time: Option<String>,
    #[serde(default)]
    departure_time: Option<String>,
    #[serde(default)]
    pickup_type: Option<u8>,
    #[serde(default)]
    drop_off_type: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct ShapeRow {
    shape_id: String,
    shape_pt_lat: f64,
    shape_pt_lon: f64,
    shape_pt_sequence: u32,
}

/// Every table of the schedule, normalized but not yet indexed.
pub(crate) struct LoadedTables {
    pub agencies: Vec<Agency>,
    pub routes: HashMap<String, Route>,
    pub stops: HashMap<String, Stop>,
    pub trips: HashMap<String, Trip>,
    pub shapes: ShapeStore,
}

pub(crate) fn load_tables<S: TableSource>(source: &mut S) -> Result<LoadedTables, StaticLoadError> {
    let agencies: Vec<Agency> = read_rows::<AgencyRow, _>(source, "agency.txt", &[])?
        .into_iter()
        .map(|row| Agency {
            id: non_empty(row.agency_id),
            name: non_empty(row.agency_name),
            timezone: non_empty(row.agency_timezone),
        })
        .collect();
    info!(count = agencies.len(), "Parsed agencies");

    let mut routes = HashMap::new();
    for row in read_rows::<RouteRow, _>(source, "routes.txt", &["route_id"])? {
        routes.insert(
            row.route_id.clone(),
            Route {
                id: row.route_id,
                short_name: non_empty(row.route_short_name),
                long_name: non_empty(row.route_long_name),
                route_type: row.route_type,
                agency_id: non_empty(row.agency_id),
            },
        );
    }
    info!(count = routes.len(), "Parsed routes");

    let mut stops = HashMap::new();
    for row in read_rows::<StopRow, _>(source, "stops.txt", &["stop_id"])? {
        let coord = match (row.stop_lon, row.stop_lat) {
            (Some(lon), Some(lat)) => Some(Coord::new(lon, lat)),
            _ => None,
        };
        stops.insert(
            row.stop_id.clone(),
            Stop {
                id: row.stop_id,
                name: non_empty(row.stop_name),
                coord,
            },
        );
    }
    info!(count = stops.len(), "Parsed stops");

    let mut trips = HashMap::new();
    for row in read_rows::<TripRow, _>(source, "trips.txt", &["trip_id", "route_id"])? {
        trips.insert(
            row.trip_id.clone(),
            Trip {
                id: row.trip_id,
                route_id: row.route_id,
                service_id: row.service_id.unwrap_or_default(),
                headsign: non_empty(row.trip_headsign),
                direction_id: non_empty(row.direction_id),
                shape_id: non_empty(row.shape_id),
                block_id: non_empty(row.block_id),
                stop_times: Vec::new(),
            },
        );
    }
    info!(count = trips.len(), "Parsed trips");

    let stop_time_rows = read_rows::<StopTimeRow, _>(
        source,
        "stop_times.txt",
        &["trip_id", "stop_id", "stop_sequence"],
    )?;
    let total_stop_times = stop_time_rows.len();
    let mut skipped = 0usize;
    let mut orphaned = 0usize;
    for row in stop_time_rows {
        if row.trip_id.is_empty() {
            skipped += 1;
            continue;
        }
        let Some(trip) = trips.get_mut(&row.trip_id) else {
            orphaned += 1;
            continue;
        };
        trip.stop_times.push(StopTime {
            stop_id: row.stop_id,
            stop_sequence: row.stop_sequence,
            arrival: row.arrival_time.as_deref().and_then(parse_service_time),
            departure: row.departure_time.as_deref().and_then(parse_service_time),
            pickup_type: row.pickup_type.unwrap_or(0),
            drop_off_type: row.drop_off_type.unwrap_or(0),
        });
    }
    if skipped > 0 {
        warn!(skipped, "Skipped stop_times.txt records with empty trip_id");
    }
    if orphaned > 0 {
        warn!(orphaned, "Skipped stop_times.txt records for unknown trips");
    }
    // stable sort keeps file order for equal sequences
    for trip in trips.values_mut() {
        trip.stop_times.sort_by_key(|st| st.stop_sequence);
    }
    info!(total_stop_times, "Parsed stop_times");

    let shapes = match source.read_table("shapes.txt")? {
        Some(bytes) => {
            let rows = deserialize_rows::<ShapeRow>(&bytes, "shapes.txt", &["shape_id"])?;
            ShapeStore::from_rows(
                rows.into_iter()
                    .map(|r| {
                        (
                            r.shape_id,
                            r.shape_pt_sequence,
                            Coord::new(r.shape_pt_lon, r.shape_pt_lat),
                        )
                    })
                    .collect(),
            )
        }
        None => {
            info!("No shapes.txt in static feed (optional file)");
            ShapeStore::default()
        }
    };
    info!(count = shapes.len(), "Parsed shapes");

    Ok(LoadedTables {
        agencies,
        routes,
        stops,
        trips,
        shapes,
    })
}

fn read_rows<T: DeserializeOwned, S: TableSource>(
    source: &mut S,
    table: &'static str,
    required: &[&'static str],
) -> Result<Vec<T>, StaticLoadError> {
    let bytes = source
        .read_table(table)?
        .ok_or(StaticLoadError::MissingTable(table))?;
    deserialize_rows(&bytes, table, required)
}

fn deserialize_rows<T: DeserializeOwned>(
    bytes: &[u8],
    table: &'static str,
    required: &[&'static str],
) -> Result<Vec<T>, StaticLoadError> {
    debug!(table, bytes = bytes.len(), "Reading table");
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let headers = rdr
        .headers()
        .map_err(|source| StaticLoadError::Csv { table, source })?
        .clone();
    for column in required {
        if !headers.iter().any(|h| h == *column) {
            return Err(StaticLoadError::MissingColumn { table, column });
        }
    }

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: T = result.map_err(|source| StaticLoadError::Csv { table, source })?;
        rows.push(row);
    }
    Ok(rows)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}
