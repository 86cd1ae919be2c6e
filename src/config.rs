//! Service configuration.
//!
//! A JSON document; every optional key has a default. A `feeds[]` entry
//! selected by name is merged over the top-level sections key by key:
//!
//! ```json
//! {
//!   "server": { "port": 8080 },
//!   "gtfs": { "staticURL": "https://example.org/gtfs.zip", "agency_id": "MTA" },
//!   "gtfsrt": { "tripUpdatesURL": "https://example.org/tu.pb", "readIntervalMS": 30000 },
//!   "converter": { "tripKeyStrategy": "agencyTrip" },
//!   "feeds": [{ "name": "bus", "gtfsrt": { "tripUpdatesURL": "https://example.org/bus-tu.pb" } }]
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::converter::ConverterSettings;
use crate::converter::mutators::FieldMutators;
use crate::converter::trip_key::TripKeyStrategy;
use crate::error::{ConfigError, FetchError};
use crate::fetch::BasicClient;
use crate::live_index::FeedKind;
use crate::static_index::StaticOptions;

/// Environment variable naming the config file when `--config` is not given.
pub const CONFIG_ENV: &str = "GTFS_RT_SIRI_CONFIG";

const MAX_DISTANCE_DIGITS: u32 = 9;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gtfs: GtfsConfig,
    #[serde(default)]
    pub gtfsrt: GtfsRtConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(rename = "requestTimeoutMS", default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GtfsConfig {
    /// URL or local path of the static archive (zip or unpacked directory).
    #[serde(rename = "staticURL", default)]
    pub static_url: String,
    #[serde(default)]
    pub agency_id: Option<String>,
    /// Fallback zone when the feed's agency has none.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GtfsRtConfig {
    #[serde(rename = "tripUpdatesURL", default)]
    pub trip_updates_url: Option<String>,
    #[serde(rename = "vehiclePositionsURL", default)]
    pub vehicle_positions_url: Option<String>,
    #[serde(rename = "serviceAlertsURL", default)]
    pub service_alerts_url: Option<String>,
    #[serde(rename = "readIntervalMS", default = "default_read_interval_ms")]
    pub read_interval_ms: u64,
    #[serde(rename = "timeoutMS", default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverterConfig {
    #[serde(default)]
    pub field_mutators: FieldMutators,
    #[serde(default)]
    pub unscheduled_trip_indicator: String,
    #[serde(rename = "callDistanceAlongRouteNumOfDigits", default = "default_distance_digits")]
    pub call_distance_digits: u32,
    #[serde(default)]
    pub trip_key_strategy: TripKeyStrategy,
    #[serde(default = "default_grace_period_seconds")]
    pub grace_period_seconds: i64,
}

/// A named variant of the top-level sections.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub name: String,
    #[serde(default)]
    pub gtfs: Option<Value>,
    #[serde(default)]
    pub gtfsrt: Option<Value>,
    #[serde(default)]
    pub converter: Option<Value>,
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_read_interval_ms() -> u64 {
    30_000
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_distance_digits() -> u32 {
    2
}

fn default_grace_period_seconds() -> i64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for GtfsConfig {
    fn default() -> Self {
        Self {
            static_url: String::new(),
            agency_id: None,
            timezone: default_timezone(),
        }
    }
}

impl Default for GtfsRtConfig {
    fn default() -> Self {
        Self {
            trip_updates_url: None,
            vehicle_positions_url: None,
            service_alerts_url: None,
            read_interval_ms: default_read_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            field_mutators: FieldMutators::default(),
            unscheduled_trip_indicator: String::new(),
            call_distance_digits: default_distance_digits(),
            trip_key_strategy: TripKeyStrategy::default(),
            grace_period_seconds: default_grace_period_seconds(),
        }
    }
}

impl Config {
    /// Reads and validates the config at `path`, overlaying the named feed.
    pub fn load(path: impl AsRef<Path>, feed: Option<&str>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content, feed)
    }

    pub fn from_json_str(content: &str, feed: Option<&str>) -> Result<Self, ConfigError> {
        let mut document: Value = serde_json::from_str(content)?;
        if let Some(name) = feed {
            select_feed(&mut document, name)?;
        }
        let config: Config = serde_json::from_value(document)?;
        config.validate()?;
        debug!(feed, static_url = %config.gtfs.static_url, "Config loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gtfs.static_url.trim().is_empty() {
            return Err(ConfigError::Missing("gtfs.staticURL"));
        }
        if self.converter.call_distance_digits > MAX_DISTANCE_DIGITS {
            return Err(ConfigError::Invalid {
                key: "converter.callDistanceAlongRouteNumOfDigits",
                reason: format!("must be at most {MAX_DISTANCE_DIGITS}"),
            });
        }
        if self.gtfsrt.read_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "gtfsrt.readIntervalMS",
                reason: "must be positive".to_string(),
            });
        }
        if self.converter.grace_period_seconds < 0 {
            return Err(ConfigError::Invalid {
                key: "converter.gracePeriodSeconds",
                reason: "must not be negative".to_string(),
            });
        }
        self.timezone()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.gtfs
            .timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::Invalid {
                key: "gtfs.timezone",
                reason: e.to_string(),
            })
    }

    pub fn static_options(&self) -> Result<StaticOptions, ConfigError> {
        Ok(StaticOptions {
            fallback_timezone: self.timezone()?,
            agency_id: self.gtfs.agency_id.clone(),
        })
    }

    pub fn converter_settings(&self) -> ConverterSettings {
        ConverterSettings {
            trip_key_strategy: self.converter.trip_key_strategy,
            unscheduled_trip_indicator: self.converter.unscheduled_trip_indicator.clone(),
            field_mutators: self.converter.field_mutators.clone(),
            call_distance_digits: self.converter.call_distance_digits,
            grace_period_secs: self.converter.grace_period_seconds,
            refresh_interval_secs: (self.gtfsrt.read_interval_ms / 1000) as i64,
        }
    }
}

impl GtfsRtConfig {
    /// The HTTP client shared by the static archive download and the feed
    /// refreshes; every request is bounded by `timeoutMS`.
    pub fn client(&self) -> Result<BasicClient, FetchError> {
        BasicClient::with_timeout(Duration::from_millis(self.timeout_ms))
    }

    pub fn url(&self, kind: FeedKind) -> Option<&str> {
        let url = match kind {
            FeedKind::TripUpdates => &self.trip_updates_url,
            FeedKind::VehiclePositions => &self.vehicle_positions_url,
            FeedKind::Alerts => &self.service_alerts_url,
        };
        url.as_deref().filter(|u| !u.is_empty())
    }
}

/// Config path from the command line, else from [`CONFIG_ENV`].
pub fn config_path(cli: Option<String>) -> Option<String> {
    cli.or_else(|| std::env::var(CONFIG_ENV).ok())
}

fn select_feed(document: &mut Value, name: &str) -> Result<(), ConfigError> {
    let feed = document
        .get("feeds")
        .and_then(Value::as_array)
        .and_then(|feeds| {
            feeds
                .iter()
                .find(|f| f.get("name").and_then(Value::as_str) == Some(name))
        })
        .cloned()
        .ok_or_else(|| ConfigError::UnknownFeed(name.to_string()))?;

    for section in ["gtfs", "gtfsrt", "converter"] {
        if let Some(overlay) = feed.get(section) {
            if let Value::Object(root) = document {
                let base = root
                    .entry(section.to_string())
                    .or_insert_with(|| Value::Object(Default::default()));
                merge(base, overlay.clone());
            }
        }
    }
    Ok(())
}

/// Object keys merge recursively; anything else replaces.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
