//! Error taxonomy for loading, fetching, validating and building responses.
//!
//! Missing data inside a single trip is never an error; it is recorded as a
//! warning (see [`crate::warnings`]) and the trip is emitted with fallbacks.

use thiserror::Error;

/// Missing or invalid configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no feed named '{0}' in feeds[]")]
    UnknownFeed(String),

    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// A single feed could not be fetched or decoded. Never fatal to the other feeds.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid url '{0}'")]
    Url(String),

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{source_name} timed out after {timeout_ms} ms")]
    Timeout { source_name: String, timeout_ms: u64 },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode feed: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// The static schedule archive could not be turned into a [`crate::static_index::StaticIndex`].
#[derive(Debug, Error)]
pub enum StaticLoadError {
    #[error("static feed is missing required table {0}")]
    MissingTable(&'static str),

    #[error("{table} is missing required column {column}")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error("failed to read {table}: {source}")]
    Csv {
        table: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("failed to open archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A request parameter violates the query rules. Surfaced as HTTP 400.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{param} must be one of {allowed}, got '{value}'")]
    NotAllowed {
        param: &'static str,
        value: String,
        allowed: &'static str,
    },

    #[error("{param} must be a non-negative integer, got '{value}'")]
    NotANonNegativeInteger { param: &'static str, value: String },

    #[error("unknown line '{0}'")]
    UnknownLine(String),

    #[error("unknown stop '{0}'")]
    UnknownStop(String),

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),
}

/// Internal failure while building a response. Surfaced as HTTP 500.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("request cancelled")]
    Cancelled,

    #[error("failed to serialize response: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

/// Everything a request can fail with.
#[derive(Debug, Error)]
pub enum SiriError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Build(#[from] BuildError),
}

impl SiriError {
    /// HTTP status the transport should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            SiriError::Validation(_) => 400,
            SiriError::Build(_) => 500,
        }
    }
}
