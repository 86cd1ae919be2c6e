//! Process-wide service state: the static index, the current live generation
//! and the background refresh that replaces it.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{Instrument, debug, error, info, warn};

use crate::cache::ResponseCache;
use crate::config::{Config, GtfsRtConfig};
use crate::converter::{self, BuildContext, CancelToken, ConverterSettings};
use crate::error::{FetchError, SiriError};
use crate::fetch::{HttpClient, is_remote, load_source};
use crate::gtfs_rt::FeedMessage;
use crate::live_index::{FeedKind, LiveIndex, RealtimeMessages};
use crate::output;
use crate::parser::parse_feed;
use crate::request::{Format, SiriRequest};
use crate::snapshot::SnapshotTracker;
use crate::static_index::loader::{DirSource, ZipSource};
use crate::static_index::{StaticIndex, StaticOptions};
use crate::stats::GenerationStats;

/// One live index with the snapshot and responses derived from it. All
/// three are replaced together.
#[derive(Debug)]
pub struct Generation {
    pub live: LiveIndex,
    pub cache: ResponseCache,
    pub tracker: SnapshotTracker,
    pub stats: GenerationStats,
}

impl Generation {
    fn new(live: LiveIndex, tracker: SnapshotTracker, built_at: DateTime<Utc>) -> Self {
        let stats = GenerationStats::from_live(&live, built_at);
        Self {
            live,
            cache: ResponseCache::new(),
            tracker,
            stats,
        }
    }
}

#[derive(Debug)]
pub struct AppState {
    static_index: Arc<StaticIndex>,
    settings: ConverterSettings,
    generation: RwLock<Arc<Generation>>,
}

impl AppState {
    /// State with an empty generation; every feed counts as missing until
    /// the first refresh.
    pub fn new(static_index: Arc<StaticIndex>, settings: ConverterSettings, now: i64) -> Self {
        let live = LiveIndex::build(&RealtimeMessages::default(), &static_index, now);
        Self {
            generation: RwLock::new(Arc::new(Generation::new(
                live,
                SnapshotTracker::new(),
                epoch_to_utc(now),
            ))),
            static_index,
            settings,
        }
    }

    pub fn static_index(&self) -> &StaticIndex {
        &self.static_index
    }

    pub fn settings(&self) -> &ConverterSettings {
        &self.settings
    }

    /// The generation a request should read for its whole duration.
    pub fn current(&self) -> Arc<Generation> {
        let guard = self.generation.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Indexes `messages` and swaps the result in. The previous generation's
    /// cache and snapshot go with it; its last snapshot is only kept as the
    /// prior of the next one.
    pub fn install(&self, messages: &RealtimeMessages, now: i64) -> Arc<Generation> {
        let live = LiveIndex::build(messages, &self.static_index, now);

        let mut guard = self.generation.write().unwrap_or_else(PoisonError::into_inner);
        let tracker = SnapshotTracker::following(&guard.tracker);
        let generation = Arc::new(Generation::new(live, tracker, epoch_to_utc(now)));
        *guard = Arc::clone(&generation);
        drop(guard);

        log_stats(&generation.stats);
        generation
    }

    /// Rendered response for a validated request, from the cache when the
    /// current generation already built it.
    pub fn respond(&self, request: &SiriRequest, now: i64, cancel: &CancelToken) -> Result<Bytes, SiriError> {
        let generation = self.current();
        if let Some(bytes) = generation.cache.get(request) {
            debug!(call = request.call.kind(), "Cache hit");
            return Ok(bytes);
        }

        let snapshot = generation.tracker.snapshot(&generation.live, &self.static_index, now);
        let ctx = BuildContext {
            static_index: &self.static_index,
            live: &generation.live,
            snapshot: &snapshot,
            settings: &self.settings,
            now,
            cancel,
        };
        let siri = converter::build(&ctx, request)?;
        let bytes = output::render(&siri, request.format)?;
        generation.cache.insert(request.clone(), bytes.clone());
        Ok(bytes)
    }

    /// SIRI error payload for `message`. Falls back to the bare message if
    /// even the payload cannot be rendered.
    pub fn error_body(&self, message: &str, format: Format, now: i64) -> Bytes {
        let timestamp = epoch_to_utc(now).to_rfc3339_opts(SecondsFormat::Secs, true);
        output::render_error(
            timestamp,
            self.static_index.codespace().to_string(),
            message.to_string(),
            format,
        )
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to render error payload");
            Bytes::from(message.to_string())
        })
    }

    /// Fetches the three live feeds and installs a new generation.
    #[tracing::instrument(skip_all)]
    pub async fn refresh_generation<C: HttpClient>(&self, client: &C, feeds: &GtfsRtConfig) -> Arc<Generation> {
        let messages = fetch_feeds(client, feeds).await;
        self.install(&messages, Utc::now().timestamp())
    }
}

/// Refreshes `state` every `readIntervalMS` until the task is dropped. The
/// first refresh happens one interval from now.
pub async fn run_refresh_loop<C: HttpClient>(state: Arc<AppState>, client: C, feeds: GtfsRtConfig) {
    let period = Duration::from_millis(feeds.read_interval_ms);
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        state.refresh_generation(&client, &feeds).await;
    }
}

/// Fetches the configured feeds concurrently. A feed that is unconfigured,
/// unreachable, slow or undecodable is left absent.
pub async fn fetch_feeds<C: HttpClient>(client: &C, feeds: &GtfsRtConfig) -> RealtimeMessages {
    let (trip_updates, vehicle_positions, alerts) = tokio::join!(
        fetch_feed(client, FeedKind::TripUpdates, feeds),
        fetch_feed(client, FeedKind::VehiclePositions, feeds),
        fetch_feed(client, FeedKind::Alerts, feeds),
    );
    RealtimeMessages {
        trip_updates,
        vehicle_positions,
        alerts,
    }
}

async fn fetch_feed<C: HttpClient>(client: &C, kind: FeedKind, feeds: &GtfsRtConfig) -> Option<FeedMessage> {
    let Some(source) = feeds.url(kind) else {
        debug!(feed = kind.as_str(), "Feed not configured");
        return None;
    };
    let span = tracing::info_span!("fetch_feed", feed = kind.as_str());
    async move {
        match fetch_message(client, kind, source, feeds.timeout_ms).await {
            Ok(message) => {
                debug!(entities = message.entity.len(), "Feed parsed");
                Some(message)
            }
            Err(e) => {
                warn!(error = %e, "Feed absent for this generation");
                None
            }
        }
    }
    .instrument(span)
    .await
}

async fn fetch_message<C: HttpClient>(
    client: &C,
    kind: FeedKind,
    source: &str,
    timeout_ms: u64,
) -> Result<FeedMessage, FetchError> {
    let bytes = tokio::time::timeout(Duration::from_millis(timeout_ms), load_source(client, source))
        .await
        .map_err(|_| FetchError::Timeout {
            source_name: kind.as_str().to_string(),
            timeout_ms,
        })??;
    parse_feed(&bytes)
}

/// Loads the static schedule named by `gtfs.staticURL`: a URL or file of a
/// zip archive, or an unpacked directory.
#[tracing::instrument(skip_all, fields(source = %config.gtfs.static_url))]
pub async fn load_static<C: HttpClient>(client: &C, config: &Config) -> Result<StaticIndex> {
    let options = config.static_options()?;
    let source = config.gtfs.static_url.clone();

    if !is_remote(&source) && Path::new(&source).is_dir() {
        return tokio::task::spawn_blocking(move || {
            StaticIndex::load(&mut DirSource(source.into()), &options)
        })
        .await
        .context("static load task failed")?
        .context("failed to load static schedule directory");
    }

    let bytes = load_source(client, &source)
        .await
        .with_context(|| format!("failed to read static schedule from {source}"))?;
    info!(bytes = bytes.len(), "Static archive read");
    tokio::task::spawn_blocking(move || load_zip(bytes, &options))
        .await
        .context("static load task failed")?
        .context("failed to load static schedule archive")
}

fn load_zip(bytes: Vec<u8>, options: &StaticOptions) -> Result<StaticIndex, crate::error::StaticLoadError> {
    let mut archive = ZipSource::from_bytes(bytes)?;
    StaticIndex::load(&mut archive, options)
}

fn log_stats(stats: &GenerationStats) {
    info!(
        feed_timestamp = stats.feed_timestamp,
        trip_updates = stats.trip_updates,
        vehicle_positions = stats.vehicle_positions,
        alerts = stats.alerts,
        trips = stats.trips,
        position_pct = stats.position_pct(),
        bearing_pct = stats.bearing_pct(),
        missing_feeds = ?stats.missing_feeds,
        "Live generation installed"
    );
}

fn epoch_to_utc(epoch: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(epoch, 0).unwrap_or_default()
}
