//! CLI entry point for the GTFS-RT to SIRI converter.
//!
//! `serve` runs the HTTP service with a background feed refresh; `convert`
//! fetches the feeds once and writes a single response to stdout.

use std::ffi::OsStr;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gtfs_rt_siri::{
    config::{Config, config_path},
    converter::CancelToken,
    request::{CallKind, Format},
    server,
    state::{self, AppState},
    validate::{self, Params},
};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_rt_siri")]
#[command(about = "Serve GTFS and GTFS-RT feeds as SIRI", long_about = None)]
struct Cli {
    /// Path to the JSON config (falls back to GTFS_RT_SIRI_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Name of the `feeds[]` entry to overlay on the top-level config
    #[arg(short, long, global = true)]
    feed: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve,
    /// Fetch the feeds once and print one response
    Convert {
        /// Call kind: vm, sm, et or sx
        #[arg(value_name = "CALL")]
        call: String,

        /// Response format: json or xml
        #[arg(long, default_value = "json")]
        format: String,

        /// Overrides gtfsrt.tripUpdatesURL
        #[arg(long)]
        trip_updates_url: Option<String>,

        /// Overrides gtfsrt.vehiclePositionsURL
        #[arg(long)]
        vehicle_positions_url: Option<String>,

        /// Overrides gtfsrt.serviceAlertsURL
        #[arg(long)]
        service_alerts_url: Option<String>,

        #[arg(long)]
        monitoring_ref: Option<String>,

        #[arg(long)]
        max_onward: Option<String>,

        #[arg(long)]
        line_ref: Option<String>,

        #[arg(long)]
        direction_ref: Option<String>,

        /// Agency id; other operators' trips are left out
        #[arg(long)]
        operator_ref: Option<String>,

        #[arg(long)]
        maximum_stop_visits: Option<String>,

        #[arg(long)]
        minimum_stop_visits_per_line: Option<String>,

        /// normal or calls
        #[arg(long)]
        detail_level: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/gtfs_rt_siri.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_rt_siri.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let path = config_path(cli.config).context("no config: pass --config or set GTFS_RT_SIRI_CONFIG")?;
    let mut config = Config::load(&path, cli.feed.as_deref())
        .with_context(|| format!("failed to load config {path}"))?;

    match cli.command {
        Commands::Serve => serve(config).await?,
        Commands::Convert {
            call,
            format,
            trip_updates_url,
            vehicle_positions_url,
            service_alerts_url,
            monitoring_ref,
            max_onward,
            line_ref,
            direction_ref,
            operator_ref,
            maximum_stop_visits,
            minimum_stop_visits_per_line,
            detail_level,
        } => {
            let Some(kind) = CallKind::parse(&call) else {
                bail!("unknown call kind '{call}', expected vm, sm, et or sx");
            };
            let Some(format) = Format::parse(&format) else {
                bail!("unknown format '{format}', expected json or xml");
            };
            if trip_updates_url.is_some() {
                config.gtfsrt.trip_updates_url = trip_updates_url;
            }
            if vehicle_positions_url.is_some() {
                config.gtfsrt.vehicle_positions_url = vehicle_positions_url;
            }
            if service_alerts_url.is_some() {
                config.gtfsrt.service_alerts_url = service_alerts_url;
            }

            let params = Params::new(
                [
                    (validate::MONITORING_REF, monitoring_ref),
                    (validate::MAXIMUM_ONWARD_CALLS, max_onward),
                    (validate::LINE_REF, line_ref),
                    (validate::DIRECTION_REF, direction_ref),
                    (validate::OPERATOR_REF, operator_ref),
                    (validate::MAXIMUM_STOP_VISITS, maximum_stop_visits),
                    (validate::MINIMUM_STOP_VISITS_PER_LINE, minimum_stop_visits_per_line),
                    (validate::DETAIL_LEVEL, detail_level),
                ]
                .into_iter()
                .filter_map(|(name, value)| value.map(|v| (name, v))),
            );
            convert(config, kind, format, &params).await?;
        }
    }

    Ok(())
}

/// Loads the schedule, installs the first live generation and serves until stopped.
async fn serve(config: Config) -> Result<()> {
    let client = config.gtfsrt.client()?;
    let static_index = state::load_static(&client, &config).await?;

    let state = Arc::new(AppState::new(
        Arc::new(static_index),
        config.converter_settings(),
        Utc::now().timestamp(),
    ));
    state.refresh_generation(&client, &config.gtfsrt).await;

    info!(interval_ms = config.gtfsrt.read_interval_ms, "Starting feed refresh");
    tokio::spawn(state::run_refresh_loop(
        Arc::clone(&state),
        client,
        config.gtfsrt.clone(),
    ));

    server::serve(
        state,
        config.server.port,
        Duration::from_millis(config.server.request_timeout_ms),
    )
    .await
    .context("HTTP server failed")
}

/// One-shot conversion written to stdout.
#[tracing::instrument(skip(config, params))]
async fn convert(config: Config, kind: CallKind, format: Format, params: &Params) -> Result<()> {
    let client = config.gtfsrt.client()?;
    let static_index = state::load_static(&client, &config).await?;

    let request = validate::validate(kind, format, params, &static_index)?;
    let state = AppState::new(
        Arc::new(static_index),
        config.converter_settings(),
        Utc::now().timestamp(),
    );
    state.refresh_generation(&client, &config.gtfsrt).await;

    let bytes = state.respond(&request, Utc::now().timestamp(), &CancelToken::new())?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes)?;
    stdout.write_all(b"\n")?;
    Ok(())
}
