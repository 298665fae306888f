//! CLI entry point for the bus departures tool.
//!
//! Provides subcommands for finding the nearest stop to a position,
//! resolving a stop's departure board once, and watching a stop with
//! periodic refresh.

use anyhow::{Context, Result, bail};
use bus_departures::{
    config::Config,
    features::GeoJsonFeatureSource,
    geo::Coordinate,
    locator::{NearestStop, locate_nearest},
    output::{append_departures, print_json, print_pretty},
    refresh::spawn_refresh,
    resolver::DepartureResolver,
    stop::find_stop,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bus_departures")]
#[command(about = "Find nearby bus stops and resolve their departures", long_about = None)]
struct Cli {
    /// JSON config file; environment variables override its fields
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the stop nearest to a position
    Nearest {
        /// GeoJSON FeatureCollection of stop points
        #[arg(short, long)]
        stops: String,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Override the configured search radius
        #[arg(short, long)]
        radius_km: Option<f64>,

        /// Report the nearest stop even when it is beyond the radius
        #[arg(long, default_value_t = false)]
        show_anyway: bool,
    },
    /// Resolve the departure board of a stop once
    Departures {
        #[arg(short, long)]
        stops: String,

        #[arg(long)]
        stop_id: String,

        /// CSV file to append results to
        #[arg(short, long)]
        output: Option<String>,

        /// Log the full resolution as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Keep a stop's departure board refreshed
    Watch {
        #[arg(short, long)]
        stops: String,

        #[arg(long)]
        stop_id: String,

        /// Refresh interval in seconds (defaults to the configured 30)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Number of boards to collect (0 = until Ctrl+C)
        #[arg(short = 'n', long, default_value_t = 0)]
        num_samples: usize,

        /// CSV file to append every board to
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/bus_departures.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bus_departures.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Nearest {
            stops,
            lat,
            lon,
            radius_km,
            show_anyway,
        } => {
            let source = GeoJsonFeatureSource::load(&stops, &config.stop_layer)?;
            let radius = radius_km.unwrap_or(config.max_radius_km);
            let user = Coordinate::new(lat, lon);

            match locate_nearest(&source, &config.stop_layer, &user, radius) {
                NearestStop::Found { stop, distance_km } => {
                    info!(stop_id = %stop.id, name = %stop.name, distance_km, "Nearest stop");
                }
                NearestStop::NearestTooFar { stop, distance_km } if show_anyway => {
                    warn!(stop_id = %stop.id, name = %stop.name, distance_km, radius, "Nearest stop is beyond radius, showing anyway");
                }
                NearestStop::NearestTooFar { distance_km, .. } => {
                    bail!("nearest stop is {distance_km:.2} km away, beyond the {radius} km radius (use --show-anyway)");
                }
                NearestStop::NoStopsFound => bail!("no stops found in {stops}"),
            }
        }
        Commands::Departures {
            stops,
            stop_id,
            output,
            json,
        } => {
            let tz = config.tz()?;
            let source = GeoJsonFeatureSource::load(&stops, &config.stop_layer)?;
            let stop = find_stop(&source, &config.stop_layer, &stop_id)
                .with_context(|| format!("stop '{stop_id}' not found in {stops}"))?;

            let resolver = DepartureResolver::new(config.live_client()?).with_window(config.time_window()?);
            let now = Utc::now().with_timezone(&tz);
            let resolution = resolver.resolve(&stop, &now).await;

            print_pretty(&stop, &resolution);
            if json {
                print_json(&resolution)?;
            }
            if let Some(path) = output {
                append_departures(&path, &stop, &resolution)?;
            }
        }
        Commands::Watch {
            stops,
            stop_id,
            interval,
            num_samples,
            output,
        } => {
            watch(&config, &stops, &stop_id, interval, num_samples, output).await?;
        }
    }

    Ok(())
}

/// Selects one stop and logs each refreshed board until the sample limit
/// or Ctrl+C.
#[tracing::instrument(skip(config, output))]
async fn watch(
    config: &Config,
    stops: &str,
    stop_id: &str,
    interval: Option<u64>,
    num_samples: usize,
    output: Option<String>,
) -> Result<()> {
    let tz = config.tz()?;
    let source = GeoJsonFeatureSource::load(stops, &config.stop_layer)?;
    let stop = find_stop(&source, &config.stop_layer, stop_id)
        .with_context(|| format!("stop '{stop_id}' not found in {stops}"))?;

    let period = interval
        .map(|s| Duration::from_secs(s.max(1)))
        .unwrap_or_else(|| config.refresh_interval());

    let resolver = Arc::new(DepartureResolver::new(config.live_client()?).with_window(config.time_window()?));
    let (tx, mut boards) = mpsc::channel(4);
    let handle = spawn_refresh(resolver, tz, period, tx);
    handle.select(stop);

    if num_samples == 0 {
        info!(period_secs = period.as_secs(), "Watching infinitely. Press Ctrl+C to stop.");
    } else {
        info!(num_samples, period_secs = period.as_secs(), "Starting watch");
    }

    let mut sample_count = 0;
    loop {
        tokio::select! {
            board = boards.recv() => {
                let Some(board) = board else {
                    warn!("Refresh task ended unexpectedly");
                    break;
                };
                sample_count += 1;
                print_pretty(&board.stop, &board.resolution);
                if let Some(path) = &output {
                    if let Err(e) = append_departures(path, &board.stop, &board.resolution) {
                        error!(error = %e, "Failed to write departures");
                    }
                }
                if num_samples > 0 && sample_count >= num_samples {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    handle.shutdown().await;
    info!(sample_count, "Watch finished");
    Ok(())
}
