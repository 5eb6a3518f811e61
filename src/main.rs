//! CLI entry point for subway_nearby.
//!
//! Provides subcommands for the nearby arrivals board, raw nearest-station
//! queries, feed inspection, and reading the stored nearest-station snapshot.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use subway_nearby::{
    alerts::AlertService,
    config::Config,
    dashboard::{Dashboard, Phase},
    feeds::FeedSource,
    fetch::{HttpClient, HttpFeedTransport, build_client, fetch_bytes},
    location::StaticLocation,
    models::Coordinate,
    output::{append_record, render_snapshot, render_stations, render_summary, to_json},
    parser::parse_feed,
    realtime::{RealtimeService, Summary},
    snapshot::{JsonFileSnapshotStore, SnapshotStore},
    stats::FeedStats,
};
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "subway_nearby")]
#[command(about = "Live NYC subway arrivals near a location", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show upcoming arrivals and active alerts for stations near a point
    Nearby {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Maximum number of stations (defaults to 5)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Search radius in metres (defaults to 1600)
        #[arg(short = 'd', long)]
        max_distance: Option<f64>,

        /// Print JSON instead of a text board
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Keep refreshing until Ctrl+C
        #[arg(short, long, default_value_t = false)]
        watch: bool,
    },
    /// List the stations nearest to a point
    Stations {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        #[arg(short = 'd', long, default_value_t = 1600.0)]
        max_distance: f64,

        /// Return nothing rather than the nearest stations outside the radius
        #[arg(long, default_value_t = false)]
        no_fallback: bool,
    },
    /// Decode a trip feed and print field coverage
    Inspect {
        /// Feed name (e.g. "nqrw"), path to file, or URL to fetch
        #[arg(value_name = "FEED_FILE_OR_URL")]
        source: String,

        /// CSV file to append results to
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Print the stored nearest-station snapshot
    Snapshot {
        /// Remove the stored snapshot instead
        #[arg(long, default_value_t = false)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/subway_nearby.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("subway_nearby.log"));

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
    let config = Config::from_env();

    match cli.command {
        Commands::Nearby {
            lat,
            lon,
            limit,
            max_distance,
            json,
            watch,
        } => {
            nearby(&config, Coordinate::new(lat, lon), limit, max_distance, json, watch).await?;
        }
        Commands::Stations {
            lat,
            lon,
            limit,
            max_distance,
            no_fallback,
        } => {
            let index = config
                .load_station_index()
                .context("failed to load station data")?;
            let stations =
                index.nearest_stations(Coordinate::new(lat, lon), limit, max_distance, !no_fallback);

            info!(count = stations.len(), "Nearest stations");
            print!("{}", render_stations(&stations));
        }
        Commands::Inspect { source, output } => {
            let client = build_client(config.api_key.as_deref())?;
            inspect(&config, client.as_ref(), &source, output.as_deref()).await?;
        }
        Commands::Snapshot { clear } => {
            let store = JsonFileSnapshotStore::new(&config.snapshot_path);
            if clear {
                store.clear()?;
                info!(path = %store.path().display(), "Snapshot cleared");
            } else {
                match store.load() {
                    Some(snapshot) => print!("{}", render_snapshot(&snapshot, Utc::now())),
                    None => println!("No snapshot stored at {}", store.path().display()),
                }
            }
        }
    }

    Ok(())
}

/// Runs the dashboard once, or keeps it refreshing until Ctrl+C.
#[tracing::instrument(skip(config, limit, max_distance), fields(lat = here.latitude, lon = here.longitude))]
async fn nearby(
    config: &Config,
    here: Coordinate,
    limit: Option<usize>,
    max_distance: Option<f64>,
    json: bool,
    watch: bool,
) -> Result<()> {
    let index = Arc::new(
        config
            .load_station_index()
            .context("failed to load station data")?,
    );
    let client = build_client(config.api_key.as_deref())?;

    let transport = HttpFeedTransport::new(client.clone(), config.feed_base_url.clone())
        .with_timeout(config.feed_timeout);
    let alerts =
        AlertService::new(client, config.alerts_url.clone()).with_timeout(config.alerts_timeout);
    let store = JsonFileSnapshotStore::new(&config.snapshot_path);

    let mut settings = config.dashboard;
    if let Some(limit) = limit {
        settings.limit = limit;
    }
    if let Some(max_distance) = max_distance {
        settings.max_distance = max_distance.max(0.0);
    }

    let dashboard = Dashboard::new(
        Arc::new(StaticLocation::new(here)),
        RealtimeService::new(Arc::new(transport), index),
        Arc::new(alerts),
        Some(Arc::new(store)),
        settings,
    );

    let mut rx = dashboard.subscribe();
    dashboard.start();

    if watch {
        info!("Watching for updates. Press Ctrl+C to stop.");
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = rx.changed() => changed?,
            _ = &mut ctrl_c => {
                info!("Stopping");
                break;
            }
        }

        let state = rx.borrow_and_update().clone();
        match state.phase {
            Phase::Ready => {
                let summary = Summary {
                    stations: state.stations,
                    alerts: state.alerts,
                };
                if json {
                    println!("{}", to_json(&summary)?);
                } else {
                    print!("{}", render_summary(&summary, Utc::now()));
                }
                if !watch {
                    break;
                }
            }
            Phase::Error(message) => {
                if !watch {
                    bail!(message);
                }
                error!(%message, "Refresh failed");
                tokio::select! {
                    _ = tokio::time::sleep(settings.refresh_interval) => dashboard.refresh_silently(),
                    _ = &mut ctrl_c => {
                        info!("Stopping");
                        break;
                    }
                }
            }
            Phase::Idle | Phase::Loading => {}
        }
    }

    dashboard.stop();
    Ok(())
}

/// Loads feed data from a named feed, a local file path, or over HTTP, and
/// reports its field coverage.
#[tracing::instrument(skip(config, client), fields(source = %source))]
async fn inspect(
    config: &Config,
    client: &dyn HttpClient,
    source: &str,
    output: Option<&str>,
) -> Result<()> {
    let feed = FeedSource::ALL.into_iter().find(|f| f.name() == source);

    let fetched = match feed {
        Some(feed) => fetch_bytes(client, &feed.url(&config.feed_base_url), config.feed_timeout)
            .await
            .map(|b| b.to_vec())
            .map_err(anyhow::Error::from),
        None if source.starts_with("http") => fetch_bytes(client, source, config.feed_timeout)
            .await
            .map(|b| b.to_vec())
            .map_err(anyhow::Error::from),
        None => std::fs::read(source).with_context(|| format!("failed to read {source}")),
    };
    let feed_id = feed.map(|f| f.name());

    let bytes = match fetched {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Feed fetch failed");
            if let Some(path) = output {
                let error_stats =
                    FeedStats::from_error("fetch_error", &e.to_string()).with_source(feed_id, source);
                append_record(path, &error_stats)?;
            }
            return Err(e);
        }
    };

    let trip_updates = parse_feed(&bytes);
    let stats = FeedStats::from_trip_updates(&trip_updates, bytes.len()).with_source(feed_id, source);
    info!(
        trip_updates = stats.trip_updates,
        stop_time_updates = stats.stop_time_updates,
        arrival_pct = stats.arrival_pct(),
        "Feed decoded"
    );

    if let Some(path) = output {
        append_record(path, &stats)?;
    }
    println!("{}", to_json(&stats)?);
    Ok(())
}
