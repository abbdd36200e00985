//! CLI entry point for the transit tracker.
//!
//! Provides a long-running serve mode that polls the feed and exposes the
//! HTTP API, plus a one-shot probe for inspecting a feed by hand.

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use transit_tracker::{
    api::{self, AppState},
    config::Config,
    decoder::{decode_positions, parse_feed},
    estimator::{Tuning, estimate},
    fetch::{
        BasicClient, HttpClient,
        auth::{ApiKey, UrlParam},
        fetch_bytes,
    },
    poller::Poller,
    snapshot::format_delay,
};

#[derive(Parser)]
#[command(name = "transit_tracker")]
#[command(about = "Live transit vehicle tracker with delay inference", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured feed continuously and serve the HTTP API
    Serve,
    /// Decode a feed once and log every vehicle it carries
    Probe {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/transit_tracker.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("transit_tracker.log"));

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

    match cli.command {
        Commands::Serve => serve().await?,
        Commands::Probe { source } => probe(&source).await?,
    }

    Ok(())
}

/// Wires config, poller and API together and runs until the process dies.
async fn serve() -> Result<()> {
    let config = Config::from_env()?;

    let base = BasicClient::new()?;
    let client: Box<dyn HttpClient> = match &config.auth_header {
        Some(header) => Box::new(ApiKey::new(base, header, &config.api_key)?),
        None => Box::new(UrlParam::new(
            base,
            config.api_key_param.clone(),
            config.api_key.clone(),
        )),
    };

    let (poller, handle, published) = Poller::new(
        client,
        config.feed_url.clone(),
        config.poll_interval,
        Tuning::default(),
    );

    tokio::spawn(poller.run());

    api::serve(
        config.bind_addr,
        AppState {
            published,
            poller: handle,
        },
    )
    .await
}

/// Decodes one feed and logs its vehicles, with the delay each would get on
/// first sighting (report staleness and stopped status; no history yet).
async fn probe(source: &str) -> Result<()> {
    let bytes = load_source(source).await?;
    let feed = parse_feed(&bytes)?;

    let now = Utc::now();
    let observations = decode_positions(&feed, now);
    info!(
        entities = feed.entity.len(),
        vehicles = observations.len(),
        feed_timestamp = feed.header.timestamp,
        "Feed decoded"
    );

    let tuning = Tuning::default();
    for obs in &observations {
        let delay = estimate(&tuning, None, obs, now);
        info!(
            vehicle = %obs.vehicle_id,
            trip = obs.trip.trip_id.as_deref().unwrap_or("-"),
            lat = obs.position.lat,
            lng = obs.position.lng,
            status = ?obs.status,
            delay = %format_delay(delay.round() as u32),
            "Vehicle"
        );
    }

    Ok(())
}

/// Loads feed bytes from a local file path or fetches them over HTTP.
#[tracing::instrument(fields(source = %source))]
async fn load_source(source: &str) -> Result<Vec<u8>> {
    let bytes = if source.starts_with("http") {
        let client = BasicClient::new()?;
        fetch_bytes(&client, source).await?.to_vec()
    } else {
        std::fs::read(source)?
    };
    Ok(bytes)
}
