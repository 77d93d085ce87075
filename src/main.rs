use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use photomap::geocode::{parse_coordinates, Geocoder};
use photomap::ingest::{DirectorySource, HttpSource, IngestOutcome};
use photomap::server::{self, AppState};
use photomap::Config;

/// Plot geotagged photos on a satellite map
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./photomap.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, action)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the map page, the images and the JSON API
    Serve {
        /// Address to listen on, e.g. 127.0.0.1:8000
        #[arg(short, long)]
        bind: Option<String>,
        /// Directory holding the photos
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Print the location of every geotagged photo
    Scan {
        /// Directory holding the photos
        #[arg(short, long, conflicts_with = "url")]
        dir: Option<PathBuf>,
        /// Base URL of a running photomap service
        #[arg(short, long)]
        url: Option<String>,
    },
    /// Look up a place name
    Search {
        query: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Serve { bind, dir } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(dir) = dir {
                config.image_dir = dir;
            }
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(serve(config))
        }
        Command::Scan { dir, url } => {
            if let Some(dir) = dir {
                config.image_dir = dir;
            }
            scan(&config, url.as_deref());
            Ok(())
        }
        Command::Search { query } => search(&config, &query),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let session_config = config.clone();
    let (session, summary) = tokio::task::spawn_blocking(move || photomap::open_session(&session_config))
        .await
        .context("photo ingestion panicked")?;
    match summary.notice() {
        Some(notice) => warn!("{}", notice),
        None => info!("{} photos on the map, {} skipped", summary.markers, summary.skipped),
    }

    let geocoder = photomap::geocoder(&config);
    let state = Arc::new(AppState::new(session, geocoder, &config));
    server::serve(state, &config)
        .await
        .with_context(|| format!("serving on {}", config.bind))
}

fn scan(config: &Config, url: Option<&str>) {
    let report = match url {
        Some(url) => {
            let prefix = config.image_url_prefix();
            photomap::scan(&HttpSource::new(url, &prefix), config)
        }
        None => {
            let source = DirectorySource::new(&config.image_dir, &config.image_url_prefix());
            photomap::scan(&source, config)
        }
    };

    for outcome in &report.outcomes {
        match outcome {
            IngestOutcome::Record(photo) => {
                println!("{:.6}\t{:.6}\t{}", photo.lat, photo.lng, photo.name)
            }
            IngestOutcome::NoLocation { name } => info!("Skipping {} (no GPS data)", name),
            IngestOutcome::Failed { name, reason } => warn!("Skipping {}: {}", name, reason),
        }
    }
    info!(
        "Found {} geotagged photos, skipped {}",
        report.record_count(),
        report.skipped_count()
    );
}

fn search(config: &Config, query: &str) -> anyhow::Result<()> {
    let pos = match parse_coordinates(query) {
        Some(pos) => pos,
        None => photomap::geocoder(config).geocode(query)?,
    };
    println!("{:.6}\t{:.6}", pos.lat, pos.lng);
    Ok(())
}
