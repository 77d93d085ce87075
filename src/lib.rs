//! Geotagged photos on a satellite map.
//!
//! Photos are ingested from an image directory (or a running instance over HTTP), placed
//! as markers, and collapsed into heat points when the map is zoomed out. The HTTP
//! service in [`server`] hands the resulting scene to the browser page.

use tracing::warn;

pub use cache::Cache;
pub use config::Config;
pub use coords::{BoundingBox, LatLng};
pub use photo_metadata::{PhotoDetails, PhotoRecord};
pub use session::{LoadSummary, Session};

pub mod cache;
pub mod cluster;
pub mod config;
pub mod coords;
pub mod exif_reader;
pub mod geocode;
pub mod ingest;
pub mod photo_metadata;
pub mod registry;
pub mod server;
pub mod session;
pub mod surface;

use exif_reader::KamadakReader;
use geocode::HttpGeocoder;
use ingest::{discover, IngestReport, Ingestor, ResourceSource};
use surface::SceneSurface;

/// Discovers and ingests every photo `source` offers, falling back to the configured
/// candidate names when it cannot list.
pub fn scan<S: ResourceSource + ?Sized>(source: &S, config: &Config) -> IngestReport {
    let names = discover(source, &config.candidate_files);
    let ingestor = Ingestor::new(KamadakReader);
    let ingestor = match Cache::new(&config.cache_dir.join("exif")) {
        Ok(cache) => ingestor.with_cache(cache),
        Err(e) => {
            warn!("exif cache disabled: {}", e);
            ingestor
        }
    };
    ingestor.ingest_all(source, &names)
}

/// A session over the configured image directory, loaded and ready to serve.
pub fn open_session(config: &Config) -> (Session<SceneSurface>, LoadSummary) {
    let source = ingest::DirectorySource::new(&config.image_dir, &config.image_url_prefix());
    let report = scan(&source, config);

    let mut session = Session::mount(SceneSurface::default(), config.fit_padding);
    let summary = session.load(report);
    (session, summary)
}

pub fn geocoder(config: &Config) -> HttpGeocoder {
    let geocoder = HttpGeocoder::new(
        config.geocoder.provider,
        config.geocoder.mapbox_token.clone(),
        &config.geocoder.user_agent,
    );
    match Cache::new(&config.cache_dir.join("geocode")) {
        Ok(cache) => geocoder.with_cache(cache),
        Err(e) => {
            warn!("geocode cache disabled: {}", e);
            geocoder
        }
    }
}
