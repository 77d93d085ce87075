use std::{
    fs, io,
    path::{Path, PathBuf},
};

use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::coords::{dms_to_decimal, BoundingBox, Hemisphere, LatLng};
use crate::exif_reader::{TagReadError, TagReader};
use crate::photo_metadata::{PhotoRecord, TagMap};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "heic"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to fetch {url}: {source}")]
    Fetch { url: String, source: reqwest::Error },
    #[error(transparent)]
    Tags(#[from] TagReadError),
}

/// Where image bytes come from.
pub trait ResourceSource {
    /// Dynamic listing of image names. `None` when the source cannot list.
    fn list(&self) -> Option<Vec<String>>;
    fn exists(&self, name: &str) -> bool;
    fn fetch(&self, name: &str) -> Result<Vec<u8>, IngestError>;
    /// URL path the image will be served under.
    fn image_ref(&self, name: &str) -> String;
}

/// Names to ingest: the listing when available, otherwise the candidates that exist.
pub fn discover<S: ResourceSource + ?Sized>(source: &S, candidates: &[String]) -> Vec<String> {
    if let Some(files) = source.list() {
        info!("listing returned {} images", files.len());
        return files;
    }
    debug!("no listing available, probing {} candidates", candidates.len());
    candidates
        .iter()
        .filter(|name| source.exists(name))
        .cloned()
        .collect()
}

/// Images in one local directory, served under `url_prefix`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    url_prefix: String,
}

impl DirectorySource {
    pub fn new(root: &Path, url_prefix: &str) -> DirectorySource {
        DirectorySource {
            root: root.to_path_buf(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceSource for DirectorySource {
    fn list(&self) -> Option<Vec<String>> {
        if !self.root.is_dir() {
            return None;
        }
        let pattern = format!("*.{{{}}}", IMAGE_EXTENSIONS.join(","));
        let walker = globwalk::GlobWalkerBuilder::from_patterns(&self.root, &[pattern])
            .max_depth(1)
            .case_insensitive(true)
            .build();
        let walker = match walker {
            Ok(walker) => walker,
            Err(e) => {
                warn!("cannot list {}: {}", self.root.display(), e);
                return None;
            }
        };
        let mut files: Vec<String> = walker
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        files.sort();
        Some(files)
    }

    fn exists(&self, name: &str) -> bool {
        self.root.join(name).is_file()
    }

    fn fetch(&self, name: &str) -> Result<Vec<u8>, IngestError> {
        let path = self.root.join(name);
        fs::read(&path).map_err(|source| IngestError::Read { path, source })
    }

    fn image_ref(&self, name: &str) -> String {
        format!("{}/{}", self.url_prefix, name)
    }
}

#[derive(Deserialize)]
struct Listing {
    files: Vec<String>,
}

/// A running photomap service reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSource {
    base_url: String,
    image_dir: String,
    client: Client,
}

impl HttpSource {
    pub fn new(base_url: &str, image_dir: &str) -> HttpSource {
        HttpSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            image_dir: image_dir.trim_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn url(&self, name: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.image_dir, name)
    }
}

impl ResourceSource for HttpSource {
    fn list(&self) -> Option<Vec<String>> {
        let url = format!("{}/api/images", self.base_url);
        let res = match self.client.get(&url).send() {
            Ok(res) if res.status().is_success() => res,
            Ok(res) => {
                debug!("listing endpoint answered {}", res.status());
                return None;
            }
            Err(e) => {
                debug!("listing endpoint unreachable: {}", e);
                return None;
            }
        };
        match res.json::<Listing>() {
            Ok(listing) => Some(listing.files),
            Err(e) => {
                warn!("listing endpoint returned malformed JSON: {}", e);
                None
            }
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.client
            .head(self.url(name))
            .send()
            .map(|res| res.status().is_success())
            .unwrap_or(false)
    }

    fn fetch(&self, name: &str) -> Result<Vec<u8>, IngestError> {
        let url = self.url(name);
        let fetched = self
            .client
            .get(&url)
            .send()
            .and_then(|res| res.error_for_status())
            .and_then(|res| res.bytes());
        match fetched {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(source) => Err(IngestError::Fetch { url, source }),
        }
    }

    fn image_ref(&self, name: &str) -> String {
        self.url(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Record(PhotoRecord),
    NoLocation { name: String },
    Failed { name: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub outcomes: Vec<IngestOutcome>,
}

impl IngestReport {
    pub fn records(&self) -> impl Iterator<Item = &PhotoRecord> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            IngestOutcome::Record(record) => Some(record),
            _ => None,
        })
    }

    pub fn into_records(self) -> Vec<PhotoRecord> {
        self.outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                IngestOutcome::Record(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.records().count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.len() - self.record_count()
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_positions(self.records().map(PhotoRecord::position))
    }
}

/// Decimal position from the GPS tags, when both coordinate triples are present.
/// A missing or unrecognised reference counts as North/East.
pub fn gps_position(tags: &TagMap) -> Option<LatLng> {
    let (lat_d, lat_m, lat_s) = tags.get("GPSLatitude")?.as_triple()?;
    let (lng_d, lng_m, lng_s) = tags.get("GPSLongitude")?.as_triple()?;
    let lat_ref = hemisphere(tags, "GPSLatitudeRef", Hemisphere::North);
    let lng_ref = hemisphere(tags, "GPSLongitudeRef", Hemisphere::East);

    Some(LatLng::new(
        dms_to_decimal(lat_d, lat_m, lat_s, lat_ref),
        dms_to_decimal(lng_d, lng_m, lng_s, lng_ref),
    ))
}

fn hemisphere(tags: &TagMap, key: &str, default: Hemisphere) -> Hemisphere {
    tags.get(key)
        .and_then(|value| value.as_text())
        .and_then(|text| text.parse().ok())
        .unwrap_or(default)
}

fn is_descriptive(tag: &str) -> bool {
    !tag.starts_with("GPS") && tag != "MakerNote"
}

/// Turns resources into photo records, one at a time.
pub struct Ingestor<R> {
    reader: R,
    cache: Option<Cache>,
}

impl<R: TagReader> Ingestor<R> {
    pub fn new(reader: R) -> Ingestor<R> {
        Ingestor {
            reader,
            cache: None,
        }
    }

    /// Keep extracted tags in `cache` so later runs skip parsing.
    pub fn with_cache(mut self, cache: Cache) -> Ingestor<R> {
        self.cache = Some(cache);
        self
    }

    pub fn ingest_all<S: ResourceSource + ?Sized>(&self, source: &S, names: &[String]) -> IngestReport {
        let outcomes: Vec<IngestOutcome> = names
            .iter()
            .map(|name| self.ingest_one(source, name))
            .collect();
        let report = IngestReport { outcomes };

        if report.record_count() == 0 {
            warn!("no geotagged photos found among {} resources", names.len());
        } else {
            info!(
                "ingested {} photos, skipped {}",
                report.record_count(),
                report.skipped_count()
            );
        }
        report
    }

    pub fn ingest_one<S: ResourceSource + ?Sized>(&self, source: &S, name: &str) -> IngestOutcome {
        match self.try_ingest(source, name) {
            Ok(Some(record)) => {
                debug!("{} at {:.6}, {:.6}", name, record.lat, record.lng);
                IngestOutcome::Record(record)
            }
            Ok(None) => {
                info!("No GPS data found for {}", name);
                IngestOutcome::NoLocation {
                    name: name.to_string(),
                }
            }
            Err(e) => {
                warn!("Error loading {}: {}", name, e);
                IngestOutcome::Failed {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }

    fn try_ingest<S: ResourceSource + ?Sized>(
        &self,
        source: &S,
        name: &str,
    ) -> Result<Option<PhotoRecord>, IngestError> {
        let bytes = source.fetch(name)?;
        let tags = self.tags_for(name, &bytes)?;

        let position = match gps_position(&tags) {
            Some(position) => position,
            None => return Ok(None),
        };
        let metadata = tags
            .iter()
            .filter(|(tag, _)| is_descriptive(tag))
            .map(|(tag, value)| (tag.clone(), value.to_string()))
            .collect();

        Ok(Some(PhotoRecord {
            name: display_name(name),
            image_ref: source.image_ref(name),
            lat: position.lat,
            lng: position.lng,
            metadata,
        }))
    }

    fn tags_for(&self, name: &str, bytes: &[u8]) -> Result<TagMap, IngestError> {
        let key = format!("{}-{}", name, bytes.len());
        if let Some(cache) = &self.cache {
            match cache.read_into::<TagMap>(&key) {
                Ok(Some(tags)) => return Ok(tags),
                Ok(None) => debug!("Exif cache miss for {}", name),
                Err(e) => warn!("ignoring exif cache entry: {}", e),
            }
        }

        let tags = self.reader.read_tags(bytes)?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.write_from(&key, &tags) {
                warn!("cannot cache exif for {}: {}", name, e);
            }
        }
        Ok(tags)
    }
}

fn display_name(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_string()
}
