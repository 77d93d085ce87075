use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::geocode::Provider;

pub const DEFAULT_CONFIG_FILE: &str = "photomap.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GeocoderConfig {
    pub provider: Provider,
    pub mapbox_token: Option<String>,
    pub user_agent: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        GeocoderConfig {
            provider: Provider::Nominatim,
            mapbox_token: None,
            user_agent: concat!("photomap/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub image_dir: PathBuf,
    pub static_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Probed when the image directory cannot be listed.
    pub candidate_files: Vec<String>,
    pub fit_padding: u32,
    pub connect_url: String,
    pub geocoder: GeocoderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1:8000".to_string(),
            image_dir: PathBuf::from("mapimages"),
            static_dir: PathBuf::from("static"),
            cache_dir: PathBuf::from(".photomap-cache"),
            candidate_files: vec![
                "IMG_1198.jpeg".to_string(),
                "IMG_1175.jpeg".to_string(),
                "BNS_20250524_203313_290.jpeg".to_string(),
                "IMG_0572-2.jpg".to_string(),
            ],
            fit_padding: 50,
            connect_url: "https://photos.google.com/".to_string(),
            geocoder: GeocoderConfig::default(),
        }
    }
}

impl Config {
    /// Reads `path` if given, else `photomap.toml` when present, else the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => PathBuf::from(DEFAULT_CONFIG_FILE),
            None => return Ok(Config::default()),
        };

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// URL prefix images are served under, e.g. `/mapimages`.
    pub fn image_url_prefix(&self) -> String {
        let name = self
            .image_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "images".to_string());
        format!("/{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("photomap.toml");
        fs::write(
            &path,
            r#"
bind = "0.0.0.0:9000"
image_dir = "/srv/photos/rally"

[geocoder]
provider = "mapbox"
mapbox_token = "pk.test"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.image_url_prefix(), "/rally");
        assert_eq!(config.fit_padding, 50);
        assert_eq!(config.candidate_files.len(), 4);
        assert_eq!(config.geocoder.provider, Provider::Mapbox);
        assert_eq!(config.geocoder.mapbox_token.as_deref(), Some("pk.test"));
        assert!(config.geocoder.user_agent.starts_with("photomap/"));
    }

    #[test]
    fn example_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("photomap.example.toml");

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn defaults_serve_mapimages() {
        assert_eq!(Config::default().image_url_prefix(), "/mapimages");
    }

    #[test]
    fn bad_toml_is_reported() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("photomap.toml");
        fs::write(&path, "fit_padding = \"wide\"").unwrap();

        assert!(matches!(Config::load(Some(&path)), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            Config::load(Some(&temp_dir.path().join("missing.toml"))),
            Err(ConfigError::Read { .. })
        ));
    }
}
