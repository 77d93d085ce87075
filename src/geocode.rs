use reqwest::{
    blocking::Client,
    header::{HeaderMap, HeaderValue, USER_AGENT},
    Url,
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::coords::LatLng;

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
const MAPBOX_URL: &str = "https://api.mapbox.com/geocoding/v5/mapbox.places/";

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Please enter a place to search for.")]
    EmptyQuery,
    #[error("Location not found. Please try a different search term.")]
    NotFound { query: String },
    #[error("Location search failed, check your connection and try again: {0}")]
    Network(#[from] reqwest::Error),
    #[error("geocoder is misconfigured: {0}")]
    Config(String),
}

/// Text query to the coordinate of the best match.
pub trait Geocoder {
    fn geocode(&self, query: &str) -> Result<LatLng, GeocodeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Nominatim,
    Mapbox,
}

/// Geocoder backed by a public HTTP API, with responses cached by query.
#[derive(Debug, Clone)]
pub struct HttpGeocoder {
    provider: Provider,
    access_token: Option<String>,
    user_agent: String,
    cache: Option<Cache>,
}

impl HttpGeocoder {
    pub fn new(provider: Provider, access_token: Option<String>, user_agent: &str) -> HttpGeocoder {
        HttpGeocoder {
            provider,
            access_token,
            user_agent: user_agent.to_string(),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Cache) -> HttpGeocoder {
        self.cache = Some(cache);
        self
    }

    fn cache_key(&self, query: &str) -> String {
        let provider = match self.provider {
            Provider::Nominatim => "nominatim",
            Provider::Mapbox => "mapbox",
        };
        format!("{}-{}", provider, query.to_lowercase())
    }

    fn cached_response(&self, query: &str) -> Option<Value> {
        let cache = self.cache.as_ref()?;
        match cache.read_into(&self.cache_key(query)) {
            Ok(json) => json,
            Err(e) => {
                warn!("ignoring geocode cache entry: {}", e);
                None
            }
        }
    }

    fn request_url(&self, query: &str) -> Result<Url, GeocodeError> {
        match self.provider {
            Provider::Nominatim => {
                let params = [("q", query), ("format", "geojson"), ("limit", "1")];
                Url::parse_with_params(NOMINATIM_URL, &params)
                    .map_err(|e| GeocodeError::Config(e.to_string()))
            }
            Provider::Mapbox => {
                let token = self.access_token.as_deref().ok_or_else(|| {
                    GeocodeError::Config("mapbox geocoding needs an access token".to_string())
                })?;
                let mut url =
                    Url::parse(MAPBOX_URL).map_err(|e| GeocodeError::Config(e.to_string()))?;
                url.path_segments_mut()
                    .map_err(|_| GeocodeError::Config("mapbox url cannot take a path".to_string()))?
                    .pop_if_empty()
                    .push(&format!("{}.json", query));
                url.query_pairs_mut().append_pair("access_token", token);
                Ok(url)
            }
        }
    }

    fn request_api(&self, query: &str) -> Result<Value, GeocodeError> {
        let url = self.request_url(query)?;
        let mut headers = HeaderMap::new();
        let agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|e| GeocodeError::Config(format!("invalid user agent: {}", e)))?;
        headers.insert(USER_AGENT, agent);

        let res = Client::new()
            .get(url)
            .headers(headers)
            .send()?
            .error_for_status()?;
        Ok(res.json::<Value>()?)
    }
}

impl Geocoder for HttpGeocoder {
    fn geocode(&self, query: &str) -> Result<LatLng, GeocodeError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(GeocodeError::EmptyQuery);
        }

        let res_json = match self.cached_response(query) {
            Some(res_json) => res_json,
            None => {
                debug!("geocode cache miss for {:?}", query);
                let res_json = self.request_api(query)?;
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.write_from(&self.cache_key(query), &res_json) {
                        warn!("cannot cache geocode response: {}", e);
                    }
                }
                res_json
            }
        };

        json_to_coords(self.provider, &res_json).ok_or_else(|| GeocodeError::NotFound {
            query: query.to_string(),
        })
    }
}

/// First feature's position, in whichever shape the provider answers with.
fn json_to_coords(provider: Provider, json_response: &Value) -> Option<LatLng> {
    let feature = &json_response["features"][0];
    let coords = match provider {
        Provider::Nominatim => &feature["geometry"]["coordinates"],
        Provider::Mapbox => &feature["center"],
    };
    let lng = coords[0].as_f64()?;
    let lat = coords[1].as_f64()?;
    Some(LatLng::new(lat, lng))
}

/// Queries like `36.1699, -115.1398` or `36°10'11.6"N, 115°8'23.3"W` need no geocoder.
pub fn parse_coordinates(query: &str) -> Option<LatLng> {
    let (lat_str, lng_str) = query.split_once(',')?;
    let (lat_str, lng_str) = (lat_str.trim(), lng_str.trim());

    let lat = lat_str
        .parse::<f64>()
        .ok()
        .or_else(|| latlon::parse_lat(lat_str).ok())?;
    let lng = lng_str
        .parse::<f64>()
        .ok()
        .or_else(|| latlon::parse_lng(lng_str).ok())?;

    if lat.is_finite() && lng.is_finite() && lat.abs() <= 90.0 && lng.abs() <= 180.0 {
        Some(LatLng::new(lat, lng))
    } else {
        None
    }
}
