use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::coords::LatLng;

/// One EXIF field as handed over by a [`crate::exif_reader::TagReader`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum TagValue {
    Rationals(Vec<f64>),
    Text(String),
}

impl TagValue {
    /// Degrees, minutes, seconds of a GPS coordinate field.
    pub fn as_triple(&self) -> Option<(f64, f64, f64)> {
        match self {
            TagValue::Rationals(values) if values.len() >= 3 => {
                Some((values[0], values[1], values[2]))
            }
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TagValue::Text(text) => Some(text),
            TagValue::Rationals(_) => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Text(text) => f.write_str(text),
            TagValue::Rationals(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                f.write_str(&parts.join(", "))
            }
        }
    }
}

/// Tag name (as kamadak-exif prints it, e.g. `GPSLatitude`) to value.
pub type TagMap = BTreeMap<String, TagValue>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    pub name: String,
    /// URL path the image is served under.
    pub image_ref: String,
    pub lat: f64,
    pub lng: f64,
    pub metadata: BTreeMap<String, String>,
}

impl PhotoRecord {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    fn tag(&self, name: &str) -> Option<&str> {
        self.metadata.get(name).map(String::as_str)
    }

    pub fn details(&self) -> PhotoDetails {
        let camera = match (self.tag("Make"), self.tag("Model")) {
            (Some(make), Some(model)) => Some(format!("{} {}", make, model)),
            _ => None,
        };
        let iso = self
            .tag("PhotographicSensitivity")
            .or_else(|| self.tag("ISOSpeedRatings"))
            .map(str::to_string);

        PhotoDetails {
            name: self.name.clone(),
            image_ref: self.image_ref.clone(),
            location: format!("{:.6}, {:.6}", self.lat, self.lng),
            date: self.tag("DateTime").map(str::to_string),
            camera,
            exposure: self.tag("ExposureTime").map(str::to_string),
            aperture: self.tag("FNumber").map(|f| format!("f/{}", f)),
            iso,
        }
    }
}

/// What the popup shows for a clicked marker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PhotoDetails {
    pub name: String,
    pub image_ref: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aperture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso: Option<String>,
}
