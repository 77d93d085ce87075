use std::fmt;
use std::str::FromStr;

use geo::{coord, Distance, HaversineMeasure, Point, Rect};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used for every distance in this crate.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const EARTH_KM: HaversineMeasure = HaversineMeasure::new(EARTH_RADIUS_KM);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    fn sign(self) -> f64 {
        match self {
            Hemisphere::North | Hemisphere::East => 1.0,
            Hemisphere::South | Hemisphere::West => -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownHemisphere(pub String);

impl fmt::Display for UnknownHemisphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown hemisphere reference {:?}", self.0)
    }
}

impl std::error::Error for UnknownHemisphere {}

impl FromStr for Hemisphere {
    type Err = UnknownHemisphere;

    // EXIF stores the reference as a one letter ASCII string, sometimes NUL padded
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        match trimmed.to_ascii_uppercase().as_str() {
            "N" => Ok(Hemisphere::North),
            "S" => Ok(Hemisphere::South),
            "E" => Ok(Hemisphere::East),
            "W" => Ok(Hemisphere::West),
            _ => Err(UnknownHemisphere(s.to_string())),
        }
    }
}

pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64, hemisphere: Hemisphere) -> f64 {
    hemisphere.sign() * (degrees + minutes / 60.0 + seconds / 3600.0)
}

/// Great-circle distance in kilometres.
pub fn haversine_distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    EARTH_KM.distance(Point::new(lng1, lat1), Point::new(lng2, lat2))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> LatLng {
        LatLng { lat, lng }
    }

    pub fn distance_km(&self, other: &LatLng) -> f64 {
        haversine_distance_km(self.lat, self.lng, other.lat, other.lng)
    }
}

impl From<LatLng> for Point<f64> {
    fn from(pos: LatLng) -> Self {
        Point::new(pos.lng, pos.lat)
    }
}

/// Axis-aligned box over a set of positions, grown one point at a time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn around(pos: LatLng) -> BoundingBox {
        BoundingBox {
            south: pos.lat,
            west: pos.lng,
            north: pos.lat,
            east: pos.lng,
        }
    }

    pub fn extend(&mut self, pos: LatLng) {
        self.south = self.south.min(pos.lat);
        self.north = self.north.max(pos.lat);
        self.west = self.west.min(pos.lng);
        self.east = self.east.max(pos.lng);
    }

    /// `None` for an empty iterator.
    pub fn from_positions<I>(positions: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = LatLng>,
    {
        let mut iter = positions.into_iter();
        let mut bounds = BoundingBox::around(iter.next()?);
        for pos in iter {
            bounds.extend(pos);
        }
        Some(bounds)
    }

    pub fn center(&self) -> LatLng {
        let center = self.to_rect().center();
        LatLng::new(center.y, center.x)
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.west, y: self.south },
            coord! { x: self.east, y: self.north },
        )
    }
}
