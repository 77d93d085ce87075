use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Value};

use crate::cluster::{ClusterPoint, HeatPaint};
use crate::coords::{BoundingBox, LatLng};

/// Opaque reference to a marker placed on a [`MapSurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SurfaceMarker(pub u64);

/// The map widget: camera, markers, one heat layer and a search pin.
///
/// Zoom changes are not pushed through this trait. Whoever drives the widget hands the
/// new zoom to [`crate::session::Session::on_zoom_change`], which records it here.
pub trait MapSurface {
    /// Places a marker drawn with the photo at `image_ref`.
    fn add_marker_at(&mut self, pos: LatLng, image_ref: &str) -> SurfaceMarker;
    fn remove_marker(&mut self, marker: SurfaceMarker);
    fn set_marker_visible(&mut self, marker: SurfaceMarker, visible: bool);
    fn add_or_replace_heat_layer(&mut self, points: &[ClusterPoint], paint: &HeatPaint);
    fn remove_heat_layer(&mut self);
    fn current_zoom(&self) -> f64;
    fn set_zoom(&mut self, zoom: f64);
    fn fit_bounds_to(&mut self, bounds: BoundingBox, padding: u32);
    fn fly_to(&mut self, pos: LatLng, zoom: f64, duration_ms: u64);
    fn add_search_pin(&mut self, pos: LatLng, ttl: Duration);
    fn clear_search_pin(&mut self);
}

pub const DEFAULT_STYLE: &str = "mapbox://styles/mapbox/satellite-v9";
pub const DEFAULT_CENTER: LatLng = LatLng {
    lat: 36.1699,
    lng: -115.1398,
};
pub const DEFAULT_ZOOM: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Camera {
    pub center: LatLng,
    pub zoom: f64,
}

/// Last camera move the page has to animate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewRequest {
    FitBounds { bounds: BoundingBox, padding: u32 },
    FlyTo { center: LatLng, zoom: f64, duration_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneMarker {
    pub id: SurfaceMarker,
    pub position: LatLng,
    pub image_ref: String,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatLayer {
    #[serde(skip)]
    pub points: Vec<ClusterPoint>,
    /// GeoJSON FeatureCollection with an `intensity` property per point.
    pub data: Value,
    pub paint: HeatPaint,
}

impl HeatLayer {
    fn new(points: &[ClusterPoint], paint: &HeatPaint) -> HeatLayer {
        let features: Vec<Value> = points
            .iter()
            .map(|point| {
                json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "Point",
                        "coordinates": [point.centroid.lng, point.centroid.lat],
                    },
                    "properties": { "intensity": point.intensity },
                })
            })
            .collect();
        HeatLayer {
            points: points.to_vec(),
            data: json!({ "type": "FeatureCollection", "features": features }),
            paint: paint.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchPin {
    pub position: LatLng,
    pub color: &'static str,
    pub ttl_ms: u64,
    #[serde(skip)]
    placed_at: Instant,
}

/// Everything the page needs to draw the map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub style: String,
    pub camera: Camera,
    pub view_request: Option<ViewRequest>,
    pub markers: Vec<SceneMarker>,
    pub heat_layer: Option<HeatLayer>,
    pub search_pin: Option<SearchPin>,
}

/// In-memory [`MapSurface`]. The HTTP service serves its [`Scene`] to the page.
#[derive(Debug, Clone)]
pub struct SceneSurface {
    scene: Scene,
    next_marker: u64,
}

impl Default for SceneSurface {
    fn default() -> Self {
        SceneSurface::new(DEFAULT_STYLE, DEFAULT_CENTER, DEFAULT_ZOOM)
    }
}

impl SceneSurface {
    pub fn new(style: &str, center: LatLng, zoom: f64) -> SceneSurface {
        SceneSurface {
            scene: Scene {
                style: style.to_string(),
                camera: Camera { center, zoom },
                view_request: None,
                markers: Vec::new(),
                heat_layer: None,
                search_pin: None,
            },
            next_marker: 0,
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Drops the search pin once its time is up.
    pub fn expire_search_pin(&mut self, now: Instant) {
        let expired = self
            .scene
            .search_pin
            .as_ref()
            .is_some_and(|pin| now.duration_since(pin.placed_at) >= Duration::from_millis(pin.ttl_ms));
        if expired {
            self.scene.search_pin = None;
        }
    }

    pub fn marker(&self, marker: SurfaceMarker) -> Option<&SceneMarker> {
        self.scene.markers.iter().find(|m| m.id == marker)
    }
}

impl MapSurface for SceneSurface {
    fn add_marker_at(&mut self, pos: LatLng, image_ref: &str) -> SurfaceMarker {
        let id = SurfaceMarker(self.next_marker);
        self.next_marker += 1;
        self.scene.markers.push(SceneMarker {
            id,
            position: pos,
            image_ref: image_ref.to_string(),
            visible: true,
        });
        id
    }

    fn remove_marker(&mut self, marker: SurfaceMarker) {
        self.scene.markers.retain(|m| m.id != marker);
    }

    fn set_marker_visible(&mut self, marker: SurfaceMarker, visible: bool) {
        if let Some(m) = self.scene.markers.iter_mut().find(|m| m.id == marker) {
            m.visible = visible;
        }
    }

    fn add_or_replace_heat_layer(&mut self, points: &[ClusterPoint], paint: &HeatPaint) {
        self.scene.heat_layer = Some(HeatLayer::new(points, paint));
    }

    fn remove_heat_layer(&mut self) {
        self.scene.heat_layer = None;
    }

    fn current_zoom(&self) -> f64 {
        self.scene.camera.zoom
    }

    fn set_zoom(&mut self, zoom: f64) {
        self.scene.camera.zoom = zoom;
    }

    fn fit_bounds_to(&mut self, bounds: BoundingBox, padding: u32) {
        self.scene.camera.center = bounds.center();
        self.scene.view_request = Some(ViewRequest::FitBounds { bounds, padding });
    }

    fn fly_to(&mut self, pos: LatLng, zoom: f64, duration_ms: u64) {
        self.scene.camera = Camera { center: pos, zoom };
        self.scene.view_request = Some(ViewRequest::FlyTo {
            center: pos,
            zoom,
            duration_ms,
        });
    }

    fn add_search_pin(&mut self, pos: LatLng, ttl: Duration) {
        self.scene.search_pin = Some(SearchPin {
            position: pos,
            color: "yellow",
            ttl_ms: ttl.as_millis() as u64,
            placed_at: Instant::now(),
        });
    }

    fn clear_search_pin(&mut self) {
        self.scene.search_pin = None;
    }
}
