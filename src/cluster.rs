//! Heat clustering of photo markers.
//!
//! Below [`AGGREGATION_ZOOM`] markers are grouped greedily: the first marker left in the
//! pool seeds a cluster and claims every remaining marker within [`CLUSTER_RADIUS_KM`] of
//! the seed itself. Membership is not transitive, so a marker close to a member but far
//! from the seed starts or joins another cluster, and the result depends on marker order.
//! Clusters of at least [`MIN_CLUSTER_SIZE`] markers are drawn as one heat point and their
//! markers are hidden. Every run starts from scratch.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::coords::LatLng;
use crate::registry::MarkerRegistry;
use crate::surface::MapSurface;

pub const CLUSTER_RADIUS_KM: f64 = 1.0;
pub const MIN_CLUSTER_SIZE: usize = 5;
/// Aggregation only happens strictly below this zoom.
pub const AGGREGATION_ZOOM: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClusterPoint {
    pub centroid: LatLng,
    pub intensity: usize,
}

/// Outcome of one clustering run over a list of positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub points: Vec<ClusterPoint>,
    /// Marker visibility, indexed like the input positions.
    pub visible: Vec<bool>,
}

/// Clusters `positions` for display at `zoom`.
///
/// Positions must be finite.
pub fn cluster_positions(positions: &[LatLng], zoom: f64) -> Clustering {
    let mut visible = vec![true; positions.len()];
    if zoom >= AGGREGATION_ZOOM {
        return Clustering {
            points: Vec::new(),
            visible,
        };
    }

    let mut points = Vec::new();
    for members in greedy_groups(positions, CLUSTER_RADIUS_KM) {
        if members.len() < MIN_CLUSTER_SIZE {
            continue;
        }
        let count = members.len() as f64;
        let (lat_sum, lng_sum) = members.iter().fold((0.0, 0.0), |(lat, lng), &i| {
            (lat + positions[i].lat, lng + positions[i].lng)
        });
        points.push(ClusterPoint {
            centroid: LatLng::new(lat_sum / count, lng_sum / count),
            intensity: members.len(),
        });
        for &i in &members {
            visible[i] = false;
        }
    }

    Clustering { points, visible }
}

/// Groups of indices into `positions`, each led by its seed. A candidate exactly
/// `radius_km` from the seed is claimed.
fn greedy_groups(positions: &[LatLng], radius_km: f64) -> Vec<Vec<usize>> {
    let mut pool: Vec<usize> = (0..positions.len()).collect();
    let mut groups = Vec::new();

    while !pool.is_empty() {
        let seed = pool.remove(0);
        let mut members = vec![seed];
        pool.retain(|&candidate| {
            let near = positions[seed].distance_km(&positions[candidate]) <= radius_km;
            if near {
                members.push(candidate);
            }
            !near
        });
        groups.push(members);
    }

    groups
}

/// Reclusters every marker in `registry` at the surface's current zoom and redraws the
/// heat layer. Returns the emitted points.
pub fn recompute<S: MapSurface + ?Sized>(
    registry: &mut MarkerRegistry,
    surface: &mut S,
) -> Vec<ClusterPoint> {
    let zoom = surface.current_zoom();
    let positions: Vec<LatLng> = registry.handles().iter().map(|h| h.position).collect();
    let clustering = cluster_positions(&positions, zoom);

    for (index, &visible) in clustering.visible.iter().enumerate() {
        registry.set_visible(index, visible, surface);
    }

    if clustering.points.is_empty() {
        surface.remove_heat_layer();
    } else {
        surface.add_or_replace_heat_layer(&clustering.points, &HeatPaint::default());
    }

    debug!(
        "zoom {:.2}: {} markers, {} heat points",
        zoom,
        positions.len(),
        clustering.points.len()
    );
    clustering.points
}

/// Mapbox-style paint for the heat layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatPaint {
    #[serde(rename = "heatmap-weight")]
    pub weight: Value,
    #[serde(rename = "heatmap-color")]
    pub color: Value,
    #[serde(rename = "heatmap-radius")]
    pub radius: f64,
    #[serde(rename = "heatmap-opacity")]
    pub opacity: f64,
}

impl Default for HeatPaint {
    fn default() -> Self {
        HeatPaint {
            weight: json!(["interpolate", ["linear"], ["get", "intensity"], 0, 0, 20, 1]),
            color: json!([
                "interpolate",
                ["linear"],
                ["heatmap-density"],
                0.0, "rgba(0, 0, 255, 0)",
                0.2, "rgb(0, 0, 255)",
                0.4, "rgb(0, 255, 0)",
                0.6, "rgb(255, 255, 0)",
                1.0, "rgb(255, 0, 0)"
            ]),
            radius: 30.0,
            opacity: 0.8,
        }
    }
}
