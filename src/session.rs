use std::time::Duration;

use tracing::{info, warn};

use crate::cluster::{self, ClusterPoint};
use crate::coords::{BoundingBox, LatLng};
use crate::geocode::{parse_coordinates, GeocodeError, Geocoder};
use crate::ingest::IngestReport;
use crate::photo_metadata::PhotoDetails;
use crate::registry::MarkerRegistry;
use crate::surface::{MapSurface, SurfaceMarker};

pub const SEARCH_ZOOM: f64 = 12.0;
pub const SEARCH_FLIGHT_MS: u64 = 2000;
pub const SEARCH_PIN_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    pub markers: usize,
    pub skipped: usize,
    pub bounds: Option<BoundingBox>,
}

impl LoadSummary {
    /// Shown to the user when nothing could be placed.
    pub fn notice(&self) -> Option<&'static str> {
        (self.markers == 0).then_some("No geotagged photos found")
    }
}

/// One mounted map view: its surface, markers and photos.
#[derive(Debug)]
pub struct Session<S> {
    surface: S,
    registry: MarkerRegistry,
    fit_padding: u32,
}

impl<S: MapSurface> Session<S> {
    pub fn mount(surface: S, fit_padding: u32) -> Session<S> {
        Session {
            surface,
            registry: MarkerRegistry::new(),
            fit_padding,
        }
    }

    /// Places a marker per ingested photo, frames them, and runs the first clustering pass.
    /// Replaces whatever was loaded before.
    pub fn load(&mut self, report: IngestReport) -> LoadSummary {
        self.registry.remove_all(&mut self.surface);

        let skipped = report.skipped_count();
        let bounds = report.bounds();
        for record in report.into_records() {
            self.registry.add_marker(record, &mut self.surface);
        }

        match bounds {
            Some(bounds) => self.surface.fit_bounds_to(bounds, self.fit_padding),
            None => warn!("no geotagged photos found, leaving the view unchanged"),
        }
        self.recluster();

        LoadSummary {
            markers: self.registry.len(),
            skipped,
            bounds,
        }
    }

    /// Records the new zoom on the surface and reclusters.
    pub fn on_zoom_change(&mut self, zoom: f64) -> Vec<ClusterPoint> {
        self.surface.set_zoom(zoom);
        self.recluster()
    }

    fn recluster(&mut self) -> Vec<ClusterPoint> {
        cluster::recompute(&mut self.registry, &mut self.surface)
    }

    /// Details for a marker the surface reported clicked.
    pub fn show_photo(&self, marker: SurfaceMarker) -> Option<PhotoDetails> {
        self.registry.click_surface(marker)
    }

    /// Flies to the searched place and pins it for a few seconds.
    pub fn search<G: Geocoder + ?Sized>(&mut self, query: &str, geocoder: &G) -> Result<LatLng, GeocodeError> {
        let pos = resolve_search(query, geocoder)?;
        self.show_search_result(pos);
        Ok(pos)
    }

    pub fn show_search_result(&mut self, pos: LatLng) {
        self.surface.fly_to(pos, SEARCH_ZOOM, SEARCH_FLIGHT_MS);
        self.surface.add_search_pin(pos, SEARCH_PIN_TTL);
    }

    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Takes everything this session put on the surface back off and hands the surface back.
    pub fn unmount(mut self) -> S {
        self.registry.remove_all(&mut self.surface);
        self.surface.remove_heat_layer();
        self.surface.clear_search_pin();
        self.surface
    }
}

/// Resolves search text to a position: coordinate text locally, anything else through
/// `geocoder`. Touches no session state.
pub fn resolve_search<G: Geocoder + ?Sized>(query: &str, geocoder: &G) -> Result<LatLng, GeocodeError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(GeocodeError::EmptyQuery);
    }
    let pos = match parse_coordinates(query) {
        Some(pos) => pos,
        None => geocoder.geocode(query)?,
    };
    info!("search {:?} -> {:.6}, {:.6}", query, pos.lat, pos.lng);
    Ok(pos)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::ingest::IngestOutcome;
    use crate::photo_metadata::PhotoRecord;
    use crate::surface::{SceneSurface, ViewRequest};

    struct FixedGeocoder {
        answer: Option<LatLng>,
        calls: Cell<usize>,
    }

    impl FixedGeocoder {
        fn new(answer: Option<LatLng>) -> FixedGeocoder {
            FixedGeocoder {
                answer,
                calls: Cell::new(0),
            }
        }
    }

    impl Geocoder for FixedGeocoder {
        fn geocode(&self, query: &str) -> Result<LatLng, GeocodeError> {
            self.calls.set(self.calls.get() + 1);
            self.answer.ok_or_else(|| GeocodeError::NotFound {
                query: query.to_string(),
            })
        }
    }

    fn report(positions: &[(f64, f64)]) -> IngestReport {
        let mut outcomes: Vec<IngestOutcome> = positions
            .iter()
            .enumerate()
            .map(|(i, &(lat, lng))| {
                IngestOutcome::Record(PhotoRecord {
                    name: format!("IMG_{i}.jpeg"),
                    image_ref: format!("/mapimages/IMG_{i}.jpeg"),
                    lat,
                    lng,
                    metadata: Default::default(),
                })
            })
            .collect();
        outcomes.push(IngestOutcome::NoLocation {
            name: "plain.jpg".to_string(),
        });
        IngestReport { outcomes }
    }

    #[test]
    fn load_places_markers_and_fits_view() {
        let mut session = Session::mount(SceneSurface::default(), 50);

        let summary = session.load(report(&[(36.1, -115.2), (36.3, -115.0)]));

        assert_eq!(summary.markers, 2);
        assert_eq!(summary.skipped, 1);
        assert!(summary.notice().is_none());
        assert_eq!(session.surface().scene().markers.len(), 2);
        assert!(matches!(
            session.surface().scene().view_request,
            Some(ViewRequest::FitBounds { padding: 50, .. })
        ));
    }

    #[test]
    fn empty_load_leaves_view_alone() {
        let mut session = Session::mount(SceneSurface::default(), 50);

        let summary = session.load(report(&[]));

        assert_eq!(summary.notice(), Some("No geotagged photos found"));
        assert!(session.surface().scene().view_request.is_none());
        assert!(session.surface().scene().heat_layer.is_none());
    }

    #[test]
    fn zoom_events_recluster() {
        let huddle: Vec<(f64, f64)> = (0..6).map(|i| (36.1699, -115.1398 + i as f64 * 0.0002)).collect();
        let mut session = Session::mount(SceneSurface::default(), 50);
        session.load(report(&huddle));
        assert!(session.surface().scene().heat_layer.is_none());

        let points = session.on_zoom_change(5.0);

        assert_eq!(session.surface().current_zoom(), 5.0);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].intensity, 6);
        assert!(session.registry().handles().iter().all(|h| !h.visible));

        assert!(session.on_zoom_change(9.0).is_empty());
        assert!(session.registry().handles().iter().all(|h| h.visible));
    }

    #[test]
    fn show_photo_uses_surface_marker() {
        let mut session = Session::mount(SceneSurface::default(), 50);
        session.load(report(&[(36.1, -115.2)]));
        let marker = session.surface().scene().markers[0].id;

        assert_eq!(session.show_photo(marker).unwrap().name, "IMG_0.jpeg");
    }

    #[test]
    fn remounted_surface_still_resolves_clicks() {
        let mut first = Session::mount(SceneSurface::default(), 50);
        first.load(report(&[(36.1, -115.2), (36.3, -115.0)]));
        let surface = first.unmount();

        let mut second = Session::mount(surface, 50);
        second.load(report(&[(40.7, -74.0)]));
        let scene = second.surface().scene();

        assert_eq!(scene.markers.len(), 1);
        let details = second.show_photo(scene.markers[0].id).unwrap();
        assert_eq!(details.name, "IMG_0.jpeg");
        assert_eq!(details.location, "40.700000, -74.000000");
    }

    #[test]
    fn resolving_a_search_leaves_the_view_alone() {
        let mut session = Session::mount(SceneSurface::default(), 50);
        let geocoder = FixedGeocoder::new(Some(LatLng::new(36.1352, -115.4271)));

        let pos = resolve_search("  Red Rock Canyon ", &geocoder).unwrap();

        assert_eq!(geocoder.calls.get(), 1);
        assert!(session.surface().scene().view_request.is_none());
        assert!(matches!(resolve_search("  ", &geocoder), Err(GeocodeError::EmptyQuery)));

        session.show_search_result(pos);
        assert_eq!(session.surface().scene().search_pin.as_ref().unwrap().position, pos);
    }

    #[test]
    fn search_flies_and_pins() {
        let mut session = Session::mount(SceneSurface::default(), 50);
        let geocoder = FixedGeocoder::new(Some(LatLng::new(36.1352, -115.4271)));

        let pos = session.search("Red Rock Canyon", &geocoder).unwrap();

        let scene = session.surface().scene();
        assert_eq!(pos, LatLng::new(36.1352, -115.4271));
        assert_eq!(scene.camera.zoom, SEARCH_ZOOM);
        assert_eq!(scene.search_pin.as_ref().unwrap().position, pos);
        assert!(matches!(
            scene.view_request,
            Some(ViewRequest::FlyTo { duration_ms: 2000, .. })
        ));
    }

    #[test]
    fn search_miss_changes_nothing() {
        let mut session = Session::mount(SceneSurface::default(), 50);
        let geocoder = FixedGeocoder::new(None);

        let err = session.search("xyzzy", &geocoder).unwrap_err();

        assert!(matches!(err, GeocodeError::NotFound { .. }));
        assert!(session.surface().scene().search_pin.is_none());
        assert!(session.surface().scene().view_request.is_none());
    }

    #[test]
    fn coordinate_search_skips_geocoder() {
        let mut session = Session::mount(SceneSurface::default(), 50);
        let geocoder = FixedGeocoder::new(None);

        let pos = session.search("40.7128, -74.0060", &geocoder).unwrap();

        assert_eq!(pos, LatLng::new(40.7128, -74.006));
        assert_eq!(geocoder.calls.get(), 0);
    }

    #[test]
    fn unmount_cleans_the_surface() {
        let huddle: Vec<(f64, f64)> = (0..5).map(|i| (36.1699, -115.1398 + i as f64 * 0.0002)).collect();
        let mut session = Session::mount(SceneSurface::default(), 50);
        session.load(report(&huddle));
        session.on_zoom_change(4.0);
        session
            .search("36.0, -115.0", &FixedGeocoder::new(None))
            .unwrap();

        let surface = session.unmount();

        assert!(surface.scene().markers.is_empty());
        assert!(surface.scene().heat_layer.is_none());
        assert!(surface.scene().search_pin.is_none());
    }
}
