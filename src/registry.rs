use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use crate::coords::LatLng;
use crate::photo_metadata::{PhotoDetails, PhotoRecord};
use crate::surface::{MapSurface, SurfaceMarker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerId(pub u64);

#[derive(Debug, Clone)]
pub struct MarkerHandle {
    pub id: MarkerId,
    pub position: LatLng,
    pub visible: bool,
    linked_photo: Weak<PhotoRecord>,
    surface_ref: SurfaceMarker,
}

impl MarkerHandle {
    pub fn photo(&self) -> Option<Arc<PhotoRecord>> {
        self.linked_photo.upgrade()
    }

    pub fn surface_ref(&self) -> SurfaceMarker {
        self.surface_ref
    }
}

/// Owns the photo records and keeps exactly one marker per record.
#[derive(Debug, Default)]
pub struct MarkerRegistry {
    photos: Vec<Arc<PhotoRecord>>,
    handles: Vec<MarkerHandle>,
    next_id: u64,
}

impl MarkerRegistry {
    pub fn new() -> MarkerRegistry {
        MarkerRegistry::default()
    }

    pub fn add_marker<S: MapSurface + ?Sized>(&mut self, photo: PhotoRecord, surface: &mut S) -> MarkerId {
        let photo = Arc::new(photo);
        let position = photo.position();
        let surface_ref = surface.add_marker_at(position, &photo.image_ref);
        let id = MarkerId(self.next_id);
        self.next_id += 1;

        self.handles.push(MarkerHandle {
            id,
            position,
            visible: true,
            linked_photo: Arc::downgrade(&photo),
            surface_ref,
        });
        self.photos.push(photo);
        id
    }

    pub fn remove_all<S: MapSurface + ?Sized>(&mut self, surface: &mut S) {
        for handle in self.handles.drain(..) {
            surface.remove_marker(handle.surface_ref);
        }
        self.photos.clear();
    }

    /// Handles in insertion order.
    pub fn handles(&self) -> &[MarkerHandle] {
        &self.handles
    }

    pub fn photos(&self) -> &[Arc<PhotoRecord>] {
        &self.photos
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn handle(&self, id: MarkerId) -> Option<&MarkerHandle> {
        self.handles.iter().find(|h| h.id == id)
    }

    /// What clicking the marker shows.
    pub fn click(&self, id: MarkerId) -> Option<PhotoDetails> {
        self.handle(id)?.photo().map(|photo| photo.details())
    }

    /// Same as [`MarkerRegistry::click`], for a click the surface reports by its own reference.
    pub fn click_surface(&self, surface_ref: SurfaceMarker) -> Option<PhotoDetails> {
        self.handles
            .iter()
            .find(|h| h.surface_ref == surface_ref)?
            .photo()
            .map(|photo| photo.details())
    }

    pub(crate) fn set_visible<S: MapSurface + ?Sized>(&mut self, index: usize, visible: bool, surface: &mut S) {
        if let Some(handle) = self.handles.get_mut(index) {
            if handle.visible != visible {
                handle.visible = visible;
                surface.set_marker_visible(handle.surface_ref, visible);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SceneSurface;

    fn photo(name: &str, lat: f64, lng: f64) -> PhotoRecord {
        PhotoRecord {
            name: name.to_string(),
            image_ref: format!("/mapimages/{}", name),
            lat,
            lng,
            metadata: [("Make".to_string(), "Apple".to_string())].into(),
        }
    }

    #[test]
    fn one_marker_per_photo_in_insertion_order() {
        let mut surface = SceneSurface::default();
        let mut registry = MarkerRegistry::new();

        let a = registry.add_marker(photo("IMG_1198.jpeg", 36.1, -115.1), &mut surface);
        let b = registry.add_marker(photo("IMG_1175.jpeg", 36.2, -115.2), &mut surface);

        assert_ne!(a, b);
        let ids: Vec<MarkerId> = registry.handles().iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(registry.photos().len(), 2);
        assert_eq!(surface.scene().markers.len(), 2);
        assert_eq!(registry.handle(b).unwrap().position, LatLng::new(36.2, -115.2));
    }

    #[test]
    fn click_resolves_to_photo_details() {
        let mut surface = SceneSurface::default();
        let mut registry = MarkerRegistry::new();
        let id = registry.add_marker(photo("IMG_1198.jpeg", 36.1, -115.1), &mut surface);

        let details = registry.click(id).unwrap();

        assert_eq!(details.name, "IMG_1198.jpeg");
        assert_eq!(details.location, "36.100000, -115.100000");
        assert!(registry.click(MarkerId(99)).is_none());
    }

    #[test]
    fn surface_clicks_follow_the_surface_reference() {
        let mut surface = SceneSurface::default();
        let mut first = MarkerRegistry::new();
        first.add_marker(photo("IMG_1198.jpeg", 36.1, -115.1), &mut surface);
        first.add_marker(photo("IMG_1175.jpeg", 36.2, -115.2), &mut surface);
        first.remove_all(&mut surface);

        let mut second = MarkerRegistry::new();
        let id = second.add_marker(photo("IMG_0572-2.jpg", 36.3, -115.3), &mut surface);
        let on_surface = surface.scene().markers[0].id;

        assert_eq!(second.handle(id).unwrap().surface_ref(), on_surface);
        assert_ne!(on_surface.0, id.0);
        assert_eq!(second.click_surface(on_surface).unwrap().name, "IMG_0572-2.jpg");
        assert_eq!(surface.scene().markers[0].image_ref, "/mapimages/IMG_0572-2.jpg");
    }

    #[test]
    fn remove_all_clears_surface_and_drops_photos() {
        let mut surface = SceneSurface::default();
        let mut registry = MarkerRegistry::new();
        let id = registry.add_marker(photo("IMG_1198.jpeg", 36.1, -115.1), &mut surface);
        let weak = registry.handle(id).unwrap().clone();

        registry.remove_all(&mut surface);

        assert!(registry.is_empty());
        assert!(surface.scene().markers.is_empty());
        assert!(weak.photo().is_none());
    }
}
