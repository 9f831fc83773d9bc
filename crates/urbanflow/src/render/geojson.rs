//! A surface that keeps its markers as GeoJSON features.
//!
//! Used by the `map` command to hand the current view to any GeoJSON
//! viewer, and as the default surface of the `watch` loop.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde_json::{json, Value};
use tracing::debug;

use super::{CircleMarker, MapSurface, MarkerId, Popup};
use crate::error::{Error, Result};

/// In-memory `FeatureCollection` builder.
#[derive(Debug, Default)]
pub struct GeoJsonSurface {
    next_id: u64,
    features: BTreeMap<MarkerId, Value>,
    view: Option<(f64, f64, u8)>,
    popup: Option<Value>,
}

impl GeoJsonSurface {
    /// Create an empty surface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of markers on the surface.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the surface has no markers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Current centre and zoom, once a view has been set.
    #[must_use]
    pub fn view(&self) -> Option<(f64, f64, u8)> {
        self.view
    }

    /// The surface as a GeoJSON `FeatureCollection`.
    ///
    /// The view and any open popup are carried as foreign members.
    #[must_use]
    pub fn to_feature_collection(&self) -> Value {
        let mut collection = json!({
            "type": "FeatureCollection",
            "features": self.features.values().cloned().collect::<Vec<_>>(),
        });
        if let Some((lat, lng, zoom)) = self.view {
            collection["view"] = json!({ "center": [lng, lat], "zoom": zoom });
        }
        if let Some(popup) = &self.popup {
            collection["popup"] = popup.clone();
        }
        collection
    }

    /// Write the collection to `path` as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.to_feature_collection())?;
        debug!(path = %path.display(), features = self.len(), "Wrote GeoJSON");
        Ok(())
    }
}

fn popup_json(popup: &Popup) -> Value {
    json!({
        "title": popup.title,
        "level": popup.level,
        "description": popup.description,
    })
}

impl MapSurface for GeoJsonSurface {
    fn set_view(&mut self, lat: f64, lng: f64, zoom: u8) -> Result<()> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(Error::map_unavailable("view centre must be finite"));
        }
        self.view = Some((lat, lng, zoom));
        Ok(())
    }

    fn add_circle(&mut self, marker: &CircleMarker) -> Result<MarkerId> {
        self.next_id += 1;
        let id = MarkerId(self.next_id);
        self.features.insert(
            id,
            json!({
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [marker.lng, marker.lat] },
                "properties": {
                    "id": marker.record_id,
                    "radius_m": marker.radius_m,
                    "color": marker.color.hex(),
                    "fill_opacity": 0.6,
                    "popup": popup_json(&marker.popup),
                },
            }),
        );
        Ok(id)
    }

    fn remove_marker(&mut self, id: MarkerId) -> Result<()> {
        self.features.remove(&id);
        Ok(())
    }

    fn open_popup(&mut self, lat: f64, lng: f64, content: &Popup) -> Result<()> {
        let mut popup = popup_json(content);
        popup["coordinates"] = json!([lng, lat]);
        self.popup = Some(popup);
        Ok(())
    }
}
