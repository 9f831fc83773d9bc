//! Map renderer adapter.
//!
//! Drawing is delegated to a [`MapSurface`], the seam where a real mapping
//! library plugs in. [`MapRenderer`] is the explicit map context: it owns
//! the surface and the markers it drew, is created when a view opens and
//! destroyed when it closes.

mod geojson;

use tracing::{debug, info};

use crate::config::MapConfig;
use crate::error::Result;
use crate::notify::FocusRequest;
use crate::record::{Level, TrafficRecord};

pub use geojson::GeoJsonSurface;

/// Marker radius for a severity of zero, in metres.
const BASE_RADIUS_M: f64 = 60.0;

/// Extra radius per severity point, in metres.
const RADIUS_PER_SEVERITY_M: f64 = 40.0;

/// Handle to a marker on a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub u64);

/// Marker colour by level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerColor {
    /// `high`.
    Red,
    /// `medium`.
    Amber,
    /// Everything else.
    Green,
}

impl MarkerColor {
    /// Colour for a record's level; missing and unknown levels are green.
    #[must_use]
    pub fn for_level(level: Option<&Level>) -> Self {
        match level {
            Some(Level::High) => Self::Red,
            Some(Level::Medium) => Self::Amber,
            _ => Self::Green,
        }
    }

    /// CSS hex value.
    #[must_use]
    pub fn hex(self) -> &'static str {
        match self {
            Self::Red => "#e02424",
            Self::Amber => "#ffb020",
            Self::Green => "#22c55e",
        }
    }
}

/// Content of the popup shown when a marker is clicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Popup {
    /// Record title.
    pub title: String,
    /// Level string, empty when missing.
    pub level: String,
    /// Description, empty when missing.
    pub description: String,
}

/// A filled circle for one traffic record.
#[derive(Debug, Clone, PartialEq)]
pub struct CircleMarker {
    /// Id of the record drawn.
    pub record_id: String,
    /// Latitude of the centre.
    pub lat: f64,
    /// Longitude of the centre.
    pub lng: f64,
    /// Radius in metres.
    pub radius_m: f64,
    /// Stroke and fill colour.
    pub color: MarkerColor,
    /// Popup opened on click.
    pub popup: Popup,
}

impl CircleMarker {
    /// Build the marker for a record.
    #[must_use]
    pub fn for_record(record: &TrafficRecord) -> Self {
        Self {
            record_id: record.id.clone(),
            lat: record.lat,
            lng: record.lng,
            radius_m: marker_radius(record.severity),
            color: MarkerColor::for_level(record.level.as_ref()),
            popup: Popup {
                title: record.title.clone(),
                level: record.level_str().unwrap_or_default().to_string(),
                description: record.description.clone().unwrap_or_default(),
            },
        }
    }
}

/// `60 + severity * 40` metres.
#[must_use]
pub fn marker_radius(severity: u32) -> f64 {
    BASE_RADIUS_M + f64::from(severity) * RADIUS_PER_SEVERITY_M
}

/// What a mapping library has to provide.
pub trait MapSurface: std::fmt::Debug {
    /// Centre the view.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MapUnavailable`] if the library failed.
    fn set_view(&mut self, lat: f64, lng: f64, zoom: u8) -> Result<()>;

    /// Draw a circle; clicking it must open `marker.popup`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MapUnavailable`] if the library failed.
    fn add_circle(&mut self, marker: &CircleMarker) -> Result<MarkerId>;

    /// Remove a marker previously returned by [`MapSurface::add_circle`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MapUnavailable`] if the library failed.
    fn remove_marker(&mut self, id: MarkerId) -> Result<()>;

    /// Open a transient popup at a point.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MapUnavailable`] if the library failed.
    fn open_popup(&mut self, lat: f64, lng: f64, content: &Popup) -> Result<()>;
}

/// Cosmetic numbers shown next to the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewSummary {
    /// Records at `high`.
    pub active_jams: usize,
    /// Records not at `low`.
    pub alerts: usize,
    /// `max(20, 60 - Σ severity * 5)`.
    pub avg_speed: i64,
}

/// Result of one render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderSummary {
    /// Markers drawn.
    pub drawn: usize,
    /// Records skipped for non-finite coordinates.
    pub skipped: usize,
    /// Summary over the whole view, skipped records included.
    pub view: ViewSummary,
}

/// Compute the display summary for a view.
#[must_use]
pub fn summarize(view: &[TrafficRecord]) -> ViewSummary {
    let severity_total: i64 = view.iter().map(|r| i64::from(r.severity)).sum();
    ViewSummary {
        active_jams: view.iter().filter(|r| r.is_high()).count(),
        alerts: view.iter().filter(|r| r.is_above_low()).count(),
        avg_speed: (60 - severity_total.saturating_mul(5)).max(20),
    }
}

/// The map context of one open view.
#[derive(Debug)]
pub struct MapRenderer<S: MapSurface> {
    surface: S,
    markers: Vec<MarkerId>,
    focus_zoom: u8,
}

impl<S: MapSurface> MapRenderer<S> {
    /// Take ownership of a surface and centre it on the configured view.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface rejects the initial view.
    pub fn create(mut surface: S, config: &MapConfig) -> Result<Self> {
        surface.set_view(config.center_lat, config.center_lng, config.zoom)?;
        debug!(
            lat = config.center_lat,
            lng = config.center_lng,
            zoom = config.zoom,
            "Map created"
        );
        Ok(Self {
            surface,
            markers: Vec::new(),
            focus_zoom: config.focus_zoom,
        })
    }

    /// Replace every owned marker with one per well-placed record.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface fails; markers drawn before the
    /// failure stay owned and are cleared by the next render.
    pub fn render(&mut self, view: &[TrafficRecord]) -> Result<RenderSummary> {
        self.clear()?;

        let mut skipped = 0;
        for record in view {
            if !record.is_well_placed() {
                debug!(id = %record.id, "Skipping record without usable coordinates");
                skipped += 1;
                continue;
            }
            let id = self.surface.add_circle(&CircleMarker::for_record(record))?;
            self.markers.push(id);
        }

        let summary = RenderSummary {
            drawn: self.markers.len(),
            skipped,
            view: summarize(view),
        };
        info!(
            drawn = summary.drawn,
            skipped = summary.skipped,
            active_jams = summary.view.active_jams,
            "Rendered traffic markers"
        );
        Ok(summary)
    }

    /// Centre on a focus request and show its title.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface fails.
    pub fn focus(&mut self, request: &FocusRequest) -> Result<()> {
        self.surface
            .set_view(request.lat, request.lng, self.focus_zoom)?;
        let title = if request.title.is_empty() {
            "Point".to_string()
        } else {
            request.title.clone()
        };
        self.surface.open_popup(
            request.lat,
            request.lng,
            &Popup {
                title,
                level: String::new(),
                description: String::new(),
            },
        )
    }

    /// Remove every marker this renderer drew.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface fails.
    pub fn clear(&mut self) -> Result<()> {
        while let Some(id) = self.markers.pop() {
            self.surface.remove_marker(id)?;
        }
        Ok(())
    }

    /// Number of markers currently owned.
    #[must_use]
    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    /// The underlying surface.
    #[must_use]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Clear owned markers and hand the surface back.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface fails while clearing.
    pub fn destroy(mut self) -> Result<S> {
        self.clear()?;
        debug!("Map destroyed");
        Ok(self.surface)
    }
}
