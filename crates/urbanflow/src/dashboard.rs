//! One open dashboard tab.
//!
//! A [`Dashboard`] ties the reconciler to an optional map and a signal
//! listener. Every refresh signal recomputes the merged view from storage
//! and redraws. If the map fails it is dropped for the rest of the session
//! and the data view keeps working without it.

use tracing::{debug, error};

use crate::error::Error;
use crate::notify::{FocusRequest, Signal, SignalListener};
use crate::reconciler::Reconciler;
use crate::record::TrafficRecord;
use crate::render::{summarize, MapRenderer, MapSurface, ViewSummary};

/// A tab's live state.
#[derive(Debug)]
pub struct Dashboard<S: MapSurface> {
    reconciler: Reconciler,
    map: Option<MapRenderer<S>>,
    listener: Box<dyn SignalListener>,
    view: Vec<TrafficRecord>,
    summary: ViewSummary,
}

impl<S: MapSurface> Dashboard<S> {
    /// Open a tab. Call [`Dashboard::refresh`] to load the first view.
    #[must_use]
    pub fn new(
        reconciler: Reconciler,
        map: Option<MapRenderer<S>>,
        listener: Box<dyn SignalListener>,
    ) -> Self {
        Self {
            reconciler,
            map,
            listener,
            view: Vec::new(),
            summary: ViewSummary::default(),
        }
    }

    /// Recompute the merged view and redraw the map.
    pub fn refresh(&mut self) -> &[TrafficRecord] {
        self.view = self.reconciler.merged_view();
        self.summary = summarize(&self.view);

        if let Some(map) = self.map.as_mut() {
            if let Err(err) = map.render(&self.view) {
                self.disable_map(&err);
            }
        }
        &self.view
    }

    /// Apply one signal.
    pub fn handle(&mut self, signal: &Signal) {
        match signal {
            Signal::Refresh(refresh) => {
                debug!(token = %refresh.token, "Refresh requested");
                self.refresh();
            }
            Signal::Focus(request) => self.focus(request),
        }
    }

    /// Drain the listener and apply what arrived.
    ///
    /// Several refresh signals in one batch cause a single recompute.
    /// Returns the number of signals received.
    pub fn poll(&mut self) -> usize {
        let signals = self.listener.poll();
        if signals.iter().any(|s| matches!(s, Signal::Refresh(_))) {
            self.refresh();
        }
        for signal in &signals {
            if let Signal::Focus(request) = signal {
                self.focus(request);
            }
        }
        signals.len()
    }

    fn focus(&mut self, request: &FocusRequest) {
        let Some(map) = self.map.as_mut() else {
            debug!("Focus request ignored: no map");
            return;
        };
        if let Err(err) = map.focus(request) {
            self.disable_map(&err);
        }
    }

    fn disable_map(&mut self, err: &Error) {
        error!("Map disabled for this session: {err}");
        self.map = None;
    }

    /// The reconciler behind this tab.
    #[must_use]
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// The view as of the last refresh.
    #[must_use]
    pub fn view(&self) -> &[TrafficRecord] {
        &self.view
    }

    /// Summary of the view as of the last refresh.
    #[must_use]
    pub fn summary(&self) -> ViewSummary {
        self.summary
    }

    /// The map, while it is still working.
    #[must_use]
    pub fn map(&self) -> Option<&MapRenderer<S>> {
        self.map.as_ref()
    }

    /// Close the tab and hand back the map surface, if any.
    #[must_use]
    pub fn close(self) -> Option<S> {
        let map = self.map?;
        match map.destroy() {
            Ok(surface) => Some(surface),
            Err(err) => {
                error!("Failed to tear down map: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::BaselineLoader;
    use crate::config::MapConfig;
    use crate::error::Result;
    use crate::notify::{LocalBus, Notifier, RefreshSignal};
    use crate::overrides::OverrideLayer;
    use crate::record::NewRecord;
    use crate::render::{CircleMarker, GeoJsonSurface, MarkerId, Popup};
    use crate::storage::LocalStore;
    use std::sync::Arc;

    const BASELINE: &str =
        r#"[{"title":"Jam A","level":"high","severity":3,"lat":40.4,"lng":49.8}]"#;

    #[derive(Debug, Default)]
    struct BrokenSurface;

    impl MapSurface for BrokenSurface {
        fn set_view(&mut self, _lat: f64, _lng: f64, _zoom: u8) -> Result<()> {
            Ok(())
        }

        fn add_circle(&mut self, _marker: &CircleMarker) -> Result<MarkerId> {
            Err(Error::map_unavailable("library failed to load"))
        }

        fn remove_marker(&mut self, _id: MarkerId) -> Result<()> {
            Ok(())
        }

        fn open_popup(&mut self, _lat: f64, _lng: f64, _content: &Popup) -> Result<()> {
            Ok(())
        }
    }

    fn open_tab<S: MapSurface>(bus: &Arc<LocalBus>, store: &LocalStore, surface: S) -> Dashboard<S> {
        let overrides = OverrideLayer::new(store.clone(), Notifier::new(bus.clone()));
        let reconciler = Reconciler::new(BaselineLoader::inline(BASELINE), overrides);
        let map = MapRenderer::create(surface, &MapConfig::default()).unwrap();
        Dashboard::new(reconciler, Some(map), Box::new(bus.subscribe()))
    }

    #[test]
    fn test_refresh_renders_view() {
        let bus = Arc::new(LocalBus::new());
        let store = LocalStore::open_in_memory().unwrap();
        let mut tab = open_tab(&bus, &store, GeoJsonSurface::new());

        assert_eq!(tab.refresh().len(), 1);
        assert_eq!(tab.summary().active_jams, 1);
        assert_eq!(tab.map().unwrap().surface().len(), 1);
    }

    #[test]
    fn test_sibling_add_picked_up_by_poll() {
        let bus = Arc::new(LocalBus::new());
        let store = LocalStore::open_in_memory().unwrap();
        let mut admin = open_tab(&bus, &store, GeoJsonSurface::new());
        let mut viewer = open_tab(&bus, &store, GeoJsonSurface::new());
        viewer.refresh();

        admin
            .reconciler()
            .add(NewRecord::titled("Test").at(40.1, 49.1))
            .unwrap();

        assert_eq!(viewer.poll(), 1);
        assert_eq!(viewer.view().len(), 2);
        assert_eq!(viewer.map().unwrap().surface().len(), 2);
    }

    #[test]
    fn test_refresh_signals_coalesce() {
        let bus = Arc::new(LocalBus::new());
        let store = LocalStore::open_in_memory().unwrap();
        let mut tab = open_tab(&bus, &store, GeoJsonSurface::new());
        let notifier = Notifier::new(bus.clone());

        notifier.broadcast_refresh().unwrap();
        notifier.broadcast_refresh().unwrap();
        assert_eq!(tab.poll(), 2);
        assert_eq!(tab.view().len(), 1);
    }

    #[test]
    fn test_focus_signal_moves_map() {
        let bus = Arc::new(LocalBus::new());
        let store = LocalStore::open_in_memory().unwrap();
        let mut tab = open_tab(&bus, &store, GeoJsonSurface::new());

        Notifier::new(bus.clone())
            .broadcast_focus(40.41, 49.87, "Jam A")
            .unwrap();
        tab.poll();

        let view = tab.map().unwrap().surface().view();
        assert_eq!(view, Some((40.41, 49.87, 15)));
    }

    #[test]
    fn test_map_failure_disables_map_only() {
        let bus = Arc::new(LocalBus::new());
        let store = LocalStore::open_in_memory().unwrap();
        let mut tab = open_tab(&bus, &store, BrokenSurface);

        assert_eq!(tab.refresh().len(), 1);
        assert!(tab.map().is_none());

        tab.handle(&Signal::Refresh(RefreshSignal::now()));
        assert_eq!(tab.view().len(), 1);
        assert_eq!(tab.summary().alerts, 1);
    }

    #[test]
    fn test_without_map() {
        let bus = Arc::new(LocalBus::new());
        let store = LocalStore::open_in_memory().unwrap();
        let overrides = OverrideLayer::new(store, Notifier::new(bus.clone()));
        let mut tab: Dashboard<GeoJsonSurface> = Dashboard::new(
            Reconciler::new(BaselineLoader::inline(BASELINE), overrides),
            None,
            Box::new(bus.subscribe()),
        );

        tab.handle(&Signal::Focus(FocusRequest::new(1.0, 2.0, "x")));
        assert_eq!(tab.refresh().len(), 1);
        assert!(tab.close().is_none());
    }

    #[test]
    fn test_close_returns_cleared_surface() {
        let bus = Arc::new(LocalBus::new());
        let store = LocalStore::open_in_memory().unwrap();
        let mut tab = open_tab(&bus, &store, GeoJsonSurface::new());
        tab.refresh();

        let surface = tab.close().unwrap();
        assert!(surface.is_empty());
    }
}
