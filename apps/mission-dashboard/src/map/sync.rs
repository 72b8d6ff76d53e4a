use std::sync::Arc;
use tokio::sync::mpsc;

use super::geolocation::{alert_message, Alerter, Geolocator};
use super::{
    mission_layers, popup_html, ControlPosition, MapOptions, MapWidget, MarkerId, WidgetEvent,
    MISSIONS_SOURCE_ID, POINT_LAYER_ID,
};
use crate::config::DashboardConfig;
use crate::error::WidgetError;
use crate::geo::{Bounds, FeatureCollection, LngLat};
use crate::missions::{MissionState, MissionStore};

/// Viewport constants the synchronizer needs besides the store.
#[derive(Debug, Clone)]
pub struct MapDefaults {
    pub style: String,
    pub access_token: Option<String>,
    pub default_zoom: f64,
    pub gps_zoom: f64,
    pub fit_padding: u32,
}

impl MapDefaults {
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self {
            style: config.map_style.clone(),
            access_token: config.mapbox_access_token.clone(),
            default_zoom: config.default_zoom,
            gps_zoom: config.gps_zoom,
            fit_padding: config.fit_padding,
        }
    }
}

impl Default for MapDefaults {
    fn default() -> Self {
        Self::from_config(&DashboardConfig::default())
    }
}

/// What has already been pushed to the widget.
#[derive(Debug, Default)]
struct Applied {
    center: Option<LngLat>,
    bounds: Option<Bounds>,
    user_location: Option<LngLat>,
    dataset: Option<Arc<FeatureCollection>>,
}

/// One-way projection of `MissionState` onto a single map widget.
pub struct MapSynchronizer<W> {
    widget: Option<W>,
    ready: bool,
    defaults: MapDefaults,
    applied: Applied,
    marker: Option<MarkerId>,
    click_bound: bool,
}

impl<W: MapWidget> MapSynchronizer<W> {
    pub fn new(defaults: MapDefaults) -> Self {
        Self {
            widget: None,
            ready: false,
            defaults,
            applied: Applied::default(),
            marker: None,
            click_bound: false,
        }
    }

    pub fn widget(&self) -> Option<&W> {
        self.widget.as_ref()
    }

    pub fn widget_mut(&mut self) -> Option<&mut W> {
        self.widget.as_mut()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Creates the widget at the current center. Later calls do nothing.
    pub fn mount<F>(&mut self, state: &MissionState, factory: F)
    where
        F: FnOnce(MapOptions) -> W,
    {
        if self.widget.is_some() {
            return;
        }
        let options = MapOptions {
            style: self.defaults.style.clone(),
            center: state.map_center,
            zoom: self.defaults.default_zoom,
            access_token: self.defaults.access_token.clone(),
        };
        let mut widget = factory(options);
        widget.add_navigation_control(ControlPosition::TopRight);
        self.widget = Some(widget);
        self.applied.center = Some(state.map_center);
        tracing::debug!(center = ?state.map_center, "map widget mounted");
    }

    /// Pushes whatever changed in `state` since the last call. Marker and
    /// dataset updates wait until the widget reports `Loaded`.
    pub fn apply(&mut self, state: &MissionState) {
        let Self {
            widget,
            ready,
            defaults,
            applied,
            marker,
            click_bound,
        } = self;
        let Some(widget) = widget.as_mut() else {
            return;
        };

        if applied.center != Some(state.map_center) {
            widget.set_center(state.map_center);
            applied.center = Some(state.map_center);
        }

        if applied.bounds != state.bounds {
            if let Some(bounds) = state.bounds {
                widget.fit_bounds(bounds, defaults.fit_padding);
            }
            applied.bounds = state.bounds;
        }

        if !*ready {
            return;
        }

        if applied.user_location != state.user_location {
            if let Some(previous) = marker.take() {
                widget.remove_marker(previous);
            }
            if let Some(at) = state.user_location {
                *marker = Some(widget.add_marker(at));
            }
            applied.user_location = state.user_location;
        }

        if let Some(dataset) = &state.missions {
            let unchanged = applied
                .dataset
                .as_ref()
                .is_some_and(|previous| Arc::ptr_eq(previous, dataset));
            if !unchanged {
                match replace_dataset(widget, dataset.clone(), click_bound) {
                    Ok(()) => {
                        applied.dataset = Some(dataset.clone());
                        tracing::debug!(features = dataset.features.len(), "mission layers replaced");
                    }
                    Err(err) => tracing::warn!(error = %err, "failed to replace mission layers"),
                }
            }
        }
    }

    pub fn handle_event(&mut self, event: WidgetEvent, state: &MissionState) {
        match event {
            WidgetEvent::Loaded => {
                self.ready = true;
                self.apply(state);
            }
            WidgetEvent::Click {
                layer_id,
                at,
                properties,
            } => {
                if layer_id != POINT_LAYER_ID {
                    return;
                }
                if let Some(widget) = self.widget.as_mut() {
                    widget.open_popup(at, popup_html(&properties));
                }
            }
        }
    }

    /// Recenters the widget on `default_center` at the default zoom.
    pub fn home(&mut self, default_center: LngLat) {
        if let Some(widget) = self.widget.as_mut() {
            widget.set_center(default_center);
            widget.set_zoom(self.defaults.default_zoom);
        }
    }

    /// Takes one position fix, flies the widget there and records it as the
    /// user location. Failures are reported through `alerter` only.
    pub async fn locate<G, A>(&mut self, geolocator: &G, store: &MissionStore, alerter: &A)
    where
        G: Geolocator + ?Sized,
        A: Alerter + ?Sized,
    {
        let fix = match geolocator.current_position().await {
            Ok(fix) => fix,
            Err(err) => {
                tracing::warn!(error = %err, "geolocation failed");
                alerter.alert(alert_message(&err));
                return;
            }
        };

        if let Some(widget) = self.widget.as_mut() {
            widget.set_center(fix);
            widget.set_zoom(self.defaults.gps_zoom);
        }
        store.set_user_location(Some(fix));
        self.apply(&store.snapshot());
    }

    /// Applies the current state, then follows store changes and widget
    /// events until the event channel closes.
    pub async fn run(&mut self, store: &MissionStore, mut events: mpsc::Receiver<WidgetEvent>) {
        let mut updates = store.subscribe();
        let current = updates.borrow_and_update().clone();
        self.apply(&current);

        loop {
            tokio::select! {
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = updates.borrow_and_update().clone();
                    self.apply(&state);
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    let state = updates.borrow().clone();
                    self.handle_event(event, &state);
                }
            }
        }
    }
}

/// Removes the mission layers and source if present, then adds them back
/// for `dataset`. The point-layer click binding is registered once.
fn replace_dataset<W: MapWidget>(
    widget: &mut W,
    dataset: Arc<FeatureCollection>,
    click_bound: &mut bool,
) -> Result<(), WidgetError> {
    let layers = mission_layers();
    if widget.has_source(MISSIONS_SOURCE_ID) {
        for layer in &layers {
            if widget.has_layer(&layer.id) {
                widget.remove_layer(&layer.id)?;
            }
        }
        widget.remove_source(MISSIONS_SOURCE_ID)?;
    }

    widget.add_source(MISSIONS_SOURCE_ID, dataset)?;
    for layer in layers {
        widget.add_layer(layer)?;
    }

    if !*click_bound {
        widget.bind_click(POINT_LAYER_ID)?;
        *click_bound = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::geolocation::{StaticGeolocator, POSITION_UNAVAILABLE_MESSAGE, UNSUPPORTED_MESSAGE};
    use crate::map::headless::HeadlessMap;
    use crate::test_support::{sample_collection, RecordingAlerter};

    const HOME: LngLat = LngLat(-90.3, 38.64);

    fn store() -> MissionStore {
        MissionStore::with_base_url("http://127.0.0.1:1", HOME, reqwest::Client::new())
    }

    fn mounted(state: &MissionState) -> MapSynchronizer<HeadlessMap> {
        let mut sync = MapSynchronizer::new(MapDefaults::default());
        sync.mount(state, HeadlessMap::new);
        sync
    }

    fn loaded(state: &MissionState) -> MapSynchronizer<HeadlessMap> {
        let mut sync = mounted(state);
        let event = sync.widget_mut().unwrap().complete_style_load();
        sync.handle_event(event, state);
        sync
    }

    fn with_dataset(mut state: MissionState) -> MissionState {
        let data = sample_collection();
        state.bounds = data.bounds();
        state.missions = Some(Arc::new(data));
        state.is_data_loaded = true;
        state
    }

    #[test]
    fn mount_creates_one_widget() {
        let state = MissionState::new(HOME);
        let mut sync = mounted(&state);
        sync.mount(&state, |_| panic!("second widget created"));

        let widget = sync.widget().unwrap();
        assert_eq!(widget.center(), HOME);
        assert_eq!(widget.zoom(), 11.0);
        assert_eq!(widget.controls(), &[ControlPosition::TopRight]);
        assert_eq!(widget.options().style, "mapbox://styles/mapbox/light-v10");
    }

    #[test]
    fn apply_without_widget_is_a_no_op() {
        let mut sync: MapSynchronizer<HeadlessMap> = MapSynchronizer::new(MapDefaults::default());
        sync.apply(&with_dataset(MissionState::new(HOME)));
        assert!(sync.widget().is_none());
    }

    #[test]
    fn dataset_waits_for_style_load() {
        let state = with_dataset(MissionState::new(HOME));
        let mut sync = mounted(&state);
        sync.apply(&state);
        {
            let widget = sync.widget().unwrap();
            assert!(widget.layers().is_empty());
            assert_eq!(widget.fits().len(), 1);
        }

        let event = sync.widget_mut().unwrap().complete_style_load();
        sync.handle_event(event, &state);
        let widget = sync.widget().unwrap();
        assert!(sync.is_ready());
        assert_eq!(widget.source_ids(), vec![MISSIONS_SOURCE_ID]);
        assert_eq!(widget.layers().len(), 3);
        assert_eq!(widget.click_bindings(), &[POINT_LAYER_ID.to_string()]);
    }

    #[test]
    fn repeated_refreshes_keep_one_source_three_layers_one_binding() {
        let mut state = with_dataset(MissionState::new(HOME));
        let mut sync = loaded(&state);

        for _ in 0..3 {
            state.missions = Some(Arc::new(sample_collection()));
            sync.apply(&state);
        }
        sync.apply(&state);

        let widget = sync.widget().unwrap();
        assert_eq!(widget.source_ids().len(), 1);
        assert_eq!(widget.layers().len(), 3);
        assert_eq!(widget.click_bindings().len(), 1);
        assert!(Arc::ptr_eq(
            widget.source(MISSIONS_SOURCE_ID).unwrap(),
            state.missions.as_ref().unwrap()
        ));
    }

    #[test]
    fn bounds_fit_without_touching_stored_center() {
        let store = store();
        let mut sync = loaded(&store.snapshot());

        store.set_bounds(Some(Bounds(LngLat(0.0, 0.0), LngLat(40.0, 30.0))));
        sync.apply(&store.snapshot());

        let widget = sync.widget().unwrap();
        assert_eq!(widget.fits()[0].padding, 20);
        assert_eq!(widget.center(), LngLat(20.0, 15.0));
        assert_eq!(store.snapshot().map_center, HOME);

        sync.apply(&store.snapshot());
        assert_eq!(sync.widget().unwrap().fits().len(), 1);
    }

    #[test]
    fn center_change_keeps_zoom() {
        let store = store();
        let mut sync = loaded(&store.snapshot());
        sync.widget_mut().unwrap().set_zoom(7.0);

        store.set_map_center(LngLat(5.0, 6.0));
        sync.apply(&store.snapshot());
        let widget = sync.widget().unwrap();
        assert_eq!(widget.center(), LngLat(5.0, 6.0));
        assert_eq!(widget.zoom(), 7.0);
    }

    #[test]
    fn user_location_marker_is_replaced() {
        let store = store();
        let mut sync = mounted(&store.snapshot());

        store.set_user_location(Some(LngLat(1.0, 1.0)));
        sync.apply(&store.snapshot());
        assert!(sync.widget().unwrap().markers().is_empty());

        let event = sync.widget_mut().unwrap().complete_style_load();
        sync.handle_event(event, &store.snapshot());
        assert_eq!(sync.widget().unwrap().markers(), vec![LngLat(1.0, 1.0)]);

        store.set_user_location(Some(LngLat(2.0, 2.0)));
        sync.apply(&store.snapshot());
        assert_eq!(sync.widget().unwrap().markers(), vec![LngLat(2.0, 2.0)]);
    }

    #[test]
    fn cleared_user_location_removes_marker() {
        let store = store();
        let mut sync = loaded(&store.snapshot());

        store.set_user_location(Some(LngLat(1.0, 1.0)));
        sync.apply(&store.snapshot());
        assert_eq!(sync.widget().unwrap().markers(), vec![LngLat(1.0, 1.0)]);

        store.set_user_location(None);
        sync.apply(&store.snapshot());
        assert!(sync.widget().unwrap().markers().is_empty());
    }

    #[test]
    fn point_click_opens_popup() {
        let state = with_dataset(MissionState::new(HOME));
        let mut sync = loaded(&state);

        let click = sync
            .widget()
            .unwrap()
            .simulate_click(POINT_LAYER_ID, LngLat(10.0, 20.0))
            .expect("click");
        sync.handle_event(click, &state);

        let popups = sync.widget().unwrap().popups();
        assert_eq!(popups.len(), 1);
        assert_eq!(popups[0].at, LngLat(10.0, 20.0));
        assert_eq!(popups[0].html, "<strong>Buoy &lt;7&gt;</strong><br/>Depth: 42m");
    }

    #[test]
    fn home_resets_widget_only() {
        let store = store();
        store.set_map_center(LngLat(3.0, 4.0));
        let mut sync = loaded(&store.snapshot());
        sync.widget_mut().unwrap().set_zoom(4.0);

        sync.home(HOME);
        let widget = sync.widget().unwrap();
        assert_eq!(widget.center(), HOME);
        assert_eq!(widget.zoom(), 11.0);
        assert_eq!(store.snapshot().map_center, LngLat(3.0, 4.0));
    }

    #[tokio::test]
    async fn locate_success_flies_to_fix() {
        let store = store();
        let mut sync = loaded(&store.snapshot());
        let alerter = RecordingAlerter::default();

        let fix = LngLat(-90.2, 38.7);
        sync.locate(&StaticGeolocator::Fix(fix), &store, &alerter).await;

        let widget = sync.widget().unwrap();
        assert_eq!(widget.center(), fix);
        assert_eq!(widget.zoom(), 14.0);
        assert_eq!(widget.markers(), vec![fix]);
        assert_eq!(store.snapshot().user_location, Some(fix));
        assert!(alerter.messages().is_empty());
    }

    #[tokio::test]
    async fn locate_failures_alert_and_leave_state() {
        let store = store();
        let mut sync = loaded(&store.snapshot());
        let alerter = RecordingAlerter::default();

        let denied = StaticGeolocator::Unavailable("denied".to_string());
        sync.locate(&denied, &store, &alerter).await;
        sync.locate(&StaticGeolocator::Unsupported, &store, &alerter).await;

        assert_eq!(
            alerter.messages(),
            vec![POSITION_UNAVAILABLE_MESSAGE.to_string(), UNSUPPORTED_MESSAGE.to_string()]
        );
        assert!(store.snapshot().user_location.is_none());
        let widget = sync.widget().unwrap();
        assert_eq!(widget.center(), HOME);
        assert!(widget.markers().is_empty());
    }

    #[tokio::test]
    async fn run_follows_store_and_events() {
        let store = store();
        let mut sync = mounted(&store.snapshot());
        let load = sync.widget_mut().unwrap().complete_style_load();
        let (events, rx) = mpsc::channel(4);

        let driver = async {
            events.send(load).await.unwrap();
            tokio::task::yield_now().await;
            store.set_map_center(LngLat(7.0, 8.0));
            tokio::task::yield_now().await;
            drop(events);
        };
        tokio::join!(sync.run(&store, rx), driver);

        assert!(sync.is_ready());
        assert_eq!(sync.widget().unwrap().center(), LngLat(7.0, 8.0));
    }
}
