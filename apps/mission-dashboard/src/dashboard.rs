use crate::error::MissionError;
use crate::map::geolocation::{Alerter, Geolocator};
use crate::map::sync::{MapDefaults, MapSynchronizer};
use crate::map::{MapOptions, MapWidget, WidgetEvent};
use crate::missions::{MissionStore, Severity};

pub const LOAD_FAILED_MESSAGE: &str = "Failed to load missions.";

/// The map view: one mission store driving one synchronized widget.
pub struct Dashboard<'a, W> {
    missions: &'a MissionStore,
    map: MapSynchronizer<W>,
}

impl<'a, W: MapWidget> Dashboard<'a, W> {
    pub fn new(missions: &'a MissionStore, defaults: MapDefaults) -> Self {
        Self {
            missions,
            map: MapSynchronizer::new(defaults),
        }
    }

    pub fn missions(&self) -> &MissionStore {
        self.missions
    }

    pub fn map(&self) -> &MapSynchronizer<W> {
        &self.map
    }

    pub fn map_mut(&mut self) -> &mut MapSynchronizer<W> {
        &mut self.map
    }

    /// Mounts the widget and loads missions. A failed load is shown as an
    /// error notification and returned.
    pub async fn mount<F>(&mut self, factory: F) -> Result<usize, MissionError>
    where
        F: FnOnce(MapOptions) -> W,
    {
        self.map.mount(&self.missions.snapshot(), factory);
        let loaded = self.missions.fetch_missions().await;
        if loaded.is_err() {
            self.missions.show_snackbar(LOAD_FAILED_MESSAGE, Severity::Error);
        }
        self.map.apply(&self.missions.snapshot());
        loaded
    }

    pub fn handle_event(&mut self, event: WidgetEvent) {
        self.map.handle_event(event, &self.missions.snapshot());
    }

    pub fn home(&mut self) {
        let default_center = self.missions.snapshot().default_center;
        self.map.home(default_center);
    }

    pub async fn locate<G, A>(&mut self, geolocator: &G, alerter: &A)
    where
        G: Geolocator + ?Sized,
        A: Alerter + ?Sized,
    {
        self.map.locate(geolocator, self.missions, alerter).await;
    }
}
