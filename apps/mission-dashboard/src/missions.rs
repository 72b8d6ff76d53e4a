use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::DashboardConfig;
use crate::error::MissionError;
use crate::geo::{Bounds, FeatureCollection, LngLat};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Map,
    Dashboard,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snackbar {
    pub open: bool,
    pub message: String,
    pub severity: Severity,
}

/// Everything the map view and its panels observe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionState {
    pub default_center: LngLat,
    pub map_center: LngLat,
    pub user_location: Option<LngLat>,
    pub current_view: View,
    pub is_table_collapsed: bool,
    pub about_open: bool,
    #[serde(skip)]
    pub missions: Option<Arc<FeatureCollection>>,
    pub is_data_loaded: bool,
    pub bounds: Option<Bounds>,
    pub snackbar: Snackbar,
}

impl MissionState {
    pub fn new(default_center: LngLat) -> Self {
        Self {
            default_center,
            map_center: default_center,
            user_location: None,
            current_view: View::Map,
            is_table_collapsed: true,
            about_open: false,
            missions: None,
            is_data_loaded: false,
            bounds: None,
            snackbar: Snackbar::default(),
        }
    }
}

pub struct MissionStore {
    state: watch::Sender<MissionState>,
    http: reqwest::Client,
    missions_url: String,
}

impl MissionStore {
    pub fn new(config: &DashboardConfig, http: reqwest::Client) -> Self {
        Self::with_base_url(&config.api_base_url, config.default_center, http)
    }

    pub fn with_base_url(base_url: &str, default_center: LngLat, http: reqwest::Client) -> Self {
        let (state, _) = watch::channel(MissionState::new(default_center));
        Self {
            state,
            http,
            missions_url: format!("{}/missions/", base_url.trim_end_matches('/')),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<MissionState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> MissionState {
        self.state.borrow().clone()
    }

    pub fn set_map_center(&self, center: LngLat) {
        self.state.send_if_modified(|state| {
            if state.map_center == center {
                return false;
            }
            state.map_center = center;
            true
        });
    }

    pub fn set_user_location(&self, location: Option<LngLat>) {
        self.state.send_if_modified(|state| {
            if state.user_location == location {
                return false;
            }
            state.user_location = location;
            true
        });
    }

    pub fn set_bounds(&self, bounds: Option<Bounds>) {
        self.state.send_if_modified(|state| {
            if state.bounds == bounds {
                return false;
            }
            state.bounds = bounds;
            true
        });
    }

    pub fn set_about_open(&self, open: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.about_open != open;
            state.about_open = open;
            changed
        });
    }

    pub fn toggle_view(&self) {
        self.state.send_modify(|state| {
            state.current_view = match state.current_view {
                View::Map => View::Dashboard,
                View::Dashboard => View::Map,
            };
        });
    }

    pub fn toggle_table(&self) {
        self.state
            .send_modify(|state| state.is_table_collapsed = !state.is_table_collapsed);
    }

    pub fn show_snackbar(&self, message: impl Into<String>, severity: Severity) {
        let message = message.into();
        self.state.send_modify(|state| {
            state.snackbar = Snackbar {
                open: true,
                message,
                severity,
            };
        });
    }

    pub fn hide_snackbar(&self) {
        self.state.send_modify(|state| state.snackbar.open = false);
    }

    /// Loads `/missions/` and derives bounds from it. On failure the previous
    /// dataset, bounds and load flag are left as they were.
    pub async fn fetch_missions(&self) -> Result<usize, MissionError> {
        let collection = match self.load_collection().await {
            Ok(collection) => collection,
            Err(err) => {
                tracing::warn!(url = %self.missions_url, error = %err, "failed to fetch missions");
                return Err(err);
            }
        };

        let features = collection.features.len();
        let bounds = if collection.is_empty() {
            None
        } else {
            collection.bounds()
        };
        if !collection.is_empty() && bounds.is_none() {
            tracing::debug!(features, "mission features carry no usable coordinates");
        }

        let collection = Arc::new(collection);
        self.state.send_modify(|state| {
            state.missions = Some(collection);
            state.is_data_loaded = true;
            if let Some(bounds) = bounds {
                state.bounds = Some(bounds);
            }
        });
        tracing::info!(features, ?bounds, "missions loaded");
        Ok(features)
    }

    async fn load_collection(&self) -> Result<FeatureCollection, MissionError> {
        let response = self
            .http
            .get(&self.missions_url)
            .send()
            .await
            .map_err(MissionError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(MissionError::Status(status));
        }
        let body = response.bytes().await.map_err(MissionError::Transport)?;
        serde_json::from_slice(&body).map_err(MissionError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_missions, unreachable_origin, ScriptedBackend};
    use reqwest::{Method, StatusCode};
    use serde_json::json;

    const CENTER: LngLat = LngLat(-90.3, 38.64);

    fn make_store(base_url: &str) -> MissionStore {
        MissionStore::with_base_url(base_url, CENTER, reqwest::Client::new())
    }

    #[tokio::test]
    async fn fetch_sets_dataset_and_bounds() {
        let backend = ScriptedBackend::default().respond_json(
            Method::GET,
            "/missions/",
            StatusCode::OK,
            sample_missions(),
        );
        let base = backend.spawn().await;
        let store = make_store(&base);

        let count = store.fetch_missions().await.unwrap();
        let state = store.snapshot();

        assert_eq!(count, 2);
        assert!(state.is_data_loaded);
        assert_eq!(state.missions.as_ref().map(|m| m.features.len()), Some(2));
        assert_eq!(
            state.bounds,
            Some(Bounds(LngLat(0.0, 0.0), LngLat(40.0, 30.0)))
        );
        assert_eq!(backend.requests_to("/missions/").len(), 1);
    }

    #[tokio::test]
    async fn empty_collection_loads_without_bounds() {
        let backend = ScriptedBackend::default().respond_json(
            Method::GET,
            "/missions/",
            StatusCode::OK,
            json!({"type": "FeatureCollection", "features": []}),
        );
        let store = make_store(&backend.spawn().await);

        assert_eq!(store.fetch_missions().await.unwrap(), 0);
        let state = store.snapshot();
        assert!(state.is_data_loaded);
        assert!(state.bounds.is_none());
    }

    #[tokio::test]
    async fn failed_fetch_leaves_state_untouched() {
        let backend = ScriptedBackend::default().respond_raw(
            Method::GET,
            "/missions/",
            StatusCode::OK,
            "<html>gateway timeout</html>",
        );
        let store = make_store(&backend.spawn().await);

        let err = store.fetch_missions().await.unwrap_err();
        assert!(matches!(err, MissionError::Decode(_)));
        let state = store.snapshot();
        assert!(!state.is_data_loaded);
        assert!(state.missions.is_none());
        assert!(state.bounds.is_none());

        let offline = make_store(&unreachable_origin());
        let err = offline.fetch_missions().await.unwrap_err();
        assert!(matches!(err, MissionError::Transport(_)));
        assert!(!offline.snapshot().is_data_loaded);
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let backend = ScriptedBackend::default().respond_json(
            Method::GET,
            "/missions/",
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"detail": "boom"}),
        );
        let store = make_store(&backend.spawn().await);

        let err = store.fetch_missions().await.unwrap_err();
        assert!(matches!(err, MissionError::Status(StatusCode::INTERNAL_SERVER_ERROR)));
        assert!(!store.snapshot().is_data_loaded);
    }

    #[test]
    fn center_and_bounds_are_independent() {
        let store = make_store("http://127.0.0.1:1");
        let bounds = Bounds(LngLat(0.0, 0.0), LngLat(1.0, 1.0));
        store.set_bounds(Some(bounds));

        store.set_map_center(LngLat(5.0, 6.0));
        let state = store.snapshot();
        assert_eq!(state.bounds, Some(bounds));
        assert_eq!(state.map_center, LngLat(5.0, 6.0));
        assert_eq!(state.default_center, CENTER);
    }

    #[test]
    fn toggles_flip_and_snackbar_overwrites() {
        let store = make_store("http://127.0.0.1:1");
        let mut updates = store.subscribe();

        store.toggle_view();
        store.toggle_table();
        let state = store.snapshot();
        assert_eq!(state.current_view, View::Dashboard);
        assert!(!state.is_table_collapsed);
        store.toggle_view();
        assert_eq!(store.snapshot().current_view, View::Map);
        assert!(updates.has_changed().unwrap());
        let _ = updates.borrow_and_update();

        store.show_snackbar("Saved", Severity::Success);
        store.show_snackbar("Upload failed", Severity::Error);
        let snackbar = store.snapshot().snackbar;
        assert!(snackbar.open);
        assert_eq!(snackbar.message, "Upload failed");
        assert_eq!(snackbar.severity, Severity::Error);

        store.hide_snackbar();
        let snackbar = store.snapshot().snackbar;
        assert!(!snackbar.open);
        assert_eq!(snackbar.message, "Upload failed");
    }

    #[test]
    fn unchanged_writes_do_not_notify() {
        let store = make_store("http://127.0.0.1:1");
        let mut updates = store.subscribe();
        let _ = updates.borrow_and_update();

        store.set_map_center(CENTER);
        store.set_user_location(None);
        store.set_about_open(false);
        assert!(!updates.has_changed().unwrap());

        store.set_user_location(Some(LngLat(1.0, 2.0)));
        assert!(updates.has_changed().unwrap());
    }
}
