use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ControlPosition, LayerSpec, MapOptions, MapWidget, MarkerId, WidgetEvent};
use crate::error::WidgetError;
use crate::geo::{Bounds, FeatureCollection, LngLat};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub at: LngLat,
    pub html: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Fit {
    pub bounds: Bounds,
    pub padding: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSnapshot {
    pub id: String,
    pub features: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSnapshot {
    pub style: String,
    pub center: LngLat,
    pub zoom: f64,
    pub style_loaded: bool,
    pub controls: Vec<ControlPosition>,
    pub sources: Vec<SourceSnapshot>,
    pub layers: Vec<LayerSpec>,
    pub click_bindings: Vec<String>,
    pub markers: Vec<LngLat>,
    pub popups: Vec<Popup>,
    pub fits: Vec<Fit>,
}

/// In-process map that keeps every call it receives as inspectable state.
/// Like a real map it refuses sources and layers until its style has loaded.
#[derive(Debug)]
pub struct HeadlessMap {
    options: MapOptions,
    center: LngLat,
    zoom: f64,
    style_loaded: bool,
    controls: Vec<ControlPosition>,
    sources: BTreeMap<String, Arc<FeatureCollection>>,
    layers: Vec<LayerSpec>,
    click_bindings: Vec<String>,
    markers: BTreeMap<MarkerId, LngLat>,
    next_marker: u64,
    popups: Vec<Popup>,
    fits: Vec<Fit>,
}

impl HeadlessMap {
    pub fn new(options: MapOptions) -> Self {
        Self {
            center: options.center,
            zoom: options.zoom,
            options,
            style_loaded: false,
            controls: Vec::new(),
            sources: BTreeMap::new(),
            layers: Vec::new(),
            click_bindings: Vec::new(),
            markers: BTreeMap::new(),
            next_marker: 0,
            popups: Vec::new(),
            fits: Vec::new(),
        }
    }

    /// Finishes the style load and returns the event the host would emit.
    pub fn complete_style_load(&mut self) -> WidgetEvent {
        self.style_loaded = true;
        WidgetEvent::Loaded
    }

    /// Click at `at` on `layer_id`. Yields an event only for a bound layer
    /// with a matching feature under the cursor.
    pub fn simulate_click(&self, layer_id: &str, at: LngLat) -> Option<WidgetEvent> {
        if !self.click_bindings.iter().any(|bound| bound == layer_id) {
            return None;
        }
        let layer = self.layers.iter().find(|layer| layer.id == layer_id)?;
        let data = self.sources.get(&layer.source)?;
        let feature = data.features.iter().find(|feature| {
            layer.matches(feature.geometry_type())
                && feature
                    .geometry
                    .as_ref()
                    .is_some_and(|geometry| geometry.vertices().contains(&at))
        })?;
        Some(WidgetEvent::Click {
            layer_id: layer_id.to_string(),
            at,
            properties: feature.properties.clone().unwrap_or_default(),
        })
    }

    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    pub fn center(&self) -> LngLat {
        self.center
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    pub fn source(&self, id: &str) -> Option<&Arc<FeatureCollection>> {
        self.sources.get(id)
    }

    pub fn click_bindings(&self) -> &[String] {
        &self.click_bindings
    }

    pub fn markers(&self) -> Vec<LngLat> {
        self.markers.values().copied().collect()
    }

    pub fn popups(&self) -> &[Popup] {
        &self.popups
    }

    pub fn fits(&self) -> &[Fit] {
        &self.fits
    }

    pub fn controls(&self) -> &[ControlPosition] {
        &self.controls
    }

    pub fn snapshot(&self) -> MapSnapshot {
        MapSnapshot {
            style: self.options.style.clone(),
            center: self.center,
            zoom: self.zoom,
            style_loaded: self.style_loaded,
            controls: self.controls.clone(),
            sources: self
                .sources
                .iter()
                .map(|(id, data)| SourceSnapshot {
                    id: id.clone(),
                    features: data.features.len(),
                })
                .collect(),
            layers: self.layers.clone(),
            click_bindings: self.click_bindings.clone(),
            markers: self.markers(),
            popups: self.popups.clone(),
            fits: self.fits.clone(),
        }
    }

    fn require_style(&self) -> Result<(), WidgetError> {
        if self.style_loaded {
            Ok(())
        } else {
            Err(WidgetError::StyleNotLoaded)
        }
    }
}

impl MapWidget for HeadlessMap {
    fn add_navigation_control(&mut self, position: ControlPosition) {
        self.controls.push(position);
    }

    fn set_center(&mut self, center: LngLat) {
        self.center = center;
    }

    fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
    }

    fn fit_bounds(&mut self, bounds: Bounds, padding: u32) {
        self.center = bounds.center();
        self.fits.push(Fit { bounds, padding });
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn add_source(&mut self, id: &str, data: Arc<FeatureCollection>) -> Result<(), WidgetError> {
        self.require_style()?;
        if self.sources.contains_key(id) {
            return Err(WidgetError::DuplicateSource(id.to_string()));
        }
        self.sources.insert(id.to_string(), data);
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), WidgetError> {
        if let Some(layer) = self.layers.iter().find(|layer| layer.source == id) {
            return Err(WidgetError::SourceInUse {
                source_id: id.to_string(),
                layer_id: layer.id.clone(),
            });
        }
        self.sources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| WidgetError::MissingSource(id.to_string()))
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layers.iter().any(|layer| layer.id == id)
    }

    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), WidgetError> {
        self.require_style()?;
        if self.has_layer(&layer.id) {
            return Err(WidgetError::DuplicateLayer(layer.id));
        }
        if !self.sources.contains_key(&layer.source) {
            return Err(WidgetError::MissingSource(layer.source));
        }
        self.layers.push(layer);
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), WidgetError> {
        let index = self
            .layers
            .iter()
            .position(|layer| layer.id == id)
            .ok_or_else(|| WidgetError::MissingLayer(id.to_string()))?;
        self.layers.remove(index);
        Ok(())
    }

    fn bind_click(&mut self, layer_id: &str) -> Result<(), WidgetError> {
        if !self.has_layer(layer_id) {
            return Err(WidgetError::MissingLayer(layer_id.to_string()));
        }
        self.click_bindings.push(layer_id.to_string());
        Ok(())
    }

    fn add_marker(&mut self, at: LngLat) -> MarkerId {
        let id = MarkerId(self.next_marker);
        self.next_marker += 1;
        self.markers.insert(id, at);
        id
    }

    fn remove_marker(&mut self, id: MarkerId) -> bool {
        self.markers.remove(&id).is_some()
    }

    fn open_popup(&mut self, at: LngLat, html: String) {
        self.popups.push(Popup { at, html });
    }
}
