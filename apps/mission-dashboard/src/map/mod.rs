pub mod geolocation;
pub mod headless;
pub mod sync;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;

use crate::error::WidgetError;
use crate::geo::{Bounds, FeatureCollection, GeometryType, LngLat};

pub const MISSIONS_SOURCE_ID: &str = "missions";
pub const FILL_LAYER_ID: &str = "missions-fill";
pub const LINE_LAYER_ID: &str = "missions-line";
pub const POINT_LAYER_ID: &str = "missions-point";

const MISSION_COLOR: &str = "#088";
const POINT_COLOR: &str = "#f30";

/// Options a widget is created with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapOptions {
    pub style: String,
    pub center: LngLat,
    pub zoom: f64,
    #[serde(skip)]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Fill,
    Line,
    Circle,
}

/// Style layer drawing the features of `source` whose geometry is `filter`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: LayerKind,
    pub source: String,
    pub paint: JsonValue,
    #[serde(serialize_with = "serialize_filter")]
    pub filter: GeometryType,
}

impl LayerSpec {
    pub fn matches(&self, geometry: Option<GeometryType>) -> bool {
        geometry == Some(self.filter)
    }

    pub fn filter_expression(&self) -> JsonValue {
        geometry_filter(self.filter)
    }
}

fn geometry_filter(kind: GeometryType) -> JsonValue {
    json!(["==", "$type", kind.as_str()])
}

fn serialize_filter<S: serde::Serializer>(filter: &GeometryType, serializer: S) -> Result<S::Ok, S::Error> {
    geometry_filter(*filter).serialize(serializer)
}

/// Fill for polygons, line for line strings, circle for points.
pub fn mission_layers() -> Vec<LayerSpec> {
    vec![
        LayerSpec {
            id: FILL_LAYER_ID.to_string(),
            kind: LayerKind::Fill,
            source: MISSIONS_SOURCE_ID.to_string(),
            paint: json!({"fill-color": MISSION_COLOR, "fill-opacity": 0.4}),
            filter: GeometryType::Polygon,
        },
        LayerSpec {
            id: LINE_LAYER_ID.to_string(),
            kind: LayerKind::Line,
            source: MISSIONS_SOURCE_ID.to_string(),
            paint: json!({"line-color": MISSION_COLOR, "line-width": 2}),
            filter: GeometryType::LineString,
        },
        LayerSpec {
            id: POINT_LAYER_ID.to_string(),
            kind: LayerKind::Circle,
            source: MISSIONS_SOURCE_ID.to_string(),
            paint: json!({"circle-radius": 6, "circle-color": POINT_COLOR}),
            filter: GeometryType::Point,
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MarkerId(pub u64);

/// Events a widget host delivers back to the synchronizer.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetEvent {
    /// The style finished loading; sources and layers may now be added.
    Loaded,
    Click {
        layer_id: String,
        at: LngLat,
        properties: Map<String, JsonValue>,
    },
}

/// Imperative surface of an interactive map.
pub trait MapWidget {
    fn add_navigation_control(&mut self, position: ControlPosition);
    fn set_center(&mut self, center: LngLat);
    fn set_zoom(&mut self, zoom: f64);
    fn fit_bounds(&mut self, bounds: Bounds, padding: u32);

    fn has_source(&self, id: &str) -> bool;
    fn add_source(&mut self, id: &str, data: Arc<FeatureCollection>) -> Result<(), WidgetError>;
    fn remove_source(&mut self, id: &str) -> Result<(), WidgetError>;

    fn has_layer(&self, id: &str) -> bool;
    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), WidgetError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), WidgetError>;

    /// Starts delivering `WidgetEvent::Click` for features of `layer_id`.
    fn bind_click(&mut self, layer_id: &str) -> Result<(), WidgetError>;

    fn add_marker(&mut self, at: LngLat) -> MarkerId;
    fn remove_marker(&mut self, id: MarkerId) -> bool;
    fn open_popup(&mut self, at: LngLat, html: String);
}

/// Popup body for a clicked mission point.
pub fn popup_html(properties: &Map<String, JsonValue>) -> String {
    format!(
        "<strong>{}</strong><br/>Depth: {}m",
        escape_html(&property_text(properties.get("name"))),
        escape_html(&property_text(properties.get("depth"))),
    )
}

fn property_text(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(value: JsonValue) -> Map<String, JsonValue> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn popup_escapes_name_and_depth() {
        let html = popup_html(&props(json!({"name": "Buoy <7> & \"co\"", "depth": 42})));
        assert_eq!(
            html,
            "<strong>Buoy &lt;7&gt; &amp; &quot;co&quot;</strong><br/>Depth: 42m"
        );
    }

    #[test]
    fn popup_tolerates_missing_properties() {
        assert_eq!(popup_html(&Map::new()), "<strong></strong><br/>Depth: m");
        assert_eq!(
            popup_html(&props(json!({"name": "Reef", "depth": 12.5}))),
            "<strong>Reef</strong><br/>Depth: 12.5m"
        );
    }

    #[test]
    fn mission_layers_filter_by_geometry() {
        let layers = mission_layers();
        let ids: Vec<_> = layers.iter().map(|layer| layer.id.as_str()).collect();
        assert_eq!(ids, [FILL_LAYER_ID, LINE_LAYER_ID, POINT_LAYER_ID]);
        assert!(layers.iter().all(|layer| layer.source == MISSIONS_SOURCE_ID));

        let point = &layers[2];
        assert_eq!(point.filter_expression(), json!(["==", "$type", "Point"]));
        assert!(point.matches(Some(GeometryType::Point)));
        assert!(!point.matches(Some(GeometryType::Polygon)));
        assert!(!point.matches(None));

        let value = serde_json::to_value(&layers[0]).unwrap();
        assert_eq!(value["type"], json!("fill"));
        assert_eq!(value["paint"]["fill-opacity"], json!(0.4));
        assert_eq!(value["filter"], json!(["==", "$type", "Polygon"]));
    }
}
