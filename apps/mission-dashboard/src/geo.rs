use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Longitude/latitude pair, serialized as `[lng, lat]` like a GeoJSON position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LngLat(pub f64, pub f64);

impl LngLat {
    pub fn lng(&self) -> f64 {
        self.0
    }

    pub fn lat(&self) -> f64 {
        self.1
    }

    /// Parses `"lng,lat"`; whitespace around either number is ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let (lng, lat) = raw.split_once(',')?;
        let lng = lng.trim().parse::<f64>().ok()?;
        let lat = lat.trim().parse::<f64>().ok()?;
        if !lng.is_finite() || !lat.is_finite() {
            return None;
        }
        Some(Self(lng, lat))
    }
}

/// Rectangular region as `[[min_lng, min_lat], [max_lng, max_lat]]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds(pub LngLat, pub LngLat);

impl Bounds {
    pub fn south_west(&self) -> LngLat {
        self.0
    }

    pub fn north_east(&self) -> LngLat {
        self.1
    }

    pub fn center(&self) -> LngLat {
        LngLat(
            (self.0.lng() + self.1.lng()) / 2.0,
            (self.0.lat() + self.1.lat()) / 2.0,
        )
    }

    /// Coordinate-wise min/max over `points`; `None` when there are no points.
    pub fn enclosing<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = LngLat>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), point| {
            (
                LngLat(min.lng().min(point.lng()), min.lat().min(point.lat())),
                LngLat(max.lng().max(point.lng()), max.lat().max(point.lat())),
            )
        });
        Some(Self(min, max))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryType {
    Point,
    LineString,
    Polygon,
}

impl GeometryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryType::Point => "Point",
            GeometryType::LineString => "LineString",
            GeometryType::Polygon => "Polygon",
        }
    }
}

/// GeoJSON geometry. Kinds other than Point/LineString/Polygon are kept as-is
/// but contribute no vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub coordinates: JsonValue,
}

impl Geometry {
    pub fn point(at: LngLat) -> Self {
        Self {
            kind: GeometryType::Point.as_str().to_string(),
            coordinates: serde_json::json!([at.lng(), at.lat()]),
        }
    }

    pub fn geometry_type(&self) -> Option<GeometryType> {
        match self.kind.as_str() {
            "Point" => Some(GeometryType::Point),
            "LineString" => Some(GeometryType::LineString),
            "Polygon" => Some(GeometryType::Polygon),
            _ => None,
        }
    }

    pub fn vertices(&self) -> Vec<LngLat> {
        match self.geometry_type() {
            Some(GeometryType::Point) => position(&self.coordinates).into_iter().collect(),
            Some(GeometryType::LineString) => positions(&self.coordinates),
            Some(GeometryType::Polygon) => self
                .coordinates
                .as_array()
                .map(|rings| rings.iter().flat_map(positions).collect())
                .unwrap_or_default(),
            None => Vec::new(),
        }
    }
}

fn position(value: &JsonValue) -> Option<LngLat> {
    let coords = value.as_array()?;
    let lng = coords.first()?.as_f64()?;
    let lat = coords.get(1)?.as_f64()?;
    Some(LngLat(lng, lat))
}

fn positions(value: &JsonValue) -> Vec<LngLat> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(position).collect())
        .unwrap_or_default()
}

fn feature_tag() -> String {
    "Feature".to_string()
}

fn collection_tag() -> String {
    "FeatureCollection".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default = "feature_tag")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonValue>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Option<Map<String, JsonValue>>,
}

impl Feature {
    pub fn property(&self, key: &str) -> Option<&JsonValue> {
        self.properties.as_ref()?.get(key)
    }

    pub fn geometry_type(&self) -> Option<GeometryType> {
        self.geometry.as_ref()?.geometry_type()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "collection_tag")]
    pub kind: String,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn vertices(&self) -> impl Iterator<Item = LngLat> + '_ {
        self.features
            .iter()
            .filter_map(|feature| feature.geometry.as_ref())
            .flat_map(Geometry::vertices)
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::enclosing(self.vertices())
    }
}
