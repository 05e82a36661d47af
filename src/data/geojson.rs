use crate::core::geo::{LngLat, LngLatBounds};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A GeoJSON position. Extra ordinates (altitude) are kept but ignored by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Position {
    pub lng: f64,
    pub lat: f64,
    pub alt: Option<f64>,
}

impl Position {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat, alt: None }
    }
}

impl TryFrom<Vec<f64>> for Position {
    type Error = String;

    fn try_from(value: Vec<f64>) -> std::result::Result<Self, Self::Error> {
        match value.as_slice() {
            [lng, lat] => Ok(Self::new(*lng, *lat)),
            [lng, lat, alt, ..] => Ok(Self {
                lng: *lng,
                lat: *lat,
                alt: Some(*alt),
            }),
            _ => Err(format!("position needs at least 2 numbers, got {}", value.len())),
        }
    }
}

impl From<Position> for Vec<f64> {
    fn from(value: Position) -> Self {
        match value.alt {
            Some(alt) => vec![value.lng, value.lat, alt],
            None => vec![value.lng, value.lat],
        }
    }
}

impl From<Position> for LngLat {
    fn from(value: Position) -> Self {
        LngLat::new(value.lng, value.lat)
    }
}

/// GeoJSON geometry types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        coordinates: Position,
    },
    LineString {
        coordinates: Vec<Position>,
    },
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPoint {
        coordinates: Vec<Position>,
    },
    MultiLineString {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    GeometryCollection {
        geometries: Vec<Geometry>,
    },
}

impl Geometry {
    pub fn point(lng: f64, lat: f64) -> Self {
        Geometry::Point {
            coordinates: Position::new(lng, lat),
        }
    }

    /// Name of the geometry type as written in the `type` member
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::LineString { .. } => "LineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
            Geometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }

    /// All positions of the geometry, rings included
    pub fn positions(&self) -> Vec<Position> {
        match self {
            Geometry::Point { coordinates } => vec![*coordinates],
            Geometry::LineString { coordinates } | Geometry::MultiPoint { coordinates } => {
                coordinates.clone()
            }
            Geometry::Polygon { coordinates } | Geometry::MultiLineString { coordinates } => {
                coordinates.iter().flatten().copied().collect()
            }
            Geometry::MultiPolygon { coordinates } => {
                coordinates.iter().flatten().flatten().copied().collect()
            }
            Geometry::GeometryCollection { geometries } => {
                geometries.iter().flat_map(|g| g.positions()).collect()
            }
        }
    }

    /// Gets the bounding box of the geometry
    pub fn bounds(&self) -> Option<LngLatBounds> {
        let positions = self.positions();
        let first: LngLat = (*positions.first()?).into();
        let mut bounds = LngLatBounds::new(first, first);
        for position in positions.iter().skip(1) {
            bounds.extend(&(*position).into());
        }
        Some(bounds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FeatureTag {
    #[default]
    Feature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FeatureCollectionTag {
    #[default]
    FeatureCollection,
}

/// GeoJSON feature with geometry and properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Feature {
    #[serde(rename = "type", default)]
    pub tag: FeatureTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry: Some(geometry),
            properties: Some(Map::new()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }

    /// Properties, or an empty map when the feature has none
    pub fn properties_or_empty(&self) -> Map<String, Value> {
        self.properties.clone().unwrap_or_default()
    }

    /// Feature id, falling back to a promoted `id` property
    pub fn effective_id(&self) -> Option<Value> {
        self.id.clone().or_else(|| {
            self.properties
                .as_ref()
                .and_then(|p| p.get("id"))
                .filter(|v| v.is_string() || v.is_number())
                .cloned()
        })
    }
}

/// GeoJSON feature collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FeatureCollection {
    #[serde(rename = "type", default)]
    pub tag: FeatureCollectionTag,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            tag: FeatureCollectionTag::FeatureCollection,
            features,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Serialized form sent to the host
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"type\":\"FeatureCollection\",\"features\":[]}".to_string())
    }

    /// Gets the bounding box of all features
    pub fn bounds(&self) -> Option<LngLatBounds> {
        let mut bounds: Option<LngLatBounds> = None;
        for geometry in self.features.iter().filter_map(|f| f.geometry.as_ref()) {
            if let Some(geom_bounds) = geometry.bounds() {
                match bounds.as_mut() {
                    Some(b) => {
                        b.extend(&geom_bounds.south_west);
                        b.extend(&geom_bounds.north_east);
                    }
                    None => bounds = Some(geom_bounds),
                }
            }
        }
        bounds
    }
}

/// Root GeoJSON object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeoJson {
    Feature(Feature),
    FeatureCollection(FeatureCollection),
    Geometry(Geometry),
}

impl GeoJson {
    /// Creates GeoJSON from a raw JSON value
    pub fn from_value(value: Value) -> crate::Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| crate::Error::ParseError(format!("Invalid GeoJSON: {}", e)))
    }

    /// Creates GeoJSON from raw JSON text
    pub fn from_str(geojson_str: &str) -> crate::Result<Self> {
        serde_json::from_str(geojson_str)
            .map_err(|e| crate::Error::ParseError(format!("Invalid GeoJSON: {}", e)))
    }

    /// Normalizes any GeoJSON object into a feature collection
    pub fn into_collection(self) -> FeatureCollection {
        match self {
            GeoJson::Feature(feature) => FeatureCollection::new(vec![feature]),
            GeoJson::FeatureCollection(collection) => collection,
            GeoJson::Geometry(geometry) => FeatureCollection::new(vec![Feature::new(geometry)]),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<FeatureCollection> for GeoJson {
    fn from(value: FeatureCollection) -> Self {
        GeoJson::FeatureCollection(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_geojson_parsing() {
        let geojson_str = r#"
        {
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "id": 3,
                    "properties": {"name": "Test Point"},
                    "geometry": {
                        "type": "Point",
                        "coordinates": [-74.0060, 40.7128, 12.0]
                    }
                }
            ]
        }
        "#;

        let collection = GeoJson::from_str(geojson_str).unwrap().into_collection();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.features[0].id, Some(json!(3)));
        match &collection.features[0].geometry {
            Some(Geometry::Point { coordinates }) => assert_eq!(coordinates.alt, Some(12.0)),
            other => panic!("unexpected geometry {:?}", other),
        }
    }

    #[test]
    fn test_bare_geometry_becomes_feature() {
        let geojson = GeoJson::from_value(json!({"type": "Point", "coordinates": [1.0, 2.0]})).unwrap();
        assert!(matches!(geojson, GeoJson::Geometry(_)));
        let collection = geojson.into_collection();
        assert_eq!(collection.features[0].geometry, Some(Geometry::point(1.0, 2.0)));
    }

    #[test]
    fn test_features_serialize_with_type() {
        let collection = FeatureCollection::new(vec![Feature::new(Geometry::point(0.0, 0.0))]);
        let value = serde_json::to_value(&collection).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["features"][0]["type"], "Feature");
    }

    #[test]
    fn test_bounds_calculation() {
        let collection = FeatureCollection::new(vec![
            Feature::new(Geometry::point(-74.0060, 40.7128)),
            Feature::new(Geometry::point(-73.9857, 40.7489)),
        ]);

        let bounds = collection.bounds().unwrap();
        assert_eq!(bounds.south_west.lat, 40.7128);
        assert_eq!(bounds.north_east.lat, 40.7489);
    }

    #[test]
    fn test_effective_id_uses_property() {
        let feature = Feature::new(Geometry::point(0.0, 0.0)).with_property("id", 9);
        assert_eq!(feature.effective_id(), Some(json!(9)));
        let bare = Feature::new(Geometry::point(0.0, 0.0));
        assert_eq!(bare.effective_id(), None);
    }
}
