//! Geometry operations requested by the host (`turf` messages).
//!
//! A request names one operation and exactly one input. Results are written to
//! an output GeoJSON source and/or reported to the host.

use geo_types::{Coord, Geometry as GeoGeometry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    data::{
        conversion::{collection_coords, collection_geometries, collection_polygons, feature_from, simplify_multi},
        geojson::{Feature, FeatureCollection, GeoJson, Geometry},
    },
    engine::{MapEngine, SourceSpec},
    input::events::now_millis,
    plugins::geometry,
    MapError, Result,
};

pub use crate::plugins::geometry::Units;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurfOperation {
    Buffer,
    Union,
    Intersect,
    Difference,
    #[serde(alias = "convex")]
    ConvexHull,
    #[serde(alias = "concave")]
    ConcaveHull,
    Voronoi,
    Distance,
    Area,
    Centroid,
}

impl TurfOperation {
    pub fn name(&self) -> &'static str {
        match self {
            TurfOperation::Buffer => "buffer",
            TurfOperation::Union => "union",
            TurfOperation::Intersect => "intersect",
            TurfOperation::Difference => "difference",
            TurfOperation::ConvexHull => "convex_hull",
            TurfOperation::ConcaveHull => "concave_hull",
            TurfOperation::Voronoi => "voronoi",
            TurfOperation::Distance => "distance",
            TurfOperation::Area => "area",
            TurfOperation::Centroid => "centroid",
        }
    }

    /// Operations that take a second input
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            TurfOperation::Intersect | TurfOperation::Difference | TurfOperation::Distance
        )
    }
}

/// Why a request's input could not be resolved
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InputError {
    #[error("no input given for {0}; expected one of coordinates, data, input_source_id, layer_id")]
    Missing(&'static str),

    #[error("more than one input given for {slot}: {given:?}")]
    Ambiguous {
        slot: &'static str,
        given: Vec<&'static str>,
    },

    #[error("source '{0}' does not exist")]
    UnknownSource(String),

    #[error("layer '{0}' does not exist")]
    UnknownLayer(String),

    #[error("source '{0}' has no inline GeoJSON data")]
    NoData(String),

    #[error("invalid coordinates: {0}")]
    Coordinates(String),

    #[error("invalid GeoJSON: {0}")]
    GeoJson(String),
}

/// Where an operation reads its features from
#[derive(Debug, Clone, PartialEq)]
pub enum TurfInput {
    Coordinates(Value),
    GeoJson(Value),
    Source(String),
    Layer(String),
}

impl TurfInput {
    fn pick(
        slot: &'static str,
        coordinates: &Option<Value>,
        data: &Option<Value>,
        source: &Option<String>,
        layer: &Option<String>,
    ) -> std::result::Result<Option<TurfInput>, InputError> {
        let mut given = Vec::new();
        let mut input = None;
        if let Some(c) = coordinates {
            given.push("coordinates");
            input = Some(TurfInput::Coordinates(c.clone()));
        }
        if let Some(d) = data {
            given.push("data");
            input = Some(TurfInput::GeoJson(d.clone()));
        }
        if let Some(s) = source {
            given.push("input_source_id");
            input = Some(TurfInput::Source(s.clone()));
        }
        if let Some(l) = layer {
            given.push("layer_id");
            input = Some(TurfInput::Layer(l.clone()));
        }
        if given.len() > 1 {
            return Err(InputError::Ambiguous { slot, given });
        }
        Ok(input)
    }

    /// Loads the input as a feature collection
    pub fn resolve(&self, engine: &dyn MapEngine) -> std::result::Result<FeatureCollection, InputError> {
        match self {
            TurfInput::Coordinates(value) => coordinates_collection(value),
            TurfInput::GeoJson(value) => GeoJson::from_value(value.clone())
                .map(GeoJson::into_collection)
                .map_err(|e| InputError::GeoJson(e.to_string())),
            TurfInput::Source(id) => source_collection(engine, id),
            TurfInput::Layer(id) => {
                let layer = engine
                    .layer(id)
                    .ok_or_else(|| InputError::UnknownLayer(id.clone()))?;
                let source = layer
                    .source
                    .ok_or_else(|| InputError::NoData(id.clone()))?;
                source_collection(engine, &source)
            }
        }
    }
}

fn source_collection(engine: &dyn MapEngine, id: &str) -> std::result::Result<FeatureCollection, InputError> {
    let source = engine
        .source(id)
        .ok_or_else(|| InputError::UnknownSource(id.to_string()))?;
    source
        .geojson_data()
        .map(GeoJson::into_collection)
        .ok_or_else(|| InputError::NoData(id.to_string()))
}

fn pair(value: &Value) -> Option<(f64, f64)> {
    let items = value.as_array()?;
    match items.as_slice() {
        [lng, lat, ..] => Some((lng.as_f64()?, lat.as_f64()?)),
        _ => None,
    }
}

/// `[lng, lat]` becomes one point; `[[lng, lat], ...]` one point per pair
fn coordinates_collection(value: &Value) -> std::result::Result<FeatureCollection, InputError> {
    if let Some((lng, lat)) = pair(value) {
        return Ok(FeatureCollection::new(vec![Feature::new(Geometry::point(lng, lat))]));
    }
    let items = value
        .as_array()
        .ok_or_else(|| InputError::Coordinates(value.to_string()))?;
    items
        .iter()
        .map(|item| {
            pair(item)
                .map(|(lng, lat)| Feature::new(Geometry::point(lng, lat)))
                .ok_or_else(|| InputError::Coordinates(item.to_string()))
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(FeatureCollection::new)
}

/// A `turf` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurfRequest {
    pub operation: TurfOperation,
    #[serde(default)]
    pub coordinates: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub input_source_id: Option<String>,
    #[serde(default)]
    pub layer_id: Option<String>,
    #[serde(default)]
    pub coordinates_2: Option<Value>,
    #[serde(default)]
    pub data_2: Option<Value>,
    #[serde(default)]
    pub input_source_id_2: Option<String>,
    #[serde(default)]
    pub layer_id_2: Option<String>,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub units: Units,
    #[serde(default)]
    pub max_edge: Option<f64>,
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
    /// Output GeoJSON source, created or updated
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default, alias = "send_to_host")]
    pub send_to_shiny: bool,
    /// Properties attached to single-feature results
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

impl TurfRequest {
    pub fn new(operation: TurfOperation) -> Self {
        Self {
            operation,
            coordinates: None,
            data: None,
            input_source_id: None,
            layer_id: None,
            coordinates_2: None,
            data_2: None,
            input_source_id_2: None,
            layer_id_2: None,
            radius: None,
            units: Units::default(),
            max_edge: None,
            bbox: None,
            source_id: None,
            send_to_shiny: false,
            properties: None,
        }
    }

    pub fn with_coordinates(mut self, coordinates: Value) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_output(mut self, source_id: &str) -> Self {
        self.source_id = Some(source_id.to_string());
        self
    }

    /// The primary input; exactly one must be given
    pub fn input(&self) -> std::result::Result<TurfInput, InputError> {
        TurfInput::pick(
            "input",
            &self.coordinates,
            &self.data,
            &self.input_source_id,
            &self.layer_id,
        )?
        .ok_or(InputError::Missing("input"))
    }

    /// The second input of binary operations
    pub fn second_input(&self) -> std::result::Result<TurfInput, InputError> {
        TurfInput::pick(
            "second input",
            &self.coordinates_2,
            &self.data_2,
            &self.input_source_id_2,
            &self.layer_id_2,
        )?
        .ok_or(InputError::Missing("second input"))
    }

    /// Results go to the host when asked, or when there is nowhere else to put them
    pub fn reports_to_host(&self) -> bool {
        self.send_to_shiny || self.source_id.is_none()
    }

    fn single(&self, geometry: Geometry) -> FeatureCollection {
        FeatureCollection::new(vec![feature_from(
            geometry,
            self.properties.clone().unwrap_or_default(),
        )])
    }
}

/// Result of an operation: GeoJSON for geometric results, a number for measurements
#[derive(Debug, Clone, PartialEq)]
pub enum TurfValue {
    Features(FeatureCollection),
    Number(f64),
}

impl TurfValue {
    pub fn to_value(&self) -> Value {
        match self {
            TurfValue::Features(collection) => serde_json::to_value(collection).unwrap_or(Value::Null),
            TurfValue::Number(n) => json!(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurfOutcome {
    pub operation: TurfOperation,
    pub value: TurfValue,
    pub metadata: Map<String, Value>,
}

impl TurfOutcome {
    fn new(operation: TurfOperation, value: TurfValue) -> Self {
        Self {
            operation,
            value,
            metadata: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// `{operation, result, metadata, timestamp}`
    pub fn host_value(&self) -> Value {
        json!({
            "operation": self.operation.name(),
            "result": self.value.to_value(),
            "metadata": self.metadata,
            "timestamp": now_millis(),
        })
    }
}

/// `{operation, error, timestamp}`
pub fn error_value(operation: TurfOperation, error: &MapError) -> Value {
    json!({
        "operation": operation.name(),
        "error": error.to_string(),
        "timestamp": now_millis(),
    })
}

fn first_coord(collection: &FeatureCollection, which: &str) -> Result<Coord<f64>> {
    collection_coords(collection)
        .first()
        .copied()
        .ok_or_else(|| MapError::Geometry(format!("{} has no coordinates", which)))
}

fn hull_points(collection: &FeatureCollection) -> Vec<Coord<f64>> {
    collection_geometries(collection)
        .iter()
        .flat_map(geometry::vertices)
        .collect()
}

/// Runs the operation, without writing or reporting the result
pub fn execute(engine: &dyn MapEngine, request: &TurfRequest) -> Result<TurfOutcome> {
    let operation = request.operation;
    let input = request.input()?.resolve(engine)?;
    let second = if operation.is_binary() {
        Some(request.second_input()?.resolve(engine)?)
    } else {
        None
    };

    let outcome = match operation {
        TurfOperation::Buffer => {
            let radius = request
                .radius
                .ok_or_else(|| MapError::Geometry("buffer needs a radius".to_string()))?;
            let meters = request.units.to_meters(radius);
            let mut features = Vec::new();
            for feature in &input.features {
                let Some(geometry) = feature.geometry.as_ref() else {
                    continue;
                };
                let buffered = geometry::buffer(&GeoGeometry::from(geometry), meters)?;
                features.push(feature_from(simplify_multi(buffered), feature.properties_or_empty()));
            }
            TurfOutcome::new(operation, TurfValue::Features(FeatureCollection::new(features)))
                .with("radius", json!(radius))
                .with("units", json!(request.units.name()))
        }
        TurfOperation::Union => {
            let polygons = collection_polygons(&input);
            let count = polygons.len();
            let merged = geometry::union(polygons)?;
            TurfOutcome::new(operation, TurfValue::Features(request.single(simplify_multi(merged))))
                .with("input_count", json!(count))
        }
        TurfOperation::Intersect | TurfOperation::Difference => {
            let a = collection_polygons(&input);
            let b = second.as_ref().map(collection_polygons).unwrap_or_default();
            if a.is_empty() {
                return Err(MapError::Geometry(format!("{} needs polygon input", operation.name())));
            }
            let result = if operation == TurfOperation::Intersect {
                geometry::intersect(a, b)
            } else {
                geometry::difference(a, b)
            };
            let empty = result.is_none();
            let collection = match result {
                Some(multi) => request.single(simplify_multi(multi)),
                None => FeatureCollection::new(Vec::new()),
            };
            TurfOutcome::new(operation, TurfValue::Features(collection)).with("empty", json!(empty))
        }
        TurfOperation::ConvexHull => {
            let hull = geometry::convex_hull(&hull_points(&input))?;
            TurfOutcome::new(operation, TurfValue::Features(request.single(Geometry::from(hull))))
        }
        TurfOperation::ConcaveHull => {
            let max_edge = request.max_edge.map(|e| request.units.to_meters(e));
            let hull = geometry::concave_hull(&hull_points(&input), max_edge)?;
            TurfOutcome::new(
                operation,
                TurfValue::Features(request.single(simplify_multi(hull.geometry))),
            )
            .with("max_edge", json!(request.units.from_meters(hull.max_edge_meters)))
            .with("units", json!(request.units.name()))
            .with("fallback", json!(hull.fell_back_to_convex.then_some("convex_hull")))
        }
        TurfOperation::Voronoi => {
            let sites: Vec<(Coord<f64>, Map<String, Value>)> = input
                .features
                .iter()
                .filter_map(|f| match f.geometry.as_ref()? {
                    Geometry::Point { coordinates } => Some((
                        Coord {
                            x: coordinates.lng,
                            y: coordinates.lat,
                        },
                        f.properties_or_empty(),
                    )),
                    _ => None,
                })
                .collect();
            if sites.is_empty() {
                return Err(MapError::Geometry("voronoi needs point input".to_string()));
            }
            let bbox = request.bbox.unwrap_or(geometry::VORONOI_BBOX);
            let coords: Vec<Coord<f64>> = sites.iter().map(|(c, _)| *c).collect();
            let cells = geometry::voronoi(&coords, bbox)?
                .into_iter()
                .map(|(i, cell)| feature_from(Geometry::from(cell), sites[i].1.clone()))
                .collect();
            TurfOutcome::new(operation, TurfValue::Features(FeatureCollection::new(cells)))
                .with("bbox", json!(bbox))
        }
        TurfOperation::Distance => {
            let from = first_coord(&input, "input")?;
            let to = match second.as_ref() {
                Some(collection) => first_coord(collection, "second input")?,
                None => return Err(InputError::Missing("second input").into()),
            };
            let meters = geometry::distance(from, to);
            TurfOutcome::new(operation, TurfValue::Number(request.units.from_meters(meters)))
                .with("units", json!(request.units.name()))
        }
        TurfOperation::Area => {
            let square_meters: f64 = collection_geometries(&input).iter().map(geometry::area).sum();
            TurfOutcome::new(operation, TurfValue::Number(square_meters))
                .with("units", json!("square_meters"))
        }
        TurfOperation::Centroid => {
            let collection = GeoGeometry::GeometryCollection(geo_types::GeometryCollection::new_from(
                collection_geometries(&input),
            ));
            let center = geometry::centroid(&collection)
                .ok_or_else(|| MapError::Geometry("centroid of an empty input".to_string()))?;
            TurfOutcome::new(
                operation,
                TurfValue::Features(request.single(Geometry::point(center.x, center.y))),
            )
        }
    };
    Ok(outcome)
}

/// Writes a geometric result to a GeoJSON source, creating it when missing.
/// Returns false for results that are not GeoJSON.
pub fn write_output(engine: &mut dyn MapEngine, source_id: &str, outcome: &TurfOutcome) -> Result<bool> {
    let TurfValue::Features(_) = &outcome.value else {
        log::warn!(
            "{} result is a measurement, not written to source '{}'",
            outcome.operation.name(),
            source_id
        );
        return Ok(false);
    };
    let data = outcome.value.to_value();
    if engine.source(source_id).is_some() {
        engine.set_source_data(source_id, &data)?;
    } else {
        engine.add_source(source_id, &SourceSpec::geojson(data))?;
    }
    Ok(true)
}
