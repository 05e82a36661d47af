//! Rendered-feature queries.
//!
//! Queries answer from what the engine has rendered at the moment they run. A
//! filter or style change issued just before a query may not be reflected yet;
//! only features inside the current viewport are ever returned.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    core::{config::QueryConfig, geo::ScreenPoint},
    data::geojson::{Feature, FeatureCollection},
    engine::{id_key, MapEngine, QueryRegion, RenderedFeature},
    prelude::HashSet,
};

/// Screen-space query geometry: a pixel or a `[[x1, y1], [x2, y2]]` box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryGeometry {
    Point(ScreenPoint),
    Box([ScreenPoint; 2]),
}

impl QueryGeometry {
    /// Engine region; points widen to a box of `tolerance` pixels on each side
    pub fn to_region(&self, tolerance: f64) -> QueryRegion {
        match *self {
            QueryGeometry::Point(p) if tolerance > 0.0 => QueryRegion::Box([
                ScreenPoint::new(p.x - tolerance, p.y - tolerance),
                ScreenPoint::new(p.x + tolerance, p.y + tolerance),
            ]),
            QueryGeometry::Point(p) => QueryRegion::Point(p),
            QueryGeometry::Box(corners) => QueryRegion::Box(corners),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueryRequest {
    /// Whole viewport when omitted
    #[serde(default)]
    pub geometry: Option<QueryGeometry>,
    #[serde(default, alias = "layers")]
    pub layer_ids: Option<Vec<String>>,
    #[serde(default)]
    pub filter: Option<Value>,
    /// Overrides [`QueryConfig::group_by_layer`]
    #[serde(default)]
    pub group_by_layer: Option<bool>,
}

impl QueryRequest {
    pub fn viewport() -> Self {
        Self::default()
    }

    pub fn at(point: ScreenPoint) -> Self {
        Self {
            geometry: Some(QueryGeometry::Point(point)),
            ..Default::default()
        }
    }

    pub fn with_layers(mut self, layers: &[&str]) -> Self {
        self.layer_ids = Some(layers.iter().map(|l| l.to_string()).collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Flat(FeatureCollection),
    /// Per-layer collections, in the order layers first appear in the results
    ByLayer(Vec<(String, FeatureCollection)>),
}

impl QueryResult {
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Flat(collection) => collection.len(),
            QueryResult::ByLayer(groups) => groups.iter().map(|(_, c)| c.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_value(&self) -> Value {
        match self {
            QueryResult::Flat(collection) => serde_json::to_value(collection).unwrap_or(Value::Null),
            QueryResult::ByLayer(groups) => {
                let mut layers = Map::new();
                for (layer, collection) in groups {
                    layers.insert(
                        layer.clone(),
                        serde_json::to_value(collection).unwrap_or(Value::Null),
                    );
                }
                Value::Object(layers)
            }
        }
    }

    /// Serialized result, as reported under `queried_features`
    pub fn host_value(&self) -> Value {
        Value::String(self.to_value().to_string())
    }
}

/// Identity used for deduplication: the feature id when there is one, else
/// layer, properties and geometry together
pub fn dedupe_key(feature: &RenderedFeature) -> String {
    match feature.feature.id.as_ref() {
        Some(id) => format!("id:{}", id_key(id)),
        None => format!(
            "{}|{}|{}",
            feature.layer,
            serde_json::to_string(&feature.feature.properties).unwrap_or_default(),
            serde_json::to_string(&feature.feature.geometry).unwrap_or_default(),
        ),
    }
}

/// Keeps the first occurrence of each feature
pub fn dedupe(features: Vec<RenderedFeature>) -> Vec<RenderedFeature> {
    let mut seen = HashSet::default();
    features
        .into_iter()
        .filter(|f| seen.insert(dedupe_key(f)))
        .collect()
}

fn output_feature(rendered: &RenderedFeature) -> Feature {
    let mut feature = rendered.feature.clone();
    let properties = feature.properties.get_or_insert_with(Map::new);
    properties
        .entry("layer_id")
        .or_insert_with(|| Value::String(rendered.layer.clone()));
    properties
        .entry("source_id")
        .or_insert_with(|| Value::String(rendered.source.clone()));
    feature
}

/// Runs a query against what is currently rendered.
///
/// Layer ids that do not exist on the map are dropped; if none remain the result is empty.
pub fn query(engine: &dyn MapEngine, config: &QueryConfig, request: &QueryRequest) -> QueryResult {
    let group = request.group_by_layer.unwrap_or(config.group_by_layer);
    let empty = || {
        if group {
            QueryResult::ByLayer(Vec::new())
        } else {
            QueryResult::Flat(FeatureCollection::new(Vec::new()))
        }
    };

    let layers: Option<Vec<String>> = request.layer_ids.as_ref().map(|ids| {
        let existing = engine.layer_ids();
        ids.iter()
            .filter(|id| {
                let present = existing.contains(id);
                if !present {
                    log::debug!("query skips missing layer '{}'", id);
                }
                present
            })
            .cloned()
            .collect()
    });
    if layers.as_ref().is_some_and(|l| l.is_empty()) {
        return empty();
    }

    let region = request
        .geometry
        .map(|g| g.to_region(config.point_tolerance_px));
    let rendered = dedupe(engine.query_rendered_features(
        region.as_ref(),
        layers.as_deref(),
        request.filter.as_ref(),
    ));

    if !group {
        return QueryResult::Flat(FeatureCollection::new(rendered.iter().map(output_feature).collect()));
    }
    let mut groups: Vec<(String, Vec<Feature>)> = Vec::new();
    for feature in &rendered {
        match groups.iter_mut().find(|(layer, _)| *layer == feature.layer) {
            Some((_, features)) => features.push(output_feature(feature)),
            None => groups.push((feature.layer.clone(), vec![output_feature(feature)])),
        }
    }
    QueryResult::ByLayer(
        groups
            .into_iter()
            .map(|(layer, features)| (layer, FeatureCollection::new(features)))
            .collect(),
    )
}
