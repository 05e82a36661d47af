//! Headless engine that keeps the whole map in memory.
//!
//! `MemoryEngine` honours the same contract as the browser engines: the event
//! API is additive, style loads complete asynchronously (on the next
//! [`poll_events`](MapEngine::poll_events) when `auto_load` is on, or when the
//! caller runs [`MemoryEngine::finish_style_load`]), a style replacement drops
//! every source, layer, image and feature state, and rendered-feature queries
//! only see what is inside the viewport.
//!
//! Pointer input is simulated with [`MemoryEngine::pointer_move`],
//! [`MemoryEngine::pointer_out`] and [`MemoryEngine::click`].

use std::collections::VecDeque;

use geo::Contains;
use geo_types::{Geometry as GeoGeometry, Point};
use serde_json::{Map, Value};

use super::{
    id_key, CameraMove, ControlId, DrawAction, Effect, EngineError, EngineEvent, EngineResult,
    FeatureTarget, ImageData, InteractionKind, LayerSpec, ListenerId, MapEngine, MapOptions,
    MarkerId, Plugin, PopupId, QueryRegion, RenderedFeature, SourceSpec, StyleRequest,
};
use crate::{
    core::geo::{Camera, LngLat, LngLatBounds, ScreenPoint},
    data::{
        expression::{evaluate, filter_passes, EvalContext},
        geojson::{Feature, Geometry, Position},
    },
    layers::marker::MarkerSpec,
    plugins::draw::DrawOptions,
    prelude::{HashMap, HashSet},
    spatial::index::{SpatialIndex, SpatialItem},
    ui::{
        controls::{ControlKind, ControlSpec},
        popup::{PopupRole, PopupSpec},
    },
};

/// Sources and layers defined by a style document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleDocument {
    pub sources: Vec<(String, SourceSpec)>,
    pub layers: Vec<LayerSpec>,
}

impl StyleDocument {
    /// A vector basemap with a `composite` source, as hosted Mapbox styles have
    pub fn basemap() -> Self {
        let mut composite = SourceSpec {
            kind: "vector".to_string(),
            options: Map::new(),
        };
        composite
            .options
            .insert("url".to_string(), Value::String("mapbox://mapbox.mapbox-streets-v8".to_string()));

        let mut water = LayerSpec::new("water", "fill", Some("composite"));
        water.source_layer = Some("water".to_string());

        Self {
            sources: vec![("composite".to_string(), composite)],
            layers: vec![LayerSpec::new("background", "background", None), water],
        }
    }

    /// Reads `sources` and `layers` from an inline style document
    pub fn from_value(style: &Value) -> Self {
        let sources = style
            .get("sources")
            .and_then(Value::as_object)
            .map(|sources| {
                sources
                    .iter()
                    .filter_map(|(id, spec)| {
                        serde_json::from_value::<SourceSpec>(spec.clone())
                            .ok()
                            .map(|spec| (id.clone(), spec))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let layers = style
            .get("layers")
            .and_then(Value::as_array)
            .map(|layers| {
                layers
                    .iter()
                    .filter_map(|l| serde_json::from_value::<LayerSpec>(l.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        Self { sources, layers }
    }
}

fn layer_fits_source(layer_kind: &str, source_kind: &str) -> bool {
    match source_kind {
        "raster" | "image" | "video" => layer_kind == "raster",
        "raster-dem" => matches!(layer_kind, "hillshade" | "color-relief"),
        _ => !matches!(layer_kind, "raster" | "hillshade" | "color-relief"),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Listener {
    StyleLoad,
    Pointer {
        kind: InteractionKind,
        layer: Option<String>,
    },
    Image {
        url: String,
    },
}

/// In-memory [`MapEngine`]
pub struct MemoryEngine {
    size: ScreenPoint,
    available: bool,
    plugins: HashSet<Plugin>,
    auto_load: bool,
    catalog: HashMap<String, StyleDocument>,
    created: bool,
    style: Value,
    style_sources: Vec<String>,
    style_loaded: bool,
    load_pending: bool,
    sources: Vec<(String, SourceSpec)>,
    layers: Vec<LayerSpec>,
    feature_state: HashMap<FeatureTarget, Map<String, Value>>,
    listeners: Vec<(ListenerId, Listener)>,
    next_handle: u64,
    events: VecDeque<EngineEvent>,
    camera: Camera,
    effects: HashMap<Effect, Value>,
    config: HashMap<(String, String), Value>,
    controls: Vec<(ControlId, ControlSpec)>,
    draw_control: Option<ControlId>,
    drawn: Vec<Feature>,
    markers: Vec<(MarkerId, MarkerSpec)>,
    popups: Vec<(PopupId, PopupSpec)>,
    legends: Vec<(String, String, Option<String>)>,
    images: HashSet<String>,
    broken_images: HashSet<String>,
    hovered: Vec<String>,
    hit_tolerance_px: f64,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// An 800x600 engine with every plugin available and style loads completing on the next poll
    pub fn new() -> Self {
        Self {
            size: ScreenPoint::new(800.0, 600.0),
            available: true,
            plugins: [Plugin::Draw, Plugin::Geocoder].into_iter().collect(),
            auto_load: true,
            catalog: HashMap::default(),
            created: false,
            style: Value::Null,
            style_sources: Vec::new(),
            style_loaded: false,
            load_pending: false,
            sources: Vec::new(),
            layers: Vec::new(),
            feature_state: HashMap::default(),
            listeners: Vec::new(),
            next_handle: 1,
            events: VecDeque::new(),
            camera: Camera::default(),
            effects: HashMap::default(),
            config: HashMap::default(),
            controls: Vec::new(),
            draw_control: None,
            drawn: Vec::new(),
            markers: Vec::new(),
            popups: Vec::new(),
            legends: Vec::new(),
            images: HashSet::default(),
            broken_images: HashSet::default(),
            hovered: Vec::new(),
            hit_tolerance_px: 3.0,
        }
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.size = ScreenPoint::new(width, height);
        self
    }

    /// Style loads wait for [`MemoryEngine::finish_style_load`] instead of completing on poll
    pub fn with_manual_style_load(mut self) -> Self {
        self.auto_load = false;
        self
    }

    pub fn without_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.remove(&plugin);
        self
    }

    /// Simulates a page where the GL library failed to load
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Registers a named style (what a style URL resolves to)
    pub fn with_style(mut self, name: &str, document: StyleDocument) -> Self {
        self.catalog.insert(name.to_string(), document);
        self
    }

    /// Image URLs that fail to load
    pub fn with_broken_image(mut self, url: &str) -> Self {
        self.broken_images.insert(url.to_string());
        self
    }

    /// A created map whose `style` has finished loading
    pub fn loaded(style: &str) -> EngineResult<Self> {
        let mut engine = Self::new();
        engine.create_map(&MapOptions::new(
            Value::String(style.to_string()),
            Camera {
                center: LngLat::new(0.0, 0.0),
                zoom: 4.0,
                ..Default::default()
            },
        ))?;
        engine.finish_style_load();
        Ok(engine)
    }

    pub fn size(&self) -> ScreenPoint {
        self.size
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    fn apply_style(&mut self, style: &Value) {
        let document = match style {
            Value::String(name) => self
                .catalog
                .get(name)
                .cloned()
                .unwrap_or_else(StyleDocument::basemap),
            Value::Object(_) => StyleDocument::from_value(style),
            _ => StyleDocument::default(),
        };
        self.style = style.clone();
        self.style_sources = document.sources.iter().map(|(id, _)| id.clone()).collect();
        self.sources = document.sources;
        self.layers = document.layers;
        self.feature_state.clear();
        self.images.clear();
        self.hovered.clear();
        self.style_loaded = false;
        self.load_pending = true;
    }

    /// Completes a pending style load and fires the one-shot style listeners
    pub fn finish_style_load(&mut self) {
        if !self.load_pending {
            return;
        }
        self.load_pending = false;
        self.style_loaded = true;
        let fired: Vec<ListenerId> = self
            .listeners
            .iter()
            .filter(|(_, l)| *l == Listener::StyleLoad)
            .map(|(id, _)| *id)
            .collect();
        self.listeners.retain(|(_, l)| *l != Listener::StyleLoad);
        for listener in fired {
            self.events.push_back(EngineEvent::StyleLoaded { listener });
        }
    }

    fn require_loaded(&self) -> EngineResult<()> {
        if self.style_loaded {
            Ok(())
        } else {
            Err(EngineError::StyleNotLoaded)
        }
    }

    fn layer_index(&self, id: &str) -> EngineResult<usize> {
        self.layers
            .iter()
            .position(|l| l.id == id)
            .ok_or_else(|| EngineError::MissingLayer(id.to_string()))
    }

    fn layer_mut(&mut self, id: &str) -> EngineResult<&mut LayerSpec> {
        let index = self.layer_index(id)?;
        Ok(&mut self.layers[index])
    }

    fn source_spec(&self, id: &str) -> Option<&SourceSpec> {
        self.sources.iter().find(|(s, _)| s == id).map(|(_, spec)| spec)
    }

    // --- rendering model ---------------------------------------------------------------------

    fn feature_id(feature: &Feature, spec: &SourceSpec) -> Option<Value> {
        match spec.promote_id() {
            Some(key) => feature
                .properties
                .as_ref()
                .and_then(|p| p.get(key))
                .cloned()
                .or_else(|| feature.id.clone()),
            None => feature.id.clone(),
        }
    }

    /// Every feature a layer currently renders, ignoring the viewport
    fn layer_features(&self, layer: &LayerSpec) -> Vec<RenderedFeature> {
        if !layer.is_visible()
            || layer.minzoom.is_some_and(|z| self.camera.zoom < z)
            || layer.maxzoom.is_some_and(|z| self.camera.zoom >= z)
        {
            return Vec::new();
        }
        let Some(source_id) = layer.source.as_deref() else {
            return Vec::new();
        };
        let Some(spec) = self.source_spec(source_id) else {
            return Vec::new();
        };
        let Some(data) = spec.geojson_data() else {
            return Vec::new();
        };

        let empty = Map::new();
        let mut rendered = Vec::new();
        for mut feature in data.into_collection().features {
            if feature.geometry.is_none() {
                continue;
            }
            feature.id = Self::feature_id(&feature, spec);
            let properties = feature.properties_or_empty();
            let target = feature.id.as_ref().map(|id| FeatureTarget {
                source: source_id.to_string(),
                source_layer: layer.source_layer.clone(),
                id: id_key(id),
            });
            let state = target
                .as_ref()
                .and_then(|t| self.feature_state.get(t))
                .unwrap_or(&empty);
            let mut ctx = EvalContext::new(&properties)
                .with_state(state)
                .with_id(feature.id.as_ref());
            ctx.zoom = Some(self.camera.zoom);
            if !filter_passes(layer.filter.as_ref(), &ctx) {
                continue;
            }
            rendered.push(RenderedFeature {
                layer: layer.id.clone(),
                source: source_id.to_string(),
                source_layer: layer.source_layer.clone(),
                feature,
            });
        }
        rendered
    }

    /// Rendered features of the given layers (all when `None`), top-most layer first
    fn rendered(&self, layers: Option<&[String]>) -> Vec<RenderedFeature> {
        self.layers
            .iter()
            .rev()
            .filter(|l| layers.map_or(true, |ids| ids.iter().any(|id| *id == l.id)))
            .flat_map(|l| self.layer_features(l))
            .collect()
    }

    fn index(features: &[RenderedFeature]) -> SpatialIndex<usize> {
        SpatialIndex::bulk_load(
            features
                .iter()
                .enumerate()
                .filter_map(|(i, f)| {
                    let bounds = f.feature.geometry.as_ref()?.bounds()?;
                    Some(SpatialItem::new(i.to_string(), bounds, i))
                })
                .collect(),
        )
    }

    fn hits_point(&self, geometry: &Geometry, point: ScreenPoint, tolerance: f64) -> bool {
        let lng_lat = self.camera.unproject(self.size, &point);
        let probe = Point::new(lng_lat.lng, lng_lat.lat);
        match GeoGeometry::from(geometry) {
            GeoGeometry::Polygon(p) if p.contains(&probe) => return true,
            GeoGeometry::MultiPolygon(mp) if mp.contains(&probe) => return true,
            _ => {}
        }

        let project = |p: &Position| self.camera.project(self.size, &LngLat::new(p.lng, p.lat));
        parts(geometry).iter().any(|part| match part.as_slice() {
            [single] => distance(project(single), point) <= tolerance,
            many => many
                .windows(2)
                .any(|w| segment_distance(point, project(&w[0]), project(&w[1])) <= tolerance),
        })
    }

    fn features_at(&self, point: ScreenPoint, tolerance: f64, layers: Option<&[String]>) -> Vec<RenderedFeature> {
        let candidates = self.rendered(layers);
        let corner_a = self
            .camera
            .unproject(self.size, &ScreenPoint::new(point.x - tolerance, point.y - tolerance));
        let corner_b = self
            .camera
            .unproject(self.size, &ScreenPoint::new(point.x + tolerance, point.y + tolerance));
        let mut probe = LngLatBounds::new(corner_a, corner_a);
        probe.extend(&corner_b);

        let mut hits: Vec<usize> = Self::index(&candidates)
            .query(&probe)
            .into_iter()
            .map(|item| item.data)
            .filter(|&i| {
                candidates[i]
                    .feature
                    .geometry
                    .as_ref()
                    .is_some_and(|g| self.hits_point(g, point, tolerance))
            })
            .collect();
        hits.sort_unstable();
        hits.into_iter().map(|i| candidates[i].clone()).collect()
    }

    fn features_in(&self, bounds: &LngLatBounds, layers: Option<&[String]>) -> Vec<RenderedFeature> {
        let candidates = self.rendered(layers);
        let mut hits: Vec<usize> = Self::index(&candidates)
            .query(bounds)
            .into_iter()
            .map(|item| item.data)
            .collect();
        hits.sort_unstable();
        hits.into_iter().map(|i| candidates[i].clone()).collect()
    }

    fn fire_pointer(
        &mut self,
        kind: InteractionKind,
        layer: Option<&str>,
        lng_lat: LngLat,
        features: Vec<RenderedFeature>,
    ) {
        let fired: Vec<ListenerId> = self
            .listeners
            .iter()
            .filter(|(_, l)| match l {
                Listener::Pointer { kind: k, layer: target } => *k == kind && target.as_deref() == layer,
                _ => false,
            })
            .map(|(id, _)| *id)
            .collect();
        for listener in fired {
            self.events.push_back(EngineEvent::Pointer {
                listener,
                kind,
                lng_lat,
                features: features.clone(),
            });
        }
    }

    fn group_by_layer(hits: &[RenderedFeature]) -> Vec<(String, Vec<RenderedFeature>)> {
        let mut grouped: Vec<(String, Vec<RenderedFeature>)> = Vec::new();
        for hit in hits {
            match grouped.iter_mut().find(|(layer, _)| *layer == hit.layer) {
                Some((_, features)) => features.push(hit.clone()),
                None => grouped.push((hit.layer.clone(), vec![hit.clone()])),
            }
        }
        grouped
    }

    // --- simulated input -----------------------------------------------------------------------

    /// Moves the pointer to `lng_lat`, firing `mouseleave` for layers it left and
    /// `mousemove` for layers it is over
    pub fn pointer_move(&mut self, lng_lat: LngLat) {
        let point = self.camera.project(self.size, &lng_lat);
        let hits = self.features_at(point, self.hit_tolerance_px, None);
        let grouped = Self::group_by_layer(&hits);

        let left: Vec<String> = self
            .hovered
            .iter()
            .filter(|layer| !grouped.iter().any(|(l, _)| l == *layer))
            .cloned()
            .collect();
        for layer in left {
            self.fire_pointer(InteractionKind::HoverLeave, Some(&layer), lng_lat, Vec::new());
        }
        self.hovered = grouped.iter().map(|(l, _)| l.clone()).collect();
        for (layer, features) in grouped {
            self.fire_pointer(InteractionKind::HoverMove, Some(&layer), lng_lat, features);
        }
        self.fire_pointer(InteractionKind::HoverMove, None, lng_lat, hits);
    }

    /// Moves the pointer off the map
    pub fn pointer_out(&mut self) {
        let center = self.camera.center;
        for layer in std::mem::take(&mut self.hovered) {
            self.fire_pointer(InteractionKind::HoverLeave, Some(&layer), center, Vec::new());
        }
    }

    pub fn click(&mut self, lng_lat: LngLat) {
        let point = self.camera.project(self.size, &lng_lat);
        let hits = self.features_at(point, self.hit_tolerance_px, None);
        for (layer, features) in Self::group_by_layer(&hits) {
            self.fire_pointer(InteractionKind::Click, Some(&layer), lng_lat, features);
        }
        self.fire_pointer(InteractionKind::Click, None, lng_lat, hits);
    }

    /// User draws a feature; returns the id the plugin assigned
    pub fn draw_create(&mut self, feature: Feature) -> Option<String> {
        self.draw_control?;
        let id = self.store_drawn(feature);
        self.events.push_back(EngineEvent::Draw {
            action: DrawAction::Create,
        });
        Some(id)
    }

    pub fn draw_update(&mut self, id: &str, geometry: Geometry) -> bool {
        let Some(feature) = self
            .drawn
            .iter_mut()
            .find(|f| f.id.as_ref().map(id_key).as_deref() == Some(id))
        else {
            return false;
        };
        feature.geometry = Some(geometry);
        self.events.push_back(EngineEvent::Draw {
            action: DrawAction::Update,
        });
        true
    }

    pub fn draw_delete(&mut self, id: &str) -> bool {
        let before = self.drawn.len();
        self.drawn
            .retain(|f| f.id.as_ref().map(id_key).as_deref() != Some(id));
        if self.drawn.len() == before {
            return false;
        }
        self.events.push_back(EngineEvent::Draw {
            action: DrawAction::Delete,
        });
        true
    }

    fn store_drawn(&mut self, mut feature: Feature) -> String {
        let id = match feature.id.as_ref() {
            Some(id) => id_key(id),
            None => format!("draw-{}", self.next_handle()),
        };
        feature.id = Some(Value::String(id.clone()));
        self.drawn
            .retain(|f| f.id.as_ref().map(id_key).as_deref() != Some(id.as_str()));
        self.drawn.push(feature);
        id
    }

    /// The geolocate control reports a position
    pub fn geolocate(&mut self, coords: Value) -> bool {
        if !self.controls.iter().any(|(_, c)| c.kind == ControlKind::Geolocate) {
            return false;
        }
        self.events.push_back(EngineEvent::Geolocate { coords });
        true
    }

    /// The user picks a geocoder result
    pub fn select_geocoder_result(&mut self, result: Value) -> bool {
        if !self.controls.iter().any(|(_, c)| c.kind == ControlKind::Geocoder) {
            return false;
        }
        self.events.push_back(EngineEvent::GeocoderResult { result });
        true
    }

    /// Drags a draggable marker to a new position
    pub fn drag_marker(&mut self, marker: MarkerId, lng_lat: LngLat) -> bool {
        let Some((_, spec)) = self.markers.iter_mut().find(|(id, _)| *id == marker) else {
            return false;
        };
        if !spec.draggable {
            return false;
        }
        spec.lng_lat = lng_lat;
        self.events.push_back(EngineEvent::MarkerDragEnd { marker, lng_lat });
        true
    }

    // --- inspection ----------------------------------------------------------------------------

    /// Paint value as rendered for one feature, with feature state applied
    pub fn evaluated_paint(&self, layer_id: &str, name: &str, feature_id: &Value) -> Option<Value> {
        let layer = self.layers.iter().find(|l| l.id == layer_id)?;
        let paint = layer.paint.get(name)?;
        let key = id_key(feature_id);
        let rendered = self
            .layer_features(layer)
            .into_iter()
            .find(|f| f.feature.id.as_ref().map(id_key).as_deref() == Some(key.as_str()))?;
        let properties = rendered.feature.properties_or_empty();
        let state = rendered
            .target()
            .map(|t| self.feature_state(&t))
            .unwrap_or_default();
        let mut ctx = EvalContext::new(&properties)
            .with_state(&state)
            .with_id(rendered.feature.id.as_ref());
        ctx.zoom = Some(self.camera.zoom);
        Some(evaluate(paint, &ctx))
    }

    /// Number of listeners attached for a layer and kind
    pub fn listener_count(&self, kind: InteractionKind, layer: Option<&str>) -> usize {
        self.listeners
            .iter()
            .filter(|(_, l)| match l {
                Listener::Pointer { kind: k, layer: target } => *k == kind && target.as_deref() == layer,
                _ => false,
            })
            .count()
    }

    pub fn style_listener_count(&self) -> usize {
        self.listeners
            .iter()
            .filter(|(_, l)| *l == Listener::StyleLoad)
            .count()
    }

    pub fn current_style(&self) -> &Value {
        &self.style
    }

    pub fn tooltips(&self) -> Vec<&PopupSpec> {
        self.popups
            .iter()
            .map(|(_, p)| p)
            .filter(|p| p.role == PopupRole::Tooltip)
            .collect()
    }

    pub fn popups(&self) -> Vec<&PopupSpec> {
        self.popups
            .iter()
            .map(|(_, p)| p)
            .filter(|p| p.role != PopupRole::Tooltip)
            .collect()
    }

    pub fn controls(&self) -> Vec<&ControlSpec> {
        self.controls.iter().map(|(_, c)| c).collect()
    }

    pub fn markers(&self) -> Vec<(MarkerId, &MarkerSpec)> {
        self.markers.iter().map(|(id, m)| (*id, m)).collect()
    }

    pub fn legend_ids(&self) -> Vec<String> {
        self.legends.iter().map(|(id, _, _)| id.clone()).collect()
    }

    pub fn legend_html(&self, id: &str) -> Option<&str> {
        self.legends
            .iter()
            .find(|(l, _, _)| l == id)
            .map(|(_, html, _)| html.as_str())
    }

    pub fn effect(&self, effect: Effect) -> Option<&Value> {
        self.effects.get(&effect)
    }

    pub fn config_value(&self, import_id: &str, name: &str) -> Option<&Value> {
        self.config.get(&(import_id.to_string(), name.to_string()))
    }
}

/// Vertex runs of a geometry: single points, lines and rings
fn parts(geometry: &Geometry) -> Vec<Vec<Position>> {
    match geometry {
        Geometry::Point { coordinates } => vec![vec![*coordinates]],
        Geometry::MultiPoint { coordinates } => coordinates.iter().map(|p| vec![*p]).collect(),
        Geometry::LineString { coordinates } => vec![coordinates.clone()],
        Geometry::Polygon { coordinates } | Geometry::MultiLineString { coordinates } => {
            coordinates.clone()
        }
        Geometry::MultiPolygon { coordinates } => coordinates.iter().flatten().cloned().collect(),
        Geometry::GeometryCollection { geometries } => geometries.iter().flat_map(parts).collect(),
    }
}

fn distance(a: ScreenPoint, b: ScreenPoint) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

fn segment_distance(p: ScreenPoint, a: ScreenPoint, b: ScreenPoint) -> f64 {
    let ab = b.subtract(&a);
    let len2 = ab.x * ab.x + ab.y * ab.y;
    if len2 == 0.0 {
        return distance(p, a);
    }
    let ap = p.subtract(&a);
    let t = ((ap.x * ab.x + ap.y * ab.y) / len2).clamp(0.0, 1.0);
    distance(p, a.add(&ab.multiply(t)))
}

impl MapEngine for MemoryEngine {
    fn is_available(&self) -> bool {
        self.available
    }

    fn has_plugin(&self, plugin: Plugin) -> bool {
        self.plugins.contains(&plugin)
    }

    fn create_map(&mut self, options: &MapOptions) -> EngineResult<()> {
        if self.created {
            return Err(EngineError::InvalidValue("map already created".to_string()));
        }
        self.created = true;
        self.camera = options.camera;
        if let Some(projection) = &options.projection {
            self.effects.insert(Effect::Projection, projection.clone());
        }
        self.apply_style(&options.style);
        Ok(())
    }

    fn is_style_loaded(&self) -> bool {
        self.style_loaded
    }

    fn set_style(&mut self, request: &StyleRequest) -> EngineResult<()> {
        if let Some(Value::Object(config)) = &request.config {
            for (import_id, values) in config {
                if let Some(values) = values.as_object() {
                    for (name, value) in values {
                        self.config
                            .insert((import_id.clone(), name.clone()), value.clone());
                    }
                }
            }
        }
        self.apply_style(&request.style);
        Ok(())
    }

    fn style_source_ids(&self) -> Vec<String> {
        self.style_sources.clone()
    }

    fn add_source(&mut self, id: &str, source: &SourceSpec) -> EngineResult<()> {
        self.require_loaded()?;
        if self.source_spec(id).is_some() {
            return Err(EngineError::DuplicateSource(id.to_string()));
        }
        self.sources.push((id.to_string(), source.clone()));
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> EngineResult<()> {
        if let Some(layer) = self.layers.iter().find(|l| l.source.as_deref() == Some(id)) {
            return Err(EngineError::SourceInUse {
                source_id: id.to_string(),
                layer: layer.id.clone(),
            });
        }
        let before = self.sources.len();
        self.sources.retain(|(s, _)| s != id);
        if self.sources.len() == before {
            return Err(EngineError::MissingSource(id.to_string()));
        }
        self.feature_state.retain(|t, _| t.source != id);
        Ok(())
    }

    fn source(&self, id: &str) -> Option<SourceSpec> {
        self.source_spec(id).cloned()
    }

    fn source_ids(&self) -> Vec<String> {
        self.sources.iter().map(|(id, _)| id.clone()).collect()
    }

    fn set_source_data(&mut self, id: &str, data: &Value) -> EngineResult<()> {
        let (_, spec) = self
            .sources
            .iter_mut()
            .find(|(s, _)| s == id)
            .ok_or_else(|| EngineError::MissingSource(id.to_string()))?;
        if !spec.is_geojson() {
            return Err(EngineError::InvalidValue(format!(
                "source '{}' is a {} source and has no data",
                id, spec.kind
            )));
        }
        spec.options.insert("data".to_string(), data.clone());
        Ok(())
    }

    fn add_layer(&mut self, layer: &LayerSpec, before_id: Option<&str>) -> EngineResult<()> {
        self.require_loaded()?;
        if self.layers.iter().any(|l| l.id == layer.id) {
            return Err(EngineError::DuplicateLayer(layer.id.clone()));
        }
        if let Some(source) = layer.source.as_deref() {
            let spec = self
                .source_spec(source)
                .ok_or_else(|| EngineError::MissingSource(source.to_string()))?;
            if !layer_fits_source(&layer.kind, &spec.kind) {
                return Err(EngineError::InvalidValue(format!(
                    "layer '{}' of type '{}' cannot use {} source '{}'",
                    layer.id, layer.kind, spec.kind, source
                )));
            }
        }
        match before_id {
            Some(before) => {
                let index = self.layer_index(before)?;
                self.layers.insert(index, layer.clone());
            }
            None => self.layers.push(layer.clone()),
        }
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> EngineResult<()> {
        let index = self.layer_index(id)?;
        self.layers.remove(index);
        self.hovered.retain(|l| l != id);
        Ok(())
    }

    fn layer(&self, id: &str) -> Option<LayerSpec> {
        self.layers.iter().find(|l| l.id == id).cloned()
    }

    fn layer_ids(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.id.clone()).collect()
    }

    fn move_layer(&mut self, id: &str, before_id: Option<&str>) -> EngineResult<()> {
        let index = self.layer_index(id)?;
        if let Some(before) = before_id {
            self.layer_index(before)?;
        }
        let layer = self.layers.remove(index);
        match before_id {
            Some(before) => {
                let target = self.layer_index(before)?;
                self.layers.insert(target, layer);
            }
            None => self.layers.push(layer),
        }
        Ok(())
    }

    fn set_filter(&mut self, id: &str, filter: Option<&Value>) -> EngineResult<()> {
        self.layer_mut(id)?.filter = filter.filter(|f| !f.is_null()).cloned();
        Ok(())
    }

    fn filter(&self, id: &str) -> Option<Value> {
        self.layers.iter().find(|l| l.id == id)?.filter.clone()
    }

    fn set_paint_property(&mut self, id: &str, name: &str, value: &Value) -> EngineResult<()> {
        let layer = self.layer_mut(id)?;
        if value.is_null() {
            layer.paint.remove(name);
        } else {
            layer.paint.insert(name.to_string(), value.clone());
        }
        Ok(())
    }

    fn paint_property(&self, id: &str, name: &str) -> Option<Value> {
        self.layers.iter().find(|l| l.id == id)?.paint.get(name).cloned()
    }

    fn set_layout_property(&mut self, id: &str, name: &str, value: &Value) -> EngineResult<()> {
        let layer = self.layer_mut(id)?;
        if value.is_null() {
            layer.layout.remove(name);
        } else {
            layer.layout.insert(name.to_string(), value.clone());
        }
        Ok(())
    }

    fn layout_property(&self, id: &str, name: &str) -> Option<Value> {
        self.layers.iter().find(|l| l.id == id)?.layout.get(name).cloned()
    }

    fn set_layer_zoom_range(&mut self, id: &str, min: Option<f64>, max: Option<f64>) -> EngineResult<()> {
        let layer = self.layer_mut(id)?;
        layer.minzoom = min;
        layer.maxzoom = max;
        Ok(())
    }

    fn set_feature_state(&mut self, target: &FeatureTarget, state: &Map<String, Value>) -> EngineResult<()> {
        if self.source_spec(&target.source).is_none() {
            return Err(EngineError::MissingSource(target.source.clone()));
        }
        let entry = self.feature_state.entry(target.clone()).or_default();
        for (key, value) in state {
            entry.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn remove_feature_state(&mut self, target: &FeatureTarget, key: Option<&str>) -> EngineResult<()> {
        if self.source_spec(&target.source).is_none() {
            return Err(EngineError::MissingSource(target.source.clone()));
        }
        match key {
            Some(key) => {
                if let Some(state) = self.feature_state.get_mut(target) {
                    state.remove(key);
                }
            }
            None => {
                self.feature_state.remove(target);
            }
        }
        Ok(())
    }

    fn feature_state(&self, target: &FeatureTarget) -> Map<String, Value> {
        self.feature_state.get(target).cloned().unwrap_or_default()
    }

    fn on(&mut self, kind: InteractionKind, layer_id: Option<&str>) -> ListenerId {
        let id = ListenerId(self.next_handle());
        self.listeners.push((
            id,
            Listener::Pointer {
                kind,
                layer: layer_id.map(str::to_string),
            },
        ));
        id
    }

    fn once_style_load(&mut self) -> ListenerId {
        let id = ListenerId(self.next_handle());
        self.listeners.push((id, Listener::StyleLoad));
        id
    }

    fn off(&mut self, listener: ListenerId) {
        self.listeners.retain(|(id, _)| *id != listener);
    }

    fn poll_events(&mut self) -> Vec<EngineEvent> {
        if self.auto_load {
            self.finish_style_load();
        }
        let loads: Vec<(ListenerId, String)> = self
            .listeners
            .iter()
            .filter_map(|(id, l)| match l {
                Listener::Image { url } => Some((*id, url.clone())),
                _ => None,
            })
            .collect();
        for (listener, url) in loads {
            self.off(listener);
            let result = if self.broken_images.contains(&url) {
                Err(format!("could not load image {}", url))
            } else {
                Ok(ImageData {
                    width: 64,
                    height: 64,
                    pixel_ratio: None,
                })
            };
            self.events
                .push_back(EngineEvent::ImageLoaded { listener, result });
        }
        self.events.drain(..).collect()
    }

    fn camera(&self) -> Camera {
        self.camera
    }

    fn move_camera(&mut self, movement: &CameraMove) -> EngineResult<()> {
        match movement {
            CameraMove::FitBounds {
                bounds,
                padding,
                max_zoom,
                ..
            } => {
                self.camera = Camera::fitting(bounds, self.size, padding.unwrap_or(0.0), *max_zoom);
            }
            CameraMove::FlyTo(options) | CameraMove::EaseTo(options) | CameraMove::JumpTo(options) => {
                if let Some(center) = options.center {
                    if !center.is_valid() {
                        return Err(EngineError::InvalidValue(format!(
                            "invalid center [{}, {}]",
                            center.lng, center.lat
                        )));
                    }
                }
                options.apply_to(&mut self.camera);
            }
        }
        Ok(())
    }

    fn set_effect(&mut self, effect: Effect, value: Option<&Value>) -> EngineResult<()> {
        if effect == Effect::Terrain {
            if let Some(source) = value.and_then(|v| v.get("source")).and_then(Value::as_str) {
                if self.source_spec(source).is_none() {
                    return Err(EngineError::MissingSource(source.to_string()));
                }
            }
        }
        match value.filter(|v| !v.is_null()) {
            Some(v) => {
                self.effects.insert(effect, v.clone());
            }
            None => {
                self.effects.remove(&effect);
            }
        }
        Ok(())
    }

    fn set_config_property(&mut self, import_id: &str, name: &str, value: &Value) -> EngineResult<()> {
        self.config
            .insert((import_id.to_string(), name.to_string()), value.clone());
        Ok(())
    }

    fn add_control(&mut self, control: &ControlSpec) -> EngineResult<ControlId> {
        if control.kind == ControlKind::Geocoder && !self.has_plugin(Plugin::Geocoder) {
            return Err(EngineError::MissingPlugin("geocoder".to_string()));
        }
        let id = ControlId(self.next_handle());
        self.controls.push((id, control.clone()));
        Ok(id)
    }

    fn remove_control(&mut self, id: ControlId) -> EngineResult<()> {
        if self.draw_control == Some(id) {
            self.draw_control = None;
            self.drawn.clear();
            return Ok(());
        }
        let index = self
            .controls
            .iter()
            .position(|(c, _)| *c == id)
            .ok_or(EngineError::MissingControl(id))?;
        self.controls.remove(index);
        Ok(())
    }

    fn add_marker(&mut self, marker: &MarkerSpec) -> MarkerId {
        let id = MarkerId(self.next_handle());
        self.markers.push((id, marker.clone()));
        id
    }

    fn remove_marker(&mut self, id: MarkerId) {
        self.markers.retain(|(m, _)| *m != id);
    }

    fn open_popup(&mut self, popup: &PopupSpec) -> PopupId {
        let id = PopupId(self.next_handle());
        self.popups.push((id, popup.clone()));
        id
    }

    fn close_popup(&mut self, id: PopupId) {
        self.popups.retain(|(p, _)| *p != id);
    }

    fn render_legend(&mut self, id: &str, html: &str, css: Option<&str>) {
        let entry = (id.to_string(), html.to_string(), css.map(str::to_string));
        match self.legends.iter_mut().find(|(l, _, _)| l == id) {
            Some(existing) => *existing = entry,
            None => self.legends.push(entry),
        }
    }

    fn remove_legend(&mut self, id: &str) {
        self.legends.retain(|(l, _, _)| l != id);
    }

    fn load_image(&mut self, url: &str) -> ListenerId {
        let id = ListenerId(self.next_handle());
        self.listeners.push((
            id,
            Listener::Image {
                url: url.to_string(),
            },
        ));
        id
    }

    fn add_image(&mut self, id: &str, image: &ImageData, _options: &Map<String, Value>) -> EngineResult<()> {
        if image.width == 0 || image.height == 0 {
            return Err(EngineError::InvalidValue(format!("image '{}' is empty", id)));
        }
        self.images.insert(id.to_string());
        Ok(())
    }

    fn has_image(&self, id: &str) -> bool {
        self.images.contains(id)
    }

    fn query_rendered_features(
        &self,
        region: Option<&QueryRegion>,
        layers: Option<&[String]>,
        filter: Option<&Value>,
    ) -> Vec<RenderedFeature> {
        let hits = match region {
            None => self.features_in(&self.camera.visible_bounds(self.size), layers),
            Some(QueryRegion::Point(point)) => self.features_at(*point, 0.0, layers),
            Some(QueryRegion::Box([a, b])) => {
                let corner = self.camera.unproject(self.size, a);
                let mut bounds = LngLatBounds::new(corner, corner);
                bounds.extend(&self.camera.unproject(self.size, b));
                self.features_in(&bounds, layers)
            }
        };
        hits.into_iter()
            .filter(|hit| {
                let properties = hit.feature.properties_or_empty();
                let ctx = EvalContext::new(&properties).with_id(hit.feature.id.as_ref());
                filter_passes(filter, &ctx)
            })
            .collect()
    }

    fn add_draw_control(&mut self, options: &DrawOptions) -> EngineResult<ControlId> {
        if !self.has_plugin(Plugin::Draw) {
            return Err(EngineError::MissingPlugin("draw".to_string()));
        }
        let id = ControlId(self.next_handle());
        self.draw_control = Some(id);
        self.drawn.clear();
        log::trace!("draw control at {}", options.position);
        Ok(id)
    }

    fn draw_features(&self) -> Vec<Feature> {
        self.drawn.clone()
    }

    fn draw_add(&mut self, feature: &Feature) -> EngineResult<Vec<String>> {
        if self.draw_control.is_none() {
            return Err(EngineError::MissingPlugin("draw".to_string()));
        }
        Ok(vec![self.store_drawn(feature.clone())])
    }

    fn draw_delete_all(&mut self) -> EngineResult<()> {
        if self.draw_control.is_none() {
            return Err(EngineError::MissingPlugin("draw".to_string()));
        }
        self.drawn.clear();
        Ok(())
    }
}
