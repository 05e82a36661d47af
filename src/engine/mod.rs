//! The seam between the runtime and the GL rendering engine.
//!
//! Every call the runtime makes into Mapbox GL JS / MapLibre GL JS goes through
//! [`MapEngine`]. Asynchronous engine signals (style load, image load, pointer
//! events, draw plugin events) come back as [`EngineEvent`]s that the widget
//! pulls with [`MapEngine::poll_events`].
//!
//! The event API is additive: calling [`MapEngine::on`] twice for the same layer
//! and kind registers two listeners and every matching event fires twice.

pub mod memory;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    core::geo::{Camera, LngLat, LngLatBounds, ScreenPoint},
    data::geojson::{Feature, GeoJson},
    plugins::draw::DrawOptions,
    ui::{controls::ControlSpec, popup::PopupSpec},
    layers::marker::MarkerSpec,
};

/// Errors the engine reports for rejected calls
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("source '{0}' already exists")]
    DuplicateSource(String),
    #[error("source '{0}' does not exist")]
    MissingSource(String),
    #[error("layer '{0}' already exists")]
    DuplicateLayer(String),
    #[error("layer '{0}' does not exist")]
    MissingLayer(String),
    #[error("source '{source_id}' is still used by layer '{layer}'")]
    SourceInUse { source_id: String, layer: String },
    #[error("style is not done loading")]
    StyleNotLoaded,
    #[error("plugin '{0}' is not loaded")]
    MissingPlugin(String),
    #[error("control {0:?} does not exist")]
    MissingControl(ControlId),
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

macro_rules! handle_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);
    };
}

handle_id!(ListenerId);
handle_id!(ControlId);
handle_id!(MarkerId);
handle_id!(PopupId);

/// Pointer interactions the runtime listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// `mousemove`
    HoverMove,
    /// `mouseleave`
    HoverLeave,
    /// `click`
    Click,
}

impl InteractionKind {
    pub const ALL: [InteractionKind; 3] = [Self::HoverMove, Self::HoverLeave, Self::Click];

    /// Engine event name
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::HoverMove => "mousemove",
            Self::HoverLeave => "mouseleave",
            Self::Click => "click",
        }
    }
}

/// Source definition as handed to `map.addSource`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl SourceSpec {
    pub fn geojson(data: Value) -> Self {
        let mut options = Map::new();
        options.insert("data".to_string(), data);
        Self {
            kind: "geojson".to_string(),
            options,
        }
    }

    pub fn is_geojson(&self) -> bool {
        self.kind == "geojson"
    }

    /// Inline GeoJSON data, if this is a GeoJSON source with inline data
    pub fn geojson_data(&self) -> Option<GeoJson> {
        if !self.is_geojson() {
            return None;
        }
        self.options
            .get("data")
            .filter(|d| d.is_object())
            .and_then(|d| GeoJson::from_value(d.clone()).ok())
    }

    /// `promoteId` option, used to derive feature ids from a property
    pub fn promote_id(&self) -> Option<&str> {
        self.options.get("promoteId").and_then(|v| v.as_str())
    }
}

/// Layer definition as handed to `map.addLayer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LayerSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "source-layer", default, skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub paint: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub layout: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
}

impl LayerSpec {
    pub fn new(id: &str, kind: &str, source: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            source: source.map(str::to_string),
            ..Default::default()
        }
    }

    pub fn is_visible(&self) -> bool {
        self.layout.get("visibility").and_then(|v| v.as_str()) != Some("none")
    }
}

/// `map.setStyle` arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRequest {
    /// Style URL or inline style document
    pub style: Value,
    #[serde(default)]
    pub diff: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

/// Options the map is constructed with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapOptions {
    pub style: Value,
    pub camera: Camera,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bounds: Option<LngLatBounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl MapOptions {
    pub fn new(style: Value, camera: Camera) -> Self {
        Self {
            style,
            camera,
            projection: None,
            max_bounds: None,
            min_zoom: None,
            max_zoom: None,
            extra: Map::new(),
        }
    }
}

/// A feature state target (`map.setFeatureState` first argument)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureTarget {
    pub source: String,
    #[serde(rename = "sourceLayer", default, skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    /// Feature id, normalized to its string form
    pub id: String,
}

/// Feature returned by the engine's query API or carried by pointer events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedFeature {
    pub layer: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    pub feature: Feature,
}

impl RenderedFeature {
    /// Feature state target for this feature, if it has an id
    pub fn target(&self) -> Option<FeatureTarget> {
        let id = self.feature.id.as_ref()?;
        Some(FeatureTarget {
            source: self.source.clone(),
            source_layer: self.source_layer.clone(),
            id: id_key(id),
        })
    }
}

/// String form of a feature id (`5` and `"5"` address the same feature)
pub fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Camera movements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CameraMove {
    FitBounds {
        bounds: LngLatBounds,
        #[serde(default)]
        padding: Option<f64>,
        #[serde(default)]
        max_zoom: Option<f64>,
        #[serde(default)]
        animate: bool,
    },
    FlyTo(CameraOptions),
    EaseTo(CameraOptions),
    JumpTo(CameraOptions),
}

/// Partial camera used by fly/ease/jump
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CameraOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center: Option<LngLat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl CameraOptions {
    pub fn apply_to(&self, camera: &mut Camera) {
        if let Some(center) = self.center {
            camera.center = center;
        }
        if let Some(zoom) = self.zoom {
            camera.zoom = zoom;
        }
        if let Some(bearing) = self.bearing {
            camera.bearing = bearing;
        }
        if let Some(pitch) = self.pitch {
            camera.pitch = pitch;
        }
    }
}

/// Style-level atmosphere/terrain effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    Terrain,
    Fog,
    Rain,
    Snow,
    Projection,
}

/// Query region in container pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryRegion {
    Point(ScreenPoint),
    Box([ScreenPoint; 2]),
}

/// Loaded image data for `map.addImage`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub pixel_ratio: Option<f64>,
}

/// Draw plugin event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawAction {
    Create,
    Update,
    Delete,
}

/// Asynchronous signals from the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A one-shot style-load listener fired; the listener is already detached
    StyleLoaded { listener: ListenerId },
    /// A pointer listener fired
    Pointer {
        listener: ListenerId,
        kind: InteractionKind,
        lng_lat: LngLat,
        features: Vec<RenderedFeature>,
    },
    /// A one-shot image load finished
    ImageLoaded {
        listener: ListenerId,
        result: std::result::Result<ImageData, String>,
    },
    /// The draw plugin changed its feature set
    Draw { action: DrawAction },
    /// The geolocate control reported a position
    Geolocate { coords: Value },
    /// The geocoder control selected a result
    GeocoderResult { result: Value },
    /// A draggable marker was dropped
    MarkerDragEnd { marker: MarkerId, lng_lat: LngLat },
}

/// Optional engine plugins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plugin {
    Draw,
    Geocoder,
}

/// Operations the runtime performs against a live map
pub trait MapEngine {
    /// Whether the engine library itself is available
    fn is_available(&self) -> bool {
        true
    }

    fn has_plugin(&self, plugin: Plugin) -> bool;

    /// Construct the map; the initial style loads asynchronously
    fn create_map(&mut self, options: &MapOptions) -> EngineResult<()>;

    fn is_style_loaded(&self) -> bool;

    /// Replace the style; completion is signalled to one-shot style listeners
    fn set_style(&mut self, request: &StyleRequest) -> EngineResult<()>;

    /// Source ids defined by the current style document
    fn style_source_ids(&self) -> Vec<String>;

    // Sources
    fn add_source(&mut self, id: &str, source: &SourceSpec) -> EngineResult<()>;
    fn remove_source(&mut self, id: &str) -> EngineResult<()>;
    fn source(&self, id: &str) -> Option<SourceSpec>;
    /// All source ids in insertion order
    fn source_ids(&self) -> Vec<String>;
    fn set_source_data(&mut self, id: &str, data: &Value) -> EngineResult<()>;

    // Layers
    fn add_layer(&mut self, layer: &LayerSpec, before_id: Option<&str>) -> EngineResult<()>;
    fn remove_layer(&mut self, id: &str) -> EngineResult<()>;
    fn layer(&self, id: &str) -> Option<LayerSpec>;
    /// All layer ids, bottom to top
    fn layer_ids(&self) -> Vec<String>;
    fn move_layer(&mut self, id: &str, before_id: Option<&str>) -> EngineResult<()>;
    fn set_filter(&mut self, id: &str, filter: Option<&Value>) -> EngineResult<()>;
    fn filter(&self, id: &str) -> Option<Value>;
    fn set_paint_property(&mut self, id: &str, name: &str, value: &Value) -> EngineResult<()>;
    fn paint_property(&self, id: &str, name: &str) -> Option<Value>;
    fn set_layout_property(&mut self, id: &str, name: &str, value: &Value) -> EngineResult<()>;
    fn layout_property(&self, id: &str, name: &str) -> Option<Value>;
    fn set_layer_zoom_range(&mut self, id: &str, min: Option<f64>, max: Option<f64>) -> EngineResult<()>;

    // Feature state
    fn set_feature_state(&mut self, target: &FeatureTarget, state: &Map<String, Value>) -> EngineResult<()>;
    fn remove_feature_state(&mut self, target: &FeatureTarget, key: Option<&str>) -> EngineResult<()>;
    fn feature_state(&self, target: &FeatureTarget) -> Map<String, Value>;

    // Events
    fn on(&mut self, kind: InteractionKind, layer_id: Option<&str>) -> ListenerId;
    /// One-shot `style.load` listener, detached automatically after it fires
    fn once_style_load(&mut self) -> ListenerId;
    fn off(&mut self, listener: ListenerId);
    /// Drain pending asynchronous signals
    fn poll_events(&mut self) -> Vec<EngineEvent>;

    // Camera and environment
    fn camera(&self) -> Camera;
    fn move_camera(&mut self, movement: &CameraMove) -> EngineResult<()>;
    fn set_effect(&mut self, effect: Effect, value: Option<&Value>) -> EngineResult<()>;
    fn set_config_property(&mut self, import_id: &str, name: &str, value: &Value) -> EngineResult<()>;

    // Controls, markers and DOM overlays
    fn add_control(&mut self, control: &ControlSpec) -> EngineResult<ControlId>;
    fn remove_control(&mut self, id: ControlId) -> EngineResult<()>;
    fn add_marker(&mut self, marker: &MarkerSpec) -> MarkerId;
    fn remove_marker(&mut self, id: MarkerId);
    fn open_popup(&mut self, popup: &PopupSpec) -> PopupId;
    fn close_popup(&mut self, id: PopupId);
    fn render_legend(&mut self, id: &str, html: &str, css: Option<&str>);
    fn remove_legend(&mut self, id: &str);

    // Images
    /// Start loading an image; completion arrives as [`EngineEvent::ImageLoaded`]
    fn load_image(&mut self, url: &str) -> ListenerId;
    fn add_image(&mut self, id: &str, image: &ImageData, options: &Map<String, Value>) -> EngineResult<()>;
    fn has_image(&self, id: &str) -> bool;

    /// Features currently rendered. Only what is visible in the current viewport is returned.
    fn query_rendered_features(
        &self,
        region: Option<&QueryRegion>,
        layers: Option<&[String]>,
        filter: Option<&Value>,
    ) -> Vec<RenderedFeature>;

    // Draw plugin
    fn add_draw_control(&mut self, options: &DrawOptions) -> EngineResult<ControlId>;
    fn draw_features(&self) -> Vec<Feature>;
    fn draw_add(&mut self, feature: &Feature) -> EngineResult<Vec<String>>;
    fn draw_delete_all(&mut self) -> EngineResult<()>;
}
