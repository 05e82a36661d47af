//! Mutation messages sent by the host to a live map.
//!
//! Every message is a JSON object whose `type` member names the operation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    core::geo::{LngLat, LngLatBounds},
    data::expression::Binding,
    engine::{CameraMove, CameraOptions, SourceSpec},
    layers::{definition::LayerDefinition, marker::MarkerSpec},
    plugins::{draw::DrawOptions, query::QueryRequest, turf::TurfRequest},
    ui::controls::ControlSpec,
};

fn default_import() -> String {
    "basemap".to_string()
}

fn default_legend_id() -> String {
    "legend".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    AddSource {
        id: String,
        source: SourceSpec,
    },
    RemoveSource {
        #[serde(alias = "source_id")]
        source: String,
    },
    /// Replaces the data of a GeoJSON source
    SetSource {
        #[serde(alias = "source_id")]
        source: String,
        data: Value,
    },
    AddLayer {
        layer: LayerDefinition,
    },
    RemoveLayer {
        #[serde(alias = "layer_id")]
        layer: String,
    },
    MoveLayer {
        #[serde(alias = "layer_id")]
        layer: String,
        #[serde(default, alias = "before_id", alias = "beforeId")]
        before: Option<String>,
    },
    SetFilter {
        #[serde(alias = "layer_id")]
        layer: String,
        #[serde(default)]
        filter: Option<Value>,
    },
    SetPaintProperty {
        #[serde(alias = "layer_id")]
        layer: String,
        name: String,
        value: Value,
    },
    SetLayoutProperty {
        #[serde(alias = "layer_id")]
        layer: String,
        name: String,
        value: Value,
    },
    SetLayerZoomRange {
        #[serde(alias = "layer_id")]
        layer: String,
        #[serde(default)]
        min_zoom: Option<f64>,
        #[serde(default)]
        max_zoom: Option<f64>,
    },
    SetStyle {
        style: Value,
        #[serde(default)]
        diff: Option<bool>,
        #[serde(default)]
        config: Option<Value>,
    },
    SetConfigProperty {
        #[serde(default = "default_import")]
        import_id: String,
        #[serde(alias = "config_name")]
        name: String,
        value: Value,
    },
    SetProjection {
        projection: Value,
    },
    /// `None` removes the effect
    SetTerrain {
        #[serde(default)]
        terrain: Option<Value>,
    },
    SetFog {
        #[serde(default)]
        fog: Option<Value>,
    },
    SetRain {
        #[serde(default)]
        rain: Option<Value>,
    },
    SetSnow {
        #[serde(default)]
        snow: Option<Value>,
    },
    FitBounds {
        bounds: LngLatBounds,
        #[serde(default)]
        padding: Option<f64>,
        #[serde(default, alias = "maxZoom")]
        max_zoom: Option<f64>,
        #[serde(default)]
        animate: bool,
    },
    FlyTo(CameraOptions),
    EaseTo(CameraOptions),
    JumpTo(CameraOptions),
    SetView {
        center: LngLat,
        zoom: f64,
    },
    AddControl {
        control: ControlSpec,
    },
    RemoveControl {
        #[serde(alias = "control_id")]
        control: String,
    },
    AddDrawControl {
        #[serde(default)]
        options: DrawOptions,
    },
    GetDrawnFeatures,
    ClearDrawnFeatures,
    /// Loads features into the drawing plugin, from inline GeoJSON or an existing source
    AddFeaturesToDraw {
        #[serde(default)]
        data: Option<Value>,
        #[serde(default, alias = "source_id")]
        source: Option<String>,
        #[serde(default)]
        replace: bool,
    },
    AddMarkers {
        markers: Vec<MarkerSpec>,
    },
    ClearMarkers,
    SetPopup {
        #[serde(alias = "layer_id")]
        layer: String,
        #[serde(default)]
        popup: Option<Binding>,
    },
    SetTooltip {
        #[serde(alias = "layer_id")]
        layer: String,
        #[serde(default)]
        tooltip: Option<Binding>,
    },
    AddLegend {
        #[serde(default = "default_legend_id", alias = "legend_id")]
        id: String,
        html: String,
        #[serde(default)]
        css: Option<String>,
        /// Keep existing legends instead of replacing them
        #[serde(default)]
        add: bool,
    },
    ClearLegend {
        #[serde(default, alias = "ids")]
        legend_ids: Option<Vec<String>>,
    },
    QueryRenderedFeatures(QueryRequest),
    ClearQueriedFeatures,
    AddImage {
        id: String,
        url: String,
        #[serde(default)]
        options: Map<String, Value>,
    },
    Turf(TurfRequest),
}

impl Mutation {
    /// Decodes one message
    pub fn from_value(value: Value) -> crate::Result<Self> {
        serde_json::from_value(value).map_err(|e| crate::MapError::InvalidMessage(e.to_string()))
    }

    pub fn from_json(text: &str) -> crate::Result<Self> {
        serde_json::from_str(text).map_err(|e| crate::MapError::InvalidMessage(e.to_string()))
    }

    /// The message's `type`
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::AddSource { .. } => "add_source",
            Mutation::RemoveSource { .. } => "remove_source",
            Mutation::SetSource { .. } => "set_source",
            Mutation::AddLayer { .. } => "add_layer",
            Mutation::RemoveLayer { .. } => "remove_layer",
            Mutation::MoveLayer { .. } => "move_layer",
            Mutation::SetFilter { .. } => "set_filter",
            Mutation::SetPaintProperty { .. } => "set_paint_property",
            Mutation::SetLayoutProperty { .. } => "set_layout_property",
            Mutation::SetLayerZoomRange { .. } => "set_layer_zoom_range",
            Mutation::SetStyle { .. } => "set_style",
            Mutation::SetConfigProperty { .. } => "set_config_property",
            Mutation::SetProjection { .. } => "set_projection",
            Mutation::SetTerrain { .. } => "set_terrain",
            Mutation::SetFog { .. } => "set_fog",
            Mutation::SetRain { .. } => "set_rain",
            Mutation::SetSnow { .. } => "set_snow",
            Mutation::FitBounds { .. } => "fit_bounds",
            Mutation::FlyTo(_) => "fly_to",
            Mutation::EaseTo(_) => "ease_to",
            Mutation::JumpTo(_) => "jump_to",
            Mutation::SetView { .. } => "set_view",
            Mutation::AddControl { .. } => "add_control",
            Mutation::RemoveControl { .. } => "remove_control",
            Mutation::AddDrawControl { .. } => "add_draw_control",
            Mutation::GetDrawnFeatures => "get_drawn_features",
            Mutation::ClearDrawnFeatures => "clear_drawn_features",
            Mutation::AddFeaturesToDraw { .. } => "add_features_to_draw",
            Mutation::AddMarkers { .. } => "add_markers",
            Mutation::ClearMarkers => "clear_markers",
            Mutation::SetPopup { .. } => "set_popup",
            Mutation::SetTooltip { .. } => "set_tooltip",
            Mutation::AddLegend { .. } => "add_legend",
            Mutation::ClearLegend { .. } => "clear_legend",
            Mutation::QueryRenderedFeatures(_) => "query_rendered_features",
            Mutation::ClearQueriedFeatures => "clear_queried_features",
            Mutation::AddImage { .. } => "add_image",
            Mutation::Turf(_) => "turf",
        }
    }

    /// Camera movement carried by view messages
    pub fn camera_move(&self) -> Option<CameraMove> {
        match self {
            Mutation::FitBounds {
                bounds,
                padding,
                max_zoom,
                animate,
            } => Some(CameraMove::FitBounds {
                bounds: *bounds,
                padding: *padding,
                max_zoom: *max_zoom,
                animate: *animate,
            }),
            Mutation::FlyTo(options) => Some(CameraMove::FlyTo(options.clone())),
            Mutation::EaseTo(options) => Some(CameraMove::EaseTo(options.clone())),
            Mutation::JumpTo(options) => Some(CameraMove::JumpTo(options.clone())),
            Mutation::SetView { center, zoom } => Some(CameraMove::JumpTo(CameraOptions {
                center: Some(*center),
                zoom: Some(*zoom),
                ..Default::default()
            })),
            _ => None,
        }
    }
}
