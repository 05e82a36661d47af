use crate::{
    data::expression::Binding,
    engine::{LayerSpec, SourceSpec},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A layer's source: an existing source id, or a source defined inline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayerSource {
    Id(String),
    Inline(SourceSpec),
}

/// A layer as sent by the host: the engine layer plus runtime-only bindings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<LayerSource>,
    #[serde(
        rename = "source-layer",
        alias = "source_layer",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_layer: Option<String>,
    #[serde(default)]
    pub paint: Map<String, Value>,
    #[serde(default)]
    pub layout: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
    #[serde(default, alias = "beforeId", skip_serializing_if = "Option::is_none")]
    pub before_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popup: Option<Binding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<Binding>,
    /// Paint overrides applied while a feature is hovered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hover_options: Option<Map<String, Value>>,
}

impl LayerDefinition {
    pub fn new(id: &str, kind: &str, source: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            source: Some(LayerSource::Id(source.to_string())),
            source_layer: None,
            paint: Map::new(),
            layout: Map::new(),
            filter: None,
            minzoom: None,
            maxzoom: None,
            slot: None,
            before_id: None,
            popup: None,
            tooltip: None,
            hover_options: None,
        }
    }

    pub fn with_paint(mut self, name: &str, value: Value) -> Self {
        self.paint.insert(name.to_string(), value);
        self
    }

    /// Id of the source the layer draws from. Inline sources are registered under the layer id.
    pub fn source_id(&self) -> Option<String> {
        match &self.source {
            Some(LayerSource::Id(id)) => Some(id.clone()),
            Some(LayerSource::Inline(_)) => Some(self.id.clone()),
            None => None,
        }
    }

    pub fn inline_source(&self) -> Option<&SourceSpec> {
        match &self.source {
            Some(LayerSource::Inline(spec)) => Some(spec),
            _ => None,
        }
    }

    pub fn has_interaction(&self) -> bool {
        self.popup.is_some() || self.tooltip.is_some() || self.hover_options.is_some()
    }

    /// The engine-facing part of the definition
    pub fn to_spec(&self) -> LayerSpec {
        LayerSpec {
            id: self.id.clone(),
            kind: self.kind.clone(),
            source: self.source_id(),
            source_layer: self.source_layer.clone(),
            paint: self.paint.clone(),
            layout: self.layout.clone(),
            filter: self.filter.clone(),
            minzoom: self.minzoom,
            maxzoom: self.maxzoom,
            slot: self.slot.clone(),
        }
    }
}
