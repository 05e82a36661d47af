//! The render bundle: everything a host serializes to create a map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    core::{
        config::WidgetConfig,
        geo::{Camera, LngLat, LngLatBounds},
    },
    engine::{CameraMove, CameraOptions, MapOptions, SourceSpec},
    layers::{definition::LayerDefinition, marker::MarkerSpec},
    ui::{controls::ControlSpec, legend::LegendEntry},
    MapError, Result,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSource {
    pub id: String,
    #[serde(flatten)]
    pub source: SourceSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigProperty {
    #[serde(default = "default_import")]
    pub import_id: String,
    #[serde(alias = "config_name")]
    pub name: String,
    pub value: Value,
}

fn default_import() -> String {
    "basemap".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleLegend {
    pub id: String,
    #[serde(flatten)]
    pub entry: LegendEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleImage {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitBounds {
    pub bounds: LngLatBounds,
    #[serde(default)]
    pub padding: Option<f64>,
    #[serde(default, alias = "maxZoom")]
    pub max_zoom: Option<f64>,
    #[serde(default)]
    pub animate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderBundle {
    pub style: Value,
    pub center: LngLat,
    pub zoom: f64,
    pub bearing: f64,
    pub pitch: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bounds: Option<LngLatBounds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,
    pub sources: Vec<BundleSource>,
    pub layers: Vec<LayerDefinition>,
    pub markers: Vec<MarkerSpec>,
    pub controls: Vec<ControlSpec>,
    pub images: Vec<BundleImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terrain: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fog: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rain: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snow: Option<Value>,
    pub config_properties: Vec<ConfigProperty>,
    pub legends: Vec<BundleLegend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit_bounds: Option<FitBounds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fly_to: Option<CameraOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ease_to: Option<CameraOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jump_to: Option<CameraOptions>,
    /// Runtime settings; not part of the map itself
    pub widget: WidgetConfig,
    /// Options passed through to the map constructor untouched
    pub map_options: Map<String, Value>,
}

impl Default for RenderBundle {
    fn default() -> Self {
        Self {
            style: Value::String("streets".to_string()),
            center: LngLat::new(0.0, 0.0),
            zoom: 0.0,
            bearing: 0.0,
            pitch: 0.0,
            projection: None,
            max_bounds: None,
            min_zoom: None,
            max_zoom: None,
            sources: Vec::new(),
            layers: Vec::new(),
            markers: Vec::new(),
            controls: Vec::new(),
            images: Vec::new(),
            terrain: None,
            fog: None,
            rain: None,
            snow: None,
            config_properties: Vec::new(),
            legends: Vec::new(),
            fit_bounds: None,
            fly_to: None,
            ease_to: None,
            jump_to: None,
            widget: WidgetConfig::default(),
            map_options: Map::new(),
        }
    }
}

impl RenderBundle {
    pub fn new(style: &str, center: LngLat, zoom: f64) -> Self {
        Self {
            style: Value::String(style.to_string()),
            center,
            zoom,
            ..Default::default()
        }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| MapError::ParseError(format!("Invalid render bundle: {}", e)))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| MapError::ParseError(format!("Invalid render bundle: {}", e)))
    }

    pub fn with_source(mut self, id: &str, source: SourceSpec) -> Self {
        self.sources.push(BundleSource {
            id: id.to_string(),
            source,
        });
        self
    }

    pub fn with_layer(mut self, layer: LayerDefinition) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn with_control(mut self, control: ControlSpec) -> Self {
        self.controls.push(control);
        self
    }

    /// Constructor options for the engine map
    pub fn map_options(&self) -> MapOptions {
        MapOptions {
            style: self.style.clone(),
            camera: Camera {
                center: self.center,
                zoom: self.zoom,
                bearing: self.bearing,
                pitch: self.pitch,
            },
            projection: self.projection.clone(),
            max_bounds: self.max_bounds,
            min_zoom: self.min_zoom,
            max_zoom: self.max_zoom,
            extra: self.map_options.clone(),
        }
    }

    /// View commands in the order they run: fit, fly, ease, jump
    pub fn view_moves(&self) -> Vec<CameraMove> {
        let mut moves = Vec::new();
        if let Some(fit) = &self.fit_bounds {
            moves.push(CameraMove::FitBounds {
                bounds: fit.bounds,
                padding: fit.padding,
                max_zoom: fit.max_zoom,
                animate: fit.animate,
            });
        }
        if let Some(options) = &self.fly_to {
            moves.push(CameraMove::FlyTo(options.clone()));
        }
        if let Some(options) = &self.ease_to {
            moves.push(CameraMove::EaseTo(options.clone()));
        }
        if let Some(options) = &self.jump_to {
            moves.push(CameraMove::JumpTo(options.clone()));
        }
        moves
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bundle_parsing() {
        let bundle = RenderBundle::from_value(json!({
            "style": "mapbox://styles/mapbox/light-v11",
            "center": [-96.0, 37.5],
            "zoom": 3,
            "sources": [{"id": "counties", "type": "geojson", "data": {"type": "FeatureCollection", "features": []}}],
            "layers": [{"id": "counties-fill", "type": "fill", "source": "counties"}],
            "controls": [{"type": "navigation"}, {"type": "scale", "position": "bottom-left"}],
            "legends": [{"id": "legend-1", "html": "<div>legend</div>"}],
            "config_properties": [{"name": "lightPreset", "value": "dusk"}],
            "fit_bounds": {"bounds": [-100, 30, -90, 40], "padding": 20},
            "jump_to": {"zoom": 5},
            "widget": {"flavor": "maplibre"}
        }))
        .unwrap();

        assert_eq!(bundle.sources[0].id, "counties");
        assert!(bundle.sources[0].source.is_geojson());
        assert_eq!(bundle.legends[0].entry.html, "<div>legend</div>");
        assert_eq!(bundle.config_properties[0].import_id, "basemap");
        assert_eq!(bundle.widget.flavor, crate::core::config::EngineFlavor::Maplibre);

        let moves = bundle.view_moves();
        assert_eq!(moves.len(), 2);
        assert!(matches!(moves[0], CameraMove::FitBounds { .. }));
        assert_eq!(bundle.map_options().camera.zoom, 3.0);
    }

    #[test]
    fn test_defaults() {
        let bundle = RenderBundle::from_json("{}").unwrap();
        assert_eq!(bundle.style, json!("streets"));
        assert!(bundle.layers.is_empty());
        assert!(RenderBundle::from_json(r#"{"layers": 3}"#).is_err());
    }
}
