use crate::{
    data::geojson::{Feature, FeatureCollection},
    engine::{ControlId, MapEngine, Plugin},
    MapError, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Options for the drawing plugin control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawOptions {
    pub position: String,
    /// Freehand polygon drawing mode
    pub freehand: bool,
    pub simplify_freehand: bool,
    pub display_controls_default: bool,
    /// Per-tool toggles (`point`, `line_string`, `polygon`, `trash`, ...)
    pub controls: Map<String, Value>,
    pub default_mode: String,
    pub orientation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub styles: Option<Value>,
    /// Source whose features are loaded into the plugin once it is installed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            position: "top-left".to_string(),
            freehand: false,
            simplify_freehand: false,
            display_controls_default: true,
            controls: Map::new(),
            default_mode: "simple_select".to_string(),
            orientation: "vertical".to_string(),
            styles: None,
            source: None,
        }
    }
}

/// Mirror of the features held by the drawing plugin.
///
/// The collection is only ever replaced from the plugin itself, after a
/// create/update/delete event or an explicit request.
#[derive(Debug, Default)]
pub struct DrawState {
    control: Option<ControlId>,
    features: FeatureCollection,
    plugin_missing: bool,
}

impl DrawState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_installed(&self) -> bool {
        self.control.is_some()
    }

    pub fn control(&self) -> Option<ControlId> {
        self.control
    }

    /// Installs the drawing control. A missing plugin is logged the first time only.
    pub fn install(&mut self, engine: &mut dyn MapEngine, options: &DrawOptions) -> Result<ControlId> {
        if !engine.has_plugin(Plugin::Draw) {
            if !self.plugin_missing {
                log::error!("drawing plugin is not loaded; draw features are unavailable");
                self.plugin_missing = true;
            }
            return Err(MapError::MissingLibrary("draw".to_string()));
        }
        if let Some(previous) = self.control.take() {
            if let Err(e) = engine.remove_control(previous) {
                log::debug!("replacing draw control: {}", e);
            }
        }
        let id = engine.add_draw_control(options)?;
        self.control = Some(id);
        self.features = FeatureCollection::default();
        log::debug!("draw control installed (freehand: {})", options.freehand);
        Ok(id)
    }

    /// Forgets the control after it was removed through the control registry
    pub fn uninstall(&mut self) {
        self.control = None;
        self.features = FeatureCollection::default();
    }

    fn require(&self) -> Result<()> {
        if self.is_installed() {
            Ok(())
        } else {
            Err(MapError::Plugin("draw control is not installed".to_string()))
        }
    }

    /// Re-reads every drawn feature from the plugin
    pub fn snapshot(&mut self, engine: &dyn MapEngine) -> &FeatureCollection {
        if self.is_installed() {
            self.features = FeatureCollection::new(engine.draw_features());
        }
        &self.features
    }

    pub fn features(&self) -> &FeatureCollection {
        &self.features
    }

    /// Adds features to the plugin, returning the ids it assigned
    pub fn add_features(&mut self, engine: &mut dyn MapEngine, features: &[Feature]) -> Result<Vec<String>> {
        self.require()?;
        let mut ids = Vec::with_capacity(features.len());
        for feature in features {
            if feature.geometry.is_none() {
                log::debug!("skipping feature without geometry");
                continue;
            }
            ids.extend(engine.draw_add(feature)?);
        }
        self.snapshot(engine);
        Ok(ids)
    }

    pub fn clear(&mut self, engine: &mut dyn MapEngine) -> Result<()> {
        self.require()?;
        engine.draw_delete_all()?;
        self.snapshot(engine);
        Ok(())
    }

    /// Export form of the drawn features
    pub fn export(&self) -> Value {
        serde_json::to_value(&self.features).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_options_defaults() {
        let options: DrawOptions =
            serde_json::from_value(serde_json::json!({"freehand": true})).unwrap();
        assert!(options.freehand);
        assert_eq!(options.position, "top-left");
        assert_eq!(options.default_mode, "simple_select");
    }

    #[test]
    fn test_uninstalled_state_rejects_edits() {
        let state = DrawState::new();
        assert!(!state.is_installed());
        assert!(state.require().is_err());
        assert_eq!(state.export()["features"], serde_json::json!([]));
    }
}
