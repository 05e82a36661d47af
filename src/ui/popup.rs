use crate::{
    core::geo::LngLat,
    engine::{MapEngine, PopupId},
    prelude::HashMap,
};
use serde::{Deserialize, Serialize};

/// What a floating popup is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopupRole {
    /// Opened on click, one per layer
    Popup,
    /// Follows the pointer, one per map
    Tooltip,
    /// Static popup requested by the host
    Standalone,
}

/// A floating HTML popup anchored at a coordinate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopupSpec {
    pub role: PopupRole,
    pub lng_lat: LngLat,
    pub html: String,
    pub max_width: String,
    #[serde(default)]
    pub offset: Option<f64>,
    #[serde(default)]
    pub close_button: bool,
}

impl PopupSpec {
    pub fn popup(lng_lat: LngLat, html: String, max_width: &str) -> Self {
        Self {
            role: PopupRole::Popup,
            lng_lat,
            html,
            max_width: max_width.to_string(),
            offset: None,
            close_button: true,
        }
    }

    pub fn tooltip(lng_lat: LngLat, html: String, max_width: &str, offset: f64) -> Self {
        Self {
            role: PopupRole::Tooltip,
            lng_lat,
            html,
            max_width: max_width.to_string(),
            offset: Some(offset),
            close_button: false,
        }
    }
}

/// Tracks which popups are open so that each layer has at most one click popup
/// and the whole map has at most one tooltip.
#[derive(Debug, Default)]
pub struct PopupManager {
    layer_popups: HashMap<String, PopupId>,
    tooltip: Option<(String, PopupId)>,
}

impl PopupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a click popup for `layer_id`, replacing that layer's previous popup
    pub fn show_popup(&mut self, engine: &mut dyn MapEngine, layer_id: &str, spec: &PopupSpec) -> PopupId {
        if let Some(previous) = self.layer_popups.remove(layer_id) {
            engine.close_popup(previous);
        }
        let id = engine.open_popup(spec);
        self.layer_popups.insert(layer_id.to_string(), id);
        id
    }

    /// Opens the map-wide tooltip, closing whichever tooltip was open before
    pub fn show_tooltip(&mut self, engine: &mut dyn MapEngine, layer_id: &str, spec: &PopupSpec) -> PopupId {
        if let Some((_, previous)) = self.tooltip.take() {
            engine.close_popup(previous);
        }
        let id = engine.open_popup(spec);
        self.tooltip = Some((layer_id.to_string(), id));
        id
    }

    /// Closes the tooltip if it belongs to `layer_id`
    pub fn hide_tooltip(&mut self, engine: &mut dyn MapEngine, layer_id: &str) {
        if self.tooltip.as_ref().is_some_and(|(owner, _)| owner == layer_id) {
            if let Some((_, id)) = self.tooltip.take() {
                engine.close_popup(id);
            }
        }
    }

    /// Closes everything attached to a layer
    pub fn close_layer(&mut self, engine: &mut dyn MapEngine, layer_id: &str) {
        if let Some(id) = self.layer_popups.remove(layer_id) {
            engine.close_popup(id);
        }
        self.hide_tooltip(engine, layer_id);
    }

    pub fn tooltip_owner(&self) -> Option<&str> {
        self.tooltip.as_ref().map(|(owner, _)| owner.as_str())
    }

    pub fn visible_count(&self) -> usize {
        self.layer_popups.len() + usize::from(self.tooltip.is_some())
    }

    /// Forgets open popups without touching the engine (used after the engine dropped them)
    pub fn forget(&mut self) {
        self.layer_popups.clear();
        self.tooltip = None;
    }
}
