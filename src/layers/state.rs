//! Layer State Snapshot: everything the host changed on a layer after adding it.
//!
//! Paint values are stored as base values only. Hover overrides live with the
//! interaction binder and are combined with the base value when written.

use crate::{data::expression::Binding, prelude::HashMap};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Host-applied state for one layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerState {
    /// `Some(Value::Null)` records an explicit filter removal
    pub filter: Option<Value>,
    pub paint: Map<String, Value>,
    pub layout: Map<String, Value>,
    /// `(minzoom, maxzoom)` from the last zoom range change
    pub zoom_range: Option<(Option<f64>, Option<f64>)>,
    pub tooltip: Option<Binding>,
    pub popup: Option<Binding>,
}

impl LayerState {
    pub fn is_empty(&self) -> bool {
        self.filter.is_none()
            && self.paint.is_empty()
            && self.layout.is_empty()
            && self.zoom_range.is_none()
            && self.tooltip.is_none()
            && self.popup.is_none()
    }
}

/// Snapshot entries keyed by layer id, iterated in the order layers were first touched
#[derive(Debug, Default, Clone)]
pub struct LayerStateStore {
    states: HashMap<String, LayerState>,
    order: Vec<String>,
}

impl LayerStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, layer_id: &str) -> &mut LayerState {
        if !self.states.contains_key(layer_id) {
            self.order.push(layer_id.to_string());
        }
        self.states.entry(layer_id.to_string()).or_default()
    }

    pub fn record_filter(&mut self, layer_id: &str, filter: Option<&Value>) {
        self.entry(layer_id).filter = Some(filter.cloned().unwrap_or(Value::Null));
    }

    pub fn record_paint(&mut self, layer_id: &str, name: &str, value: &Value) {
        self.entry(layer_id)
            .paint
            .insert(name.to_string(), value.clone());
    }

    pub fn record_layout(&mut self, layer_id: &str, name: &str, value: &Value) {
        self.entry(layer_id)
            .layout
            .insert(name.to_string(), value.clone());
    }

    pub fn record_zoom_range(&mut self, layer_id: &str, min: Option<f64>, max: Option<f64>) {
        self.entry(layer_id).zoom_range = Some((min, max));
    }

    pub fn record_tooltip(&mut self, layer_id: &str, binding: Option<&Binding>) {
        self.entry(layer_id).tooltip = binding.cloned();
    }

    pub fn record_popup(&mut self, layer_id: &str, binding: Option<&Binding>) {
        self.entry(layer_id).popup = binding.cloned();
    }

    pub fn get(&self, layer_id: &str) -> Option<&LayerState> {
        self.states.get(layer_id)
    }

    /// Base value of a paint property, if the host set one
    pub fn paint_base(&self, layer_id: &str, name: &str) -> Option<&Value> {
        self.states.get(layer_id)?.paint.get(name)
    }

    /// Drops the entry for a removed layer
    pub fn remove(&mut self, layer_id: &str) -> Option<LayerState> {
        self.order.retain(|id| id != layer_id);
        self.states.remove(layer_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LayerState)> {
        self.order
            .iter()
            .filter_map(|id| self.states.get(id).map(|s| (id.as_str(), s)))
    }

    pub fn layer_ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entries_only_for_touched_layers() {
        let mut store = LayerStateStore::new();
        assert!(store.get("counties").is_none());

        store.record_paint("counties", "fill-color", &json!("#ff0000"));
        store.record_filter("roads", Some(&json!(["==", "class", "primary"])));
        store.record_paint("counties", "fill-opacity", &json!(0.5));

        assert_eq!(store.layer_ids(), vec!["counties", "roads"]);
        assert_eq!(store.paint_base("counties", "fill-color"), Some(&json!("#ff0000")));
    }

    #[test]
    fn test_filter_removal_is_recorded() {
        let mut store = LayerStateStore::new();
        store.record_filter("roads", None);
        assert_eq!(store.get("roads").unwrap().filter, Some(Value::Null));
        assert!(!store.get("roads").unwrap().is_empty());
    }

    #[test]
    fn test_zoom_range_is_recorded() {
        let mut store = LayerStateStore::new();
        store.record_zoom_range("water", Some(5.0), None);
        store.record_zoom_range("water", None, Some(12.0));
        assert_eq!(store.get("water").unwrap().zoom_range, Some((None, Some(12.0))));
    }

    #[test]
    fn test_remove_deletes_entry() {
        let mut store = LayerStateStore::new();
        store.record_layout("a", "visibility", &json!("none"));
        store.record_tooltip("b", Some(&Binding::Property("name".into())));
        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        assert_eq!(store.iter().map(|(id, _)| id).collect::<Vec<_>>(), vec!["b"]);
    }
}
