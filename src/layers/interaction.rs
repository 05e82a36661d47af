//! Click and hover behaviour bound to layers.
//!
//! Each bound layer gets at most one engine listener per interaction kind; the
//! listener serves every binding of that layer (popup on click; tooltip and
//! hover styling on move/leave).

use serde_json::{Map, Value};

use crate::{
    core::{config::InteractionConfig, geo::LngLat},
    data::expression::{paint_default, Binding, HoverPaint},
    engine::{EngineResult, FeatureTarget, InteractionKind, ListenerId, MapEngine, RenderedFeature},
    layers::handlers::HandlerRegistry,
    prelude::HashMap,
    ui::popup::{PopupManager, PopupSpec},
};

#[derive(Debug, Default)]
struct LayerBindings {
    popup: Option<Binding>,
    tooltip: Option<Binding>,
    hover: Vec<(String, HoverPaint)>,
    /// Hover values of properties with no base yet; wrapped once one is written
    pending_hover: Vec<(String, Value)>,
    hovered: Option<FeatureTarget>,
}

impl LayerBindings {
    fn tracks_hover(&self) -> bool {
        !self.hover.is_empty() || !self.pending_hover.is_empty()
    }

    fn needed_kinds(&self) -> Vec<InteractionKind> {
        let mut kinds = Vec::new();
        if self.tooltip.is_some() || self.tracks_hover() {
            kinds.push(InteractionKind::HoverMove);
            kinds.push(InteractionKind::HoverLeave);
        }
        if self.popup.is_some() {
            kinds.push(InteractionKind::Click);
        }
        kinds
    }

    fn is_empty(&self) -> bool {
        self.popup.is_none() && self.tooltip.is_none() && !self.tracks_hover()
    }
}

pub struct InteractionBinder {
    handlers: HandlerRegistry,
    popups: PopupManager,
    bindings: HashMap<String, LayerBindings>,
    config: InteractionConfig,
}

impl InteractionBinder {
    pub fn new(config: &InteractionConfig) -> Self {
        Self {
            handlers: HandlerRegistry::new(),
            popups: PopupManager::new(),
            bindings: HashMap::default(),
            config: config.clone(),
        }
    }

    pub fn state_key(&self) -> &str {
        &self.config.hover_state_key
    }

    /// Registers exactly the listeners a layer's bindings need
    fn sync_handlers(&mut self, engine: &mut dyn MapEngine, layer_id: &str) {
        let needed = self
            .bindings
            .get(layer_id)
            .map(LayerBindings::needed_kinds)
            .unwrap_or_default();
        for kind in InteractionKind::ALL {
            if needed.contains(&kind) {
                self.handlers.ensure(engine, layer_id, kind);
            } else {
                self.handlers.detach(engine, layer_id, kind);
            }
        }
        if self.bindings.get(layer_id).is_some_and(LayerBindings::is_empty) {
            self.bindings.remove(layer_id);
        }
    }

    /// Shows `binding` in a popup when a feature of the layer is clicked; `None` unbinds
    pub fn attach_popup(&mut self, engine: &mut dyn MapEngine, layer_id: &str, binding: Option<Binding>) {
        if binding.is_none() {
            self.popups.close_layer(engine, layer_id);
        }
        self.bindings.entry(layer_id.to_string()).or_default().popup = binding;
        self.sync_handlers(engine, layer_id);
    }

    /// Shows `binding` in the map-wide tooltip while hovering the layer; `None` unbinds
    pub fn attach_tooltip(&mut self, engine: &mut dyn MapEngine, layer_id: &str, binding: Option<Binding>) {
        if binding.is_none() {
            self.popups.hide_tooltip(engine, layer_id);
        }
        self.bindings.entry(layer_id.to_string()).or_default().tooltip = binding;
        self.sync_handlers(engine, layer_id);
    }

    /// Applies hover paint overrides to a layer and tracks hover feature state.
    ///
    /// The base of a property is, in order: the stored base of an earlier call,
    /// `base_of`, the engine's current value, the style default. A property with
    /// none of these is left unwrapped until a base is written, but the layer's
    /// hover state is tracked either way. Returns the number of properties wrapped.
    pub fn attach_hover(
        &mut self,
        engine: &mut dyn MapEngine,
        layer_id: &str,
        overrides: &Map<String, Value>,
        base_of: impl Fn(&str) -> Option<Value>,
    ) -> EngineResult<usize> {
        let key = self.config.hover_state_key.clone();
        let bindings = self.bindings.entry(layer_id.to_string()).or_default();
        let mut wrapped = 0;
        for (name, hover) in overrides {
            let existing = bindings.hover.iter().position(|(n, _)| n == name);
            let base = match existing {
                Some(i) => Some(bindings.hover[i].1.base.clone()),
                None => base_of(name)
                    .or_else(|| engine.paint_property(layer_id, name))
                    .filter(|v| !v.is_null())
                    .or_else(|| paint_default(name)),
            };
            bindings.pending_hover.retain(|(n, _)| n != name);
            let Some(base) = base else {
                log::debug!(
                    "layer '{}' has no base value for '{}', hover paint waits for one",
                    layer_id,
                    name
                );
                bindings.pending_hover.push((name.clone(), hover.clone()));
                continue;
            };
            let paint = HoverPaint::new(base, hover.clone());
            engine.set_paint_property(layer_id, name, &paint.to_expression(&key))?;
            match existing {
                Some(i) => bindings.hover[i].1 = paint,
                None => bindings.hover.push((name.clone(), paint)),
            }
            wrapped += 1;
        }
        self.sync_handlers(engine, layer_id);
        Ok(wrapped)
    }

    /// Value to write for a paint property whose base changed. Hover-wrapped
    /// properties keep their hover branch; a null base wraps the style default,
    /// or unwraps the property when there is none.
    pub fn paint_for_write(&mut self, layer_id: &str, name: &str, base: &Value) -> Value {
        let key = self.config.hover_state_key.clone();
        let Some(bindings) = self.bindings.get_mut(layer_id) else {
            return base.clone();
        };
        let wrapped = bindings.hover.iter().position(|(n, _)| n == name);
        let pending = bindings.pending_hover.iter().position(|(n, _)| n == name);
        if wrapped.is_none() && pending.is_none() {
            return base.clone();
        }

        let base = match base {
            Value::Null => paint_default(name),
            other => Some(other.clone()),
        };
        match (wrapped, base) {
            (Some(i), Some(base)) => {
                bindings.hover[i].1.base = base;
                bindings.hover[i].1.to_expression(&key)
            }
            (Some(i), None) => {
                let (name, paint) = bindings.hover.remove(i);
                bindings.pending_hover.push((name, paint.hover));
                Value::Null
            }
            (None, Some(base)) => {
                let Some(i) = pending else {
                    return base;
                };
                let (name, hover) = bindings.pending_hover.remove(i);
                let paint = HoverPaint::new(base, hover);
                let value = paint.to_expression(&key);
                bindings.hover.push((name, paint));
                value
            }
            (None, None) => Value::Null,
        }
    }

    pub fn hover_paint(&self, layer_id: &str, name: &str) -> Option<&HoverPaint> {
        self.bindings
            .get(layer_id)?
            .hover
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| p)
    }

    /// Hover-wrapped properties of a layer with their current values
    pub fn hover_paints(&self, layer_id: &str) -> Vec<(String, HoverPaint)> {
        self.bindings
            .get(layer_id)
            .map(|b| b.hover.clone())
            .unwrap_or_default()
    }

    pub fn hovered(&self, layer_id: &str) -> Option<&FeatureTarget> {
        self.bindings.get(layer_id)?.hovered.as_ref()
    }

    pub fn is_bound(&self, layer_id: &str) -> bool {
        self.bindings.contains_key(layer_id)
    }

    pub fn bound_layers(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn popups(&self) -> &PopupManager {
        &self.popups
    }

    /// Detaches and re-registers a layer's listeners. Returns how many were attached.
    pub fn reattach(&mut self, engine: &mut dyn MapEngine, layer_id: &str) -> usize {
        if let Some(bindings) = self.bindings.get_mut(layer_id) {
            bindings.hovered = None;
        }
        self.handlers.reattach(engine, layer_id)
    }

    /// Rewrites hover wrappers from stored base and hover values
    pub fn rewrap(&self, engine: &mut dyn MapEngine, layer_id: &str) -> EngineResult<usize> {
        let key = &self.config.hover_state_key;
        let paints = self.hover_paints(layer_id);
        for (name, paint) in &paints {
            engine.set_paint_property(layer_id, name, &paint.to_expression(key))?;
        }
        Ok(paints.len())
    }

    /// Forgets hovered features, whose state the engine dropped with the old style
    pub fn reset_hover_state(&mut self) {
        for bindings in self.bindings.values_mut() {
            bindings.hovered = None;
        }
    }

    /// Removes every binding and listener of a removed layer
    pub fn detach_layer(&mut self, engine: &mut dyn MapEngine, layer_id: &str) {
        if let Some(bindings) = self.bindings.remove(layer_id) {
            if let Some(target) = bindings.hovered {
                if let Err(e) = engine.remove_feature_state(&target, Some(self.config.hover_state_key.as_str())) {
                    log::debug!("clearing hover state of '{}': {}", layer_id, e);
                }
            }
        }
        self.popups.close_layer(engine, layer_id);
        self.handlers.detach_layer(engine, layer_id);
    }

    fn set_hover(&self, engine: &mut dyn MapEngine, target: &FeatureTarget, on: bool) {
        let mut state = Map::new();
        state.insert(self.config.hover_state_key.clone(), Value::Bool(on));
        if let Err(e) = engine.set_feature_state(target, &state) {
            log::debug!("feature state for '{}' in '{}': {}", target.id, target.source, e);
        }
    }

    /// Handles a pointer event for a layer listener. Returns false for listeners
    /// this binder does not own.
    pub fn handle_pointer(
        &mut self,
        engine: &mut dyn MapEngine,
        listener: ListenerId,
        lng_lat: LngLat,
        features: &[RenderedFeature],
    ) -> bool {
        let Some((layer_id, kind)) = self
            .handlers
            .lookup(listener)
            .map(|(layer, kind)| (layer.to_string(), kind))
        else {
            return false;
        };
        let Some(bindings) = self.bindings.get_mut(&layer_id) else {
            return true;
        };
        let first = features.first();

        match kind {
            InteractionKind::HoverMove => {
                if !bindings.hover.is_empty() {
                    let next = first.and_then(RenderedFeature::target);
                    if next != bindings.hovered {
                        let previous = std::mem::replace(&mut bindings.hovered, next.clone());
                        if let Some(previous) = previous {
                            self.set_hover(engine, &previous, false);
                        }
                        if let Some(next) = next {
                            self.set_hover(engine, &next, true);
                        }
                    }
                }
                let tooltip = self
                    .bindings
                    .get(&layer_id)
                    .and_then(|b| b.tooltip.as_ref());
                if let (Some(binding), Some(feature)) = (tooltip, first) {
                    let html = binding.render(&feature.feature.properties_or_empty());
                    let spec = PopupSpec::tooltip(
                        lng_lat,
                        html,
                        &self.config.popup_max_width,
                        self.config.tooltip_offset,
                    );
                    self.popups.show_tooltip(engine, &layer_id, &spec);
                }
            }
            InteractionKind::HoverLeave => {
                if let Some(previous) = bindings.hovered.take() {
                    self.set_hover(engine, &previous, false);
                }
                self.popups.hide_tooltip(engine, &layer_id);
            }
            InteractionKind::Click => {
                if let (Some(binding), Some(feature)) = (bindings.popup.as_ref(), first) {
                    let html = binding.render(&feature.feature.properties_or_empty());
                    let spec = PopupSpec::popup(lng_lat, html, &self.config.popup_max_width);
                    self.popups.show_popup(engine, &layer_id, &spec);
                }
            }
        }
        true
    }
}
