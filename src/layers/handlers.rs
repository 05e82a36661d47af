use crate::{
    engine::{InteractionKind, ListenerId, MapEngine},
    prelude::HashMap,
};

/// Engine listeners attached per layer, at most one per interaction kind.
///
/// The engine's `on` is additive, so every registration first detaches the
/// listener it replaces.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    by_layer: HashMap<String, HashMap<InteractionKind, ListenerId>>,
    by_listener: HashMap<ListenerId, (String, InteractionKind)>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a fresh listener for `(layer_id, kind)`, detaching any previous one
    pub fn register(&mut self, engine: &mut dyn MapEngine, layer_id: &str, kind: InteractionKind) -> ListenerId {
        self.detach(engine, layer_id, kind);
        let listener = engine.on(kind, Some(layer_id));
        self.by_layer
            .entry(layer_id.to_string())
            .or_default()
            .insert(kind, listener);
        self.by_listener
            .insert(listener, (layer_id.to_string(), kind));
        listener
    }

    /// Attaches a listener only if none is registered for `(layer_id, kind)`
    pub fn ensure(&mut self, engine: &mut dyn MapEngine, layer_id: &str, kind: InteractionKind) -> ListenerId {
        match self.listener(layer_id, kind) {
            Some(listener) => listener,
            None => self.register(engine, layer_id, kind),
        }
    }

    pub fn detach(&mut self, engine: &mut dyn MapEngine, layer_id: &str, kind: InteractionKind) -> bool {
        let Some(listener) = self
            .by_layer
            .get_mut(layer_id)
            .and_then(|kinds| kinds.remove(&kind))
        else {
            return false;
        };
        engine.off(listener);
        self.by_listener.remove(&listener);
        if self.by_layer.get(layer_id).is_some_and(|kinds| kinds.is_empty()) {
            self.by_layer.remove(layer_id);
        }
        true
    }

    /// Detaches every listener of a layer
    pub fn detach_layer(&mut self, engine: &mut dyn MapEngine, layer_id: &str) {
        for kind in InteractionKind::ALL {
            self.detach(engine, layer_id, kind);
        }
    }

    /// Detaches and re-registers every listener a layer had
    pub fn reattach(&mut self, engine: &mut dyn MapEngine, layer_id: &str) -> usize {
        let kinds = self.kinds(layer_id);
        for kind in &kinds {
            self.register(engine, layer_id, *kind);
        }
        kinds.len()
    }

    pub fn listener(&self, layer_id: &str, kind: InteractionKind) -> Option<ListenerId> {
        self.by_layer.get(layer_id)?.get(&kind).copied()
    }

    /// Which layer and kind a listener was registered for
    pub fn lookup(&self, listener: ListenerId) -> Option<(&str, InteractionKind)> {
        self.by_listener
            .get(&listener)
            .map(|(layer, kind)| (layer.as_str(), *kind))
    }

    /// Kinds registered for a layer, in a fixed order
    pub fn kinds(&self, layer_id: &str) -> Vec<InteractionKind> {
        InteractionKind::ALL
            .into_iter()
            .filter(|kind| self.listener(layer_id, *kind).is_some())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_listener.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_listener.is_empty()
    }
}
