//! Widgets on one page, keyed by container id.

use serde_json::Value;

use crate::{
    core::map::MapWidget, engine::MapEngine, input::events::HostChannel, proxy::message::Mutation, MapError,
    Result,
};

/// Routes host messages to the widget they address
pub struct WidgetRegistry<E: MapEngine, H: HostChannel> {
    widgets: Vec<MapWidget<E, H>>,
}

impl<E: MapEngine, H: HostChannel> Default for WidgetRegistry<E, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: MapEngine, H: HostChannel> WidgetRegistry<E, H> {
    pub fn new() -> Self {
        Self { widgets: Vec::new() }
    }

    /// Adds a widget, replacing one with the same id
    pub fn insert(&mut self, widget: MapWidget<E, H>) -> Option<MapWidget<E, H>> {
        let previous = self.remove(widget.id());
        self.widgets.push(widget);
        previous
    }

    pub fn get(&self, id: &str) -> Option<&MapWidget<E, H>> {
        self.widgets.iter().find(|w| w.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut MapWidget<E, H>> {
        self.widgets.iter_mut().find(|w| w.id() == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<MapWidget<E, H>> {
        let index = self.widgets.iter().position(|w| w.id() == id)?;
        Some(self.widgets.remove(index))
    }

    pub fn dispatch(&mut self, id: &str, mutation: Mutation) -> Result<()> {
        match self.get_mut(id) {
            Some(widget) => widget.dispatch(mutation),
            None => {
                log::warn!("no map '{}' for {}", id, mutation.name());
                Err(MapError::UnknownWidget(id.to_string()))
            }
        }
    }

    pub fn dispatch_value(&mut self, id: &str, message: Value) -> Result<()> {
        self.dispatch(id, Mutation::from_value(message)?)
    }

    /// Pumps every widget; returns the number of engine events handled
    pub fn pump_all(&mut self) -> usize {
        self.widgets.iter_mut().map(MapWidget::pump).sum()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.widgets.iter().map(MapWidget::id).collect()
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }
}
