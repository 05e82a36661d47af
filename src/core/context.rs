//! Per-widget registries.
//!
//! Everything the host changed on a map lives here rather than in globals, so
//! two maps on one page never see each other's layers, legends or handlers.

use serde_json::{Map, Value};

use crate::{
    core::config::WidgetConfig,
    engine::{ImageData, InteractionKind, ListenerId},
    layers::{interaction::InteractionBinder, marker::MarkerRegistry, state::LayerStateStore},
    plugins::{draw::DrawState, geocoder::Geocoder, query::QueryResult},
    prelude::{Arc, HashMap},
    ui::{controls::ControlRegistry, legend::LegendRegistry},
};

/// An image the host added, kept for replay after a style swap
#[derive(Debug, Clone, PartialEq)]
pub struct UserImage {
    pub id: String,
    pub data: ImageData,
    pub options: Map<String, Value>,
}

/// An image whose load has not finished yet
#[derive(Debug, Clone, PartialEq)]
pub struct PendingImage {
    pub id: String,
    pub url: String,
    pub options: Map<String, Value>,
}

pub struct MapContext {
    pub map_id: String,
    pub config: WidgetConfig,
    pub binder: InteractionBinder,
    pub layer_state: LayerStateStore,
    pub legends: LegendRegistry,
    pub controls: ControlRegistry,
    pub markers: MarkerRegistry,
    pub draw: DrawState,
    pub geocoder: Option<Arc<Geocoder>>,
    pub images: Vec<UserImage>,
    pub pending_images: HashMap<ListenerId, PendingImage>,
    /// Map-wide (not layer-bound) listeners used for host reporting
    pub map_listeners: Vec<(InteractionKind, ListenerId)>,
    pub last_query: Option<QueryResult>,
}

impl MapContext {
    pub fn new(map_id: &str, config: WidgetConfig) -> Self {
        Self {
            map_id: map_id.to_string(),
            binder: InteractionBinder::new(&config.interaction),
            layer_state: LayerStateStore::new(),
            legends: LegendRegistry::new(),
            controls: ControlRegistry::new(),
            markers: MarkerRegistry::new(),
            draw: DrawState::new(),
            geocoder: None,
            images: Vec::new(),
            pending_images: HashMap::default(),
            map_listeners: Vec::new(),
            last_query: None,
            config,
        }
    }

    /// Records a loaded image, replacing an earlier one with the same id
    pub fn remember_image(&mut self, image: UserImage) {
        self.images.retain(|i| i.id != image.id);
        self.images.push(image);
    }

    pub fn map_listener_kind(&self, listener: ListenerId) -> Option<InteractionKind> {
        self.map_listeners
            .iter()
            .find(|(_, id)| *id == listener)
            .map(|(kind, _)| *kind)
    }
}
