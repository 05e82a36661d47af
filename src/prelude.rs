//! Prelude module for common mapgl types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use mapgl::prelude::*;`

pub use crate::core::{
    bundle::RenderBundle,
    config::{EngineFlavor, GeocoderConfig, InteractionConfig, QueryConfig, SwapConfig, WidgetConfig},
    geo::{Camera, LngLat, LngLatBounds, ScreenPoint},
    map::{MapWidget, WidgetPhase},
    registry::WidgetRegistry,
};

pub use crate::data::{
    expression::{Binding, HoverPaint},
    geojson::{Feature, FeatureCollection, GeoJson, Geometry},
};

pub use crate::engine::{
    memory::MemoryEngine, ControlId, EngineError, EngineEvent, InteractionKind, LayerSpec,
    ListenerId, MapEngine, PopupId, RenderedFeature, SourceSpec, StyleRequest,
};

pub use crate::input::events::{ChannelHost, HostChannel, HostEvent, RecordingHost};

pub use crate::layers::{definition::LayerDefinition, state::LayerStateStore};

pub use crate::plugins::{
    draw::DrawOptions,
    geocoder::{GeocodeResult, Geocoder},
    query::{QueryGeometry, QueryRequest, QueryResult},
    turf::{TurfOperation, TurfRequest, Units},
};

pub use crate::proxy::message::Mutation;

pub use crate::style::swap::{RestoreOutcome, RestoreReport, StyleSwapManager, SwapPhase};

pub use crate::ui::legend::{LegendEntry, LegendRegistry};

pub use crate::{Error as MapError, Result};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};

pub use std::sync::{Arc, Mutex};
