//! # mapgl
//!
//! Widget runtime for Mapbox GL JS / MapLibre GL JS maps driven from a host
//! application such as an R/Shiny session.
//!
//! A host serializes a [`RenderBundle`](core::bundle::RenderBundle) once and then
//! streams [`Mutation`](proxy::message::Mutation) messages. The runtime applies them
//! against a live [`MapEngine`](engine::MapEngine), keeps per-instance registries of
//! everything the host changed, and replays that state whenever the basemap style
//! is swapped underneath it.

pub mod core;
pub mod data;
pub mod engine;
pub mod input;
pub mod layers;
pub mod plugins;
pub mod prelude;
pub mod proxy;
pub mod spatial;
pub mod style;
pub mod ui;

// Re-export public API
pub use core::{
    bundle::RenderBundle,
    config::{EngineFlavor, WidgetConfig},
    geo::{Camera, LngLat, LngLatBounds},
    map::MapWidget,
    registry::WidgetRegistry,
};

pub use engine::{memory::MemoryEngine, EngineError, EngineEvent, MapEngine};

pub use input::events::{HostChannel, HostEvent, RecordingHost};

pub use proxy::message::Mutation;

pub use style::swap::{RestoreReport, SwapPhase};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Missing library: {0}")]
    MissingLibrary(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Layer error: {0}")]
    Layer(String),

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Geometry input error: {0}")]
    GeometryInput(#[from] plugins::turf::InputError),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown map widget: {0}")]
    UnknownWidget(String),

    #[error("Map widget {0} is not usable after a fatal error")]
    Unusable(String),
}

/// Error type alias for convenience
pub type Error = MapError;

/// Initialise `env_logger` once. Safe to call repeatedly.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
