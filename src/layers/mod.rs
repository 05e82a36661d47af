pub mod definition;
pub mod handlers;
pub mod interaction;
pub mod marker;
pub mod state;

pub use definition::{LayerDefinition, LayerSource};
pub use handlers::HandlerRegistry;
pub use interaction::InteractionBinder;
pub use marker::{MarkerRegistry, MarkerSpec};
pub use state::{LayerState, LayerStateStore};
