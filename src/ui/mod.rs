pub mod controls;
pub mod legend;
pub mod popup;

pub use controls::{ControlKind, ControlRegistry, ControlSpec};
pub use legend::{LegendEntry, LegendRegistry};
pub use popup::{PopupManager, PopupRole, PopupSpec};
