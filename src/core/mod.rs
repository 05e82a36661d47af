pub mod bundle;
pub mod config;
pub mod context;
pub mod geo;
pub mod map;
pub mod registry;
