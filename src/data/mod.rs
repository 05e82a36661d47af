pub mod conversion;
pub mod expression;
pub mod geojson;
