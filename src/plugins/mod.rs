pub mod draw;
pub mod geocoder;
pub mod geometry;
pub mod query;
pub mod turf;

pub use draw::{DrawOptions, DrawState};
pub use geocoder::{GeocodeResult, Geocoder};
pub use query::{QueryGeometry, QueryRequest, QueryResult};
pub use turf::{TurfOperation, TurfRequest, Units};
