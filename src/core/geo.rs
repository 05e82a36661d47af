use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Mean earth radius in meters, as used by haversine math in the geometry bridge
pub const EARTH_RADIUS: f64 = 6_371_008.8;
/// Web Mercator latitude limit
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;
/// Size in pixels of the zoom-0 world (GL engines use 512px tiles)
pub const TILE_SIZE: f64 = 512.0;

/// A geographic coordinate, serialized as `[lng, lat]` like the GL engines do
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.lat >= -90.0 && self.lat <= 90.0 && self.lng >= -180.0 && self.lng <= 180.0
    }

    /// Calculates the distance to another coordinate using the Haversine formula
    pub fn distance_to(&self, other: &LngLat) -> f64 {
        let lat1_rad = self.lat.to_radians();
        let lat2_rad = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lng = (other.lng - self.lng).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS * c
    }

    /// Wraps longitude to [-180, 180] range
    pub fn wrap_lng(lng: f64) -> f64 {
        let wrapped = lng % 360.0;
        if wrapped > 180.0 {
            wrapped - 360.0
        } else if wrapped < -180.0 {
            wrapped + 360.0
        } else {
            wrapped
        }
    }

    /// Clamps latitude to the Web Mercator range
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }

    /// Position in zoom-0 world pixels (Web Mercator)
    pub fn to_world(&self) -> ScreenPoint {
        let lat_rad = Self::clamp_lat(self.lat).to_radians();
        let x = (self.lng + 180.0) / 360.0 * TILE_SIZE;
        let y = (1.0 - (PI / 4.0 + lat_rad / 2.0).tan().ln() / PI) / 2.0 * TILE_SIZE;
        ScreenPoint::new(x, y)
    }

    /// Inverse of [`LngLat::to_world`]
    pub fn from_world(point: ScreenPoint) -> Self {
        let lng = point.x / TILE_SIZE * 360.0 - 180.0;
        let n = PI * (1.0 - 2.0 * point.y / TILE_SIZE);
        let lat = n.sinh().atan().to_degrees();
        Self::new(lng, lat)
    }
}

impl Default for LngLat {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl From<[f64; 2]> for LngLat {
    fn from(value: [f64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(value: LngLat) -> Self {
        [value.lng, value.lat]
    }
}

/// A point in screen (container) pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &ScreenPoint) -> ScreenPoint {
        ScreenPoint::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &ScreenPoint) -> ScreenPoint {
        ScreenPoint::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> ScreenPoint {
        ScreenPoint::new(self.x * scalar, self.y * scalar)
    }
}

impl From<[f64; 2]> for ScreenPoint {
    fn from(value: [f64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<ScreenPoint> for [f64; 2] {
    fn from(value: ScreenPoint) -> Self {
        [value.x, value.y]
    }
}

/// Geographic bounding box.
///
/// Accepts both `[[west, south], [east, north]]` and `[west, south, east, north]`
/// on input; always serializes as the nested form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BoundsRepr", into = "[[f64; 2]; 2]")]
pub struct LngLatBounds {
    pub south_west: LngLat,
    pub north_east: LngLat,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoundsRepr {
    Nested([[f64; 2]; 2]),
    Flat(Vec<f64>),
}

impl TryFrom<BoundsRepr> for LngLatBounds {
    type Error = String;

    fn try_from(value: BoundsRepr) -> std::result::Result<Self, Self::Error> {
        match value {
            BoundsRepr::Nested([sw, ne]) => Ok(Self::new(sw.into(), ne.into())),
            BoundsRepr::Flat(v) if v.len() == 4 => Ok(Self::from_coords(v[0], v[1], v[2], v[3])),
            BoundsRepr::Flat(v) => Err(format!("bounds need 4 numbers, got {}", v.len())),
        }
    }
}

impl From<LngLatBounds> for [[f64; 2]; 2] {
    fn from(value: LngLatBounds) -> Self {
        [value.south_west.into(), value.north_east.into()]
    }
}

impl LngLatBounds {
    pub fn new(south_west: LngLat, north_east: LngLat) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Creates bounds from `west, south, east, north`
    pub fn from_coords(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self::new(LngLat::new(west, south), LngLat::new(east, north))
    }

    /// Whole Web Mercator world
    pub fn world() -> Self {
        Self::from_coords(-180.0, -MAX_LATITUDE, 180.0, MAX_LATITUDE)
    }

    /// Checks if the bounds contain a point
    pub fn contains(&self, point: &LngLat) -> bool {
        point.lat >= self.south_west.lat
            && point.lat <= self.north_east.lat
            && point.lng >= self.south_west.lng
            && point.lng <= self.north_east.lng
    }

    /// Checks if the bounds intersect with another bounds
    pub fn intersects(&self, other: &LngLatBounds) -> bool {
        !(other.north_east.lat < self.south_west.lat
            || other.south_west.lat > self.north_east.lat
            || other.north_east.lng < self.south_west.lng
            || other.south_west.lng > self.north_east.lng)
    }

    /// Extends the bounds to include a point
    pub fn extend(&mut self, point: &LngLat) {
        self.south_west.lat = self.south_west.lat.min(point.lat);
        self.south_west.lng = self.south_west.lng.min(point.lng);
        self.north_east.lat = self.north_east.lat.max(point.lat);
        self.north_east.lng = self.north_east.lng.max(point.lng);
    }

    /// Gets the center point of the bounds
    pub fn center(&self) -> LngLat {
        LngLat::new(
            (self.south_west.lng + self.north_east.lng) / 2.0,
            (self.south_west.lat + self.north_east.lat) / 2.0,
        )
    }

    /// `[west, south, east, north]`
    pub fn to_bbox(&self) -> [f64; 4] {
        [
            self.south_west.lng,
            self.south_west.lat,
            self.north_east.lng,
            self.north_east.lat,
        ]
    }
}

/// Camera state of a map instance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub center: LngLat,
    pub zoom: f64,
    #[serde(default)]
    pub bearing: f64,
    #[serde(default)]
    pub pitch: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            center: LngLat::default(),
            zoom: 0.0,
            bearing: 0.0,
            pitch: 0.0,
        }
    }
}

impl Camera {
    fn scale(&self) -> f64 {
        2_f64.powf(self.zoom)
    }

    /// Geographic coordinate to container pixel, ignoring bearing and pitch
    pub fn project(&self, size: ScreenPoint, lng_lat: &LngLat) -> ScreenPoint {
        let scale = self.scale();
        let center = self.center.to_world().multiply(scale);
        let point = lng_lat.to_world().multiply(scale);
        point
            .subtract(&center)
            .add(&ScreenPoint::new(size.x / 2.0, size.y / 2.0))
    }

    /// Container pixel to geographic coordinate
    pub fn unproject(&self, size: ScreenPoint, point: &ScreenPoint) -> LngLat {
        let scale = self.scale();
        let center = self.center.to_world().multiply(scale);
        let world = point
            .subtract(&ScreenPoint::new(size.x / 2.0, size.y / 2.0))
            .add(&center)
            .multiply(1.0 / scale);
        LngLat::from_world(world)
    }

    /// Visible bounds for a container of `size` pixels
    pub fn visible_bounds(&self, size: ScreenPoint) -> LngLatBounds {
        let nw = self.unproject(size, &ScreenPoint::new(0.0, 0.0));
        let se = self.unproject(size, &size);
        LngLatBounds::new(LngLat::new(nw.lng, se.lat), LngLat::new(se.lng, nw.lat))
    }

    /// Camera that fits `bounds` inside a container, leaving `padding` pixels on every side
    pub fn fitting(bounds: &LngLatBounds, size: ScreenPoint, padding: f64, max_zoom: Option<f64>) -> Self {
        let nw = LngLat::new(bounds.south_west.lng, bounds.north_east.lat).to_world();
        let se = LngLat::new(bounds.north_east.lng, bounds.south_west.lat).to_world();
        let span_x = (se.x - nw.x).abs().max(f64::EPSILON);
        let span_y = (se.y - nw.y).abs().max(f64::EPSILON);
        let avail_x = (size.x - 2.0 * padding).max(1.0);
        let avail_y = (size.y - 2.0 * padding).max(1.0);

        let mut zoom = (avail_x / span_x).min(avail_y / span_y).log2();
        if let Some(max) = max_zoom {
            zoom = zoom.min(max);
        }

        let center = LngLat::from_world(ScreenPoint::new((nw.x + se.x) / 2.0, (nw.y + se.y) / 2.0));
        Self {
            center,
            zoom: zoom.max(0.0),
            bearing: 0.0,
            pitch: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lng_lat_serde_as_array() {
        let coord: LngLat = serde_json::from_str("[-122.4, 37.7]").unwrap();
        assert_eq!(coord.lng, -122.4);
        assert_eq!(coord.lat, 37.7);
        assert_eq!(serde_json::to_string(&coord).unwrap(), "[-122.4,37.7]");
    }

    #[test]
    fn test_lng_lat_distance() {
        let nyc = LngLat::new(-74.0060, 40.7128);
        let la = LngLat::new(-118.2437, 34.0522);
        let distance = nyc.distance_to(&la);

        // Distance should be approximately 3944 km
        assert!((distance - 3944000.0).abs() < 10000.0);
    }

    #[test]
    fn test_bounds_both_encodings() {
        let nested: LngLatBounds = serde_json::from_str("[[-75, 40], [-73, 41]]").unwrap();
        let flat: LngLatBounds = serde_json::from_str("[-75, 40, -73, 41]").unwrap();
        assert_eq!(nested, flat);
        assert!(nested.contains(&LngLat::new(-74.0, 40.5)));
        assert!(!nested.contains(&LngLat::new(-74.0, 42.0)));
        assert!(serde_json::from_str::<LngLatBounds>("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_project_round_trip() {
        let camera = Camera {
            center: LngLat::new(-122.4, 37.7),
            zoom: 10.0,
            ..Default::default()
        };
        let size = ScreenPoint::new(800.0, 600.0);
        let center_px = camera.project(size, &camera.center);
        assert!((center_px.x - 400.0).abs() < 1e-6);
        assert!((center_px.y - 300.0).abs() < 1e-6);

        let back = camera.unproject(size, &ScreenPoint::new(100.0, 50.0));
        let again = camera.project(size, &back);
        assert!((again.x - 100.0).abs() < 1e-6);
        assert!((again.y - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_fitting_contains_bounds() {
        let bounds = LngLatBounds::from_coords(-123.0, 37.0, -122.0, 38.0);
        let size = ScreenPoint::new(800.0, 600.0);
        let camera = Camera::fitting(&bounds, size, 20.0, None);
        let visible = camera.visible_bounds(size);
        assert!(visible.contains(&bounds.south_west));
        assert!(visible.contains(&bounds.north_east));
    }
}
