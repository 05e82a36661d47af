//! Geodesic geometry algorithms behind the geometry operations.
//!
//! Distances are haversine on a sphere of radius [`EARTH_RADIUS`], areas use
//! the Chamberlain-Duquette approximation, and hulls and Voronoi cells are
//! computed in planar longitude/latitude space.

use geo::{
    BooleanOps, ChamberlainDuquetteArea, ConvexHull, HaversineDestination, HaversineDistance,
};
use geo_types::{Coord, Geometry as GeoGeometry, LineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};
use spade::{DelaunayTriangulation, Point2, Triangulation};

use crate::{core::geo::EARTH_RADIUS, MapError, Result};

/// Steps used to approximate a circle
pub const CIRCLE_STEPS: usize = 64;

/// Distance units, with the same names and factors turf uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    #[serde(alias = "metres")]
    Meters,
    #[serde(alias = "kilometres")]
    Kilometers,
    Miles,
    Feet,
    #[serde(alias = "nautical_miles")]
    Nauticalmiles,
    Radians,
    Degrees,
}

impl Units {
    /// Meters in one unit
    pub fn meters_per_unit(&self) -> f64 {
        match self {
            Units::Meters => 1.0,
            Units::Kilometers => 1_000.0,
            Units::Miles => 1_609.344,
            Units::Feet => 0.3048,
            Units::Nauticalmiles => 1_852.0,
            Units::Radians => EARTH_RADIUS,
            Units::Degrees => EARTH_RADIUS * std::f64::consts::PI / 180.0,
        }
    }

    pub fn to_meters(&self, value: f64) -> f64 {
        value * self.meters_per_unit()
    }

    pub fn from_meters(&self, meters: f64) -> f64 {
        meters / self.meters_per_unit()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Units::Meters => "meters",
            Units::Kilometers => "kilometers",
            Units::Miles => "miles",
            Units::Feet => "feet",
            Units::Nauticalmiles => "nauticalmiles",
            Units::Radians => "radians",
            Units::Degrees => "degrees",
        }
    }
}

fn geometry_error(message: impl Into<String>) -> MapError {
    MapError::Geometry(message.into())
}

/// Point reached from `origin` after `meters` along `bearing` degrees
pub fn destination(origin: Coord<f64>, meters: f64, bearing: f64) -> Coord<f64> {
    Point::from(origin).haversine_destination(bearing, meters).0
}

/// Initial bearing in degrees from `a` to `b`
pub fn bearing(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let (lat1, lat2) = (a.y.to_radians(), b.y.to_radians());
    let dlng = (b.x - a.x).to_radians();
    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();
    y.atan2(x).to_degrees()
}

pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    Point::from(a).haversine_distance(&Point::from(b))
}

/// Geodesic circle as a closed polygon
pub fn circle(center: Coord<f64>, meters: f64, steps: usize) -> Polygon<f64> {
    let mut ring: Vec<Coord<f64>> = (0..steps)
        .map(|i| destination(center, meters, i as f64 * -360.0 / steps as f64))
        .collect();
    if let Some(first) = ring.first().copied() {
        ring.push(first);
    }
    Polygon::new(LineString::new(ring), Vec::new())
}

fn union_all(parts: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    parts
        .into_iter()
        .fold(MultiPolygon::new(Vec::new()), |acc, p| acc.union(&MultiPolygon::new(vec![p])))
}

/// Corridor of half-width `meters` around a segment
fn segment_corridor(a: Coord<f64>, b: Coord<f64>, meters: f64) -> Option<Polygon<f64>> {
    if a == b {
        return None;
    }
    let heading = bearing(a, b);
    let left_a = destination(a, meters, heading - 90.0);
    let left_b = destination(b, meters, heading - 90.0);
    let right_b = destination(b, meters, heading + 90.0);
    let right_a = destination(a, meters, heading + 90.0);
    Some(Polygon::new(
        LineString::new(vec![left_a, left_b, right_b, right_a, left_a]),
        Vec::new(),
    ))
}

fn buffer_line(coords: &[Coord<f64>], meters: f64) -> Vec<Polygon<f64>> {
    let mut parts: Vec<Polygon<f64>> = coords
        .iter()
        .map(|c| circle(*c, meters, CIRCLE_STEPS))
        .collect();
    parts.extend(coords.windows(2).filter_map(|w| segment_corridor(w[0], w[1], meters)));
    parts
}

fn buffer_polygon(polygon: &Polygon<f64>, meters: f64) -> MultiPolygon<f64> {
    let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
    let mut outline = Vec::new();
    for ring in rings {
        outline.extend(buffer_line(&ring.0, meters.abs()));
    }
    let outline = union_all(outline);
    let body = MultiPolygon::new(vec![polygon.clone()]);
    if meters >= 0.0 {
        body.union(&outline)
    } else {
        body.difference(&outline)
    }
}

/// Buffers any geometry by `meters`. Negative distances shrink polygons.
pub fn buffer(geometry: &GeoGeometry<f64>, meters: f64) -> Result<MultiPolygon<f64>> {
    if !meters.is_finite() {
        return Err(geometry_error("buffer radius must be finite"));
    }
    if meters < 0.0 && !matches!(geometry, GeoGeometry::Polygon(_) | GeoGeometry::MultiPolygon(_)) {
        return Err(geometry_error("negative buffers only apply to polygons"));
    }
    if meters == 0.0 {
        return Err(geometry_error("buffer radius must not be zero"));
    }

    let result = match geometry {
        GeoGeometry::Point(p) => MultiPolygon::new(vec![circle(p.0, meters, CIRCLE_STEPS)]),
        GeoGeometry::MultiPoint(mp) => {
            union_all(mp.iter().map(|p| circle(p.0, meters, CIRCLE_STEPS)).collect())
        }
        GeoGeometry::Line(l) => union_all(buffer_line(&[l.start, l.end], meters)),
        GeoGeometry::LineString(l) => union_all(buffer_line(&l.0, meters)),
        GeoGeometry::MultiLineString(ml) => {
            union_all(ml.iter().flat_map(|l| buffer_line(&l.0, meters)).collect())
        }
        GeoGeometry::Polygon(p) => buffer_polygon(p, meters),
        GeoGeometry::MultiPolygon(mp) => mp
            .iter()
            .map(|p| buffer_polygon(p, meters))
            .fold(MultiPolygon::new(Vec::new()), |acc, m| acc.union(&m)),
        GeoGeometry::Rect(r) => buffer_polygon(&r.to_polygon(), meters),
        GeoGeometry::Triangle(t) => buffer_polygon(&t.to_polygon(), meters),
        GeoGeometry::GeometryCollection(gc) => {
            let mut acc = MultiPolygon::new(Vec::new());
            for g in gc.iter() {
                acc = acc.union(&buffer(g, meters)?);
            }
            acc
        }
    };
    if result.0.is_empty() {
        return Err(geometry_error("buffer produced an empty geometry"));
    }
    Ok(result)
}

pub fn union(polygons: Vec<Polygon<f64>>) -> Result<MultiPolygon<f64>> {
    if polygons.is_empty() {
        return Err(geometry_error("union needs at least one polygon"));
    }
    Ok(union_all(polygons))
}

/// Intersection of two polygon sets; `None` when they do not overlap
pub fn intersect(a: Vec<Polygon<f64>>, b: Vec<Polygon<f64>>) -> Option<MultiPolygon<f64>> {
    let result = MultiPolygon::new(a).intersection(&MultiPolygon::new(b));
    (!result.0.is_empty()).then_some(result)
}

/// `a` minus `b`; `None` when nothing is left
pub fn difference(a: Vec<Polygon<f64>>, b: Vec<Polygon<f64>>) -> Option<MultiPolygon<f64>> {
    let result = MultiPolygon::new(a).difference(&MultiPolygon::new(b));
    (!result.0.is_empty()).then_some(result)
}

fn unique(coords: &[Coord<f64>]) -> Vec<Coord<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for c in coords {
        if !out.iter().any(|o| (o.x - c.x).abs() < 1e-12 && (o.y - c.y).abs() < 1e-12) {
            out.push(*c);
        }
    }
    out
}

fn is_degenerate(polygon: &Polygon<f64>) -> bool {
    let ring = &polygon.exterior().0;
    ring.len() < 4 || polygon.chamberlain_duquette_unsigned_area() == 0.0
}

/// Convex hull of a point set
pub fn convex_hull(coords: &[Coord<f64>]) -> Result<Polygon<f64>> {
    let points = unique(coords);
    if points.len() < 3 {
        return Err(geometry_error("convex hull needs at least 3 distinct points"));
    }
    let hull = MultiPoint::new(points.into_iter().map(Point::from).collect()).convex_hull();
    if is_degenerate(&hull) {
        return Err(geometry_error("points are collinear"));
    }
    Ok(hull)
}

/// Edge length used when a concave hull request does not give one:
/// twice the largest nearest-neighbour distance, so every point can join the hull
pub fn auto_max_edge(coords: &[Coord<f64>]) -> f64 {
    coords
        .iter()
        .enumerate()
        .map(|(i, a)| {
            coords
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, b)| distance(*a, *b))
                .fold(f64::INFINITY, f64::min)
        })
        .filter(|d| d.is_finite())
        .fold(0.0, f64::max)
        * 2.0
}

/// How a concave hull was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct ConcaveHull {
    pub geometry: MultiPolygon<f64>,
    pub max_edge_meters: f64,
    /// No triangle survived the edge limit and the convex hull was returned instead
    pub fell_back_to_convex: bool,
}

/// Concave hull from a Delaunay triangulation, keeping triangles whose edges
/// are all at most `max_edge_meters` long. Falls back to the convex hull when
/// no triangle is short enough.
pub fn concave_hull(coords: &[Coord<f64>], max_edge_meters: Option<f64>) -> Result<ConcaveHull> {
    let points = unique(coords);
    if points.len() < 3 {
        return Err(geometry_error("concave hull needs at least 3 distinct points"));
    }
    let max_edge = max_edge_meters.unwrap_or_else(|| auto_max_edge(&points));

    let kept: Vec<Polygon<f64>> = delaunay(&points)?
        .into_iter()
        .filter(|&[a, b, c]| distance(a, b) <= max_edge && distance(b, c) <= max_edge && distance(c, a) <= max_edge)
        .map(|[a, b, c]| Polygon::new(LineString::new(vec![a, b, c, a]), Vec::new()))
        .filter(|t| !is_degenerate(t))
        .collect();

    if kept.is_empty() {
        log::debug!("no triangle within {} m, using convex hull", max_edge);
        return Ok(ConcaveHull {
            geometry: MultiPolygon::new(vec![convex_hull(&points)?]),
            max_edge_meters: max_edge,
            fell_back_to_convex: true,
        });
    }
    Ok(ConcaveHull {
        geometry: union_all(kept),
        max_edge_meters: max_edge,
        fell_back_to_convex: false,
    })
}

/// Delaunay triangles of `points`, as vertex coordinates
fn delaunay(points: &[Coord<f64>]) -> Result<Vec<[Coord<f64>; 3]>> {
    let mut triangulation: DelaunayTriangulation<Point2<f64>> = DelaunayTriangulation::new();
    for p in points {
        triangulation
            .insert(Point2::new(p.x, p.y))
            .map_err(|e| geometry_error(format!("cannot triangulate ({}, {}): {}", p.x, p.y, e)))?;
    }
    Ok(triangulation
        .inner_faces()
        .map(|face| {
            face.vertices().map(|v| {
                let p = v.position();
                Coord { x: p.x, y: p.y }
            })
        })
        .collect())
}

/// Keeps the part of `ring` on `site`'s side of the bisector between `site` and `other`
fn clip_half_plane(ring: &[Coord<f64>], site: Coord<f64>, other: Coord<f64>) -> Vec<Coord<f64>> {
    let normal = Coord {
        x: other.x - site.x,
        y: other.y - site.y,
    };
    let mid = Coord {
        x: (site.x + other.x) / 2.0,
        y: (site.y + other.y) / 2.0,
    };
    let side = |p: Coord<f64>| (p.x - mid.x) * normal.x + (p.y - mid.y) * normal.y;

    let mut out = Vec::with_capacity(ring.len() + 1);
    for (i, current) in ring.iter().enumerate() {
        let previous = ring[(i + ring.len() - 1) % ring.len()];
        let (sc, sp) = (side(*current), side(previous));
        if sc <= 0.0 {
            if sp > 0.0 {
                let t = sp / (sp - sc);
                out.push(Coord {
                    x: previous.x + t * (current.x - previous.x),
                    y: previous.y + t * (current.y - previous.y),
                });
            }
            out.push(*current);
        } else if sp <= 0.0 {
            let t = sp / (sp - sc);
            out.push(Coord {
                x: previous.x + t * (current.x - previous.x),
                y: previous.y + t * (current.y - previous.y),
            });
        }
    }
    out
}

/// Default clipping box for Voronoi cells: `[west, south, east, north]`
pub const VORONOI_BBOX: [f64; 4] = [-180.0, -85.0, 180.0, 85.0];

/// One Voronoi cell per input point, clipped to `bbox`. Points outside the box get no cell.
pub fn voronoi(coords: &[Coord<f64>], bbox: [f64; 4]) -> Result<Vec<(usize, Polygon<f64>)>> {
    let [west, south, east, north] = bbox;
    if west >= east || south >= north {
        return Err(geometry_error("voronoi bbox is empty"));
    }
    let frame = vec![
        Coord { x: west, y: south },
        Coord { x: east, y: south },
        Coord { x: east, y: north },
        Coord { x: west, y: north },
    ];

    let mut cells = Vec::new();
    for (i, site) in coords.iter().enumerate() {
        if site.x < west || site.x > east || site.y < south || site.y > north {
            continue;
        }
        let mut ring = frame.clone();
        for (j, other) in coords.iter().enumerate() {
            if i == j || other == site || ring.is_empty() {
                continue;
            }
            ring = clip_half_plane(&ring, *site, *other);
        }
        if ring.len() >= 3 {
            ring.push(ring[0]);
            cells.push((i, Polygon::new(LineString::new(ring), Vec::new())));
        }
    }
    Ok(cells)
}

/// Area in square meters
pub fn area(geometry: &GeoGeometry<f64>) -> f64 {
    match geometry {
        GeoGeometry::Polygon(p) => p.chamberlain_duquette_unsigned_area(),
        GeoGeometry::MultiPolygon(mp) => mp.chamberlain_duquette_unsigned_area(),
        GeoGeometry::Rect(r) => r.to_polygon().chamberlain_duquette_unsigned_area(),
        GeoGeometry::Triangle(t) => t.to_polygon().chamberlain_duquette_unsigned_area(),
        GeoGeometry::GeometryCollection(gc) => gc.iter().map(area).sum(),
        _ => 0.0,
    }
}

fn push_vertices(geometry: &GeoGeometry<f64>, out: &mut Vec<Coord<f64>>) {
    let ring_vertices = |ring: &LineString<f64>, out: &mut Vec<Coord<f64>>| {
        let closed = ring.0.len() > 1 && ring.0.first() == ring.0.last();
        let take = if closed { ring.0.len() - 1 } else { ring.0.len() };
        out.extend(ring.0.iter().take(take).copied());
    };
    match geometry {
        GeoGeometry::Point(p) => out.push(p.0),
        GeoGeometry::MultiPoint(mp) => out.extend(mp.iter().map(|p| p.0)),
        GeoGeometry::Line(l) => out.extend([l.start, l.end]),
        GeoGeometry::LineString(l) => out.extend(l.0.iter().copied()),
        GeoGeometry::MultiLineString(ml) => out.extend(ml.iter().flat_map(|l| l.0.iter().copied())),
        GeoGeometry::Polygon(p) => {
            ring_vertices(p.exterior(), out);
            for ring in p.interiors() {
                ring_vertices(ring, out);
            }
        }
        GeoGeometry::MultiPolygon(mp) => {
            for p in mp.iter() {
                push_vertices(&GeoGeometry::Polygon(p.clone()), out);
            }
        }
        GeoGeometry::Rect(r) => push_vertices(&GeoGeometry::Polygon(r.to_polygon()), out),
        GeoGeometry::Triangle(t) => push_vertices(&GeoGeometry::Polygon(t.to_polygon()), out),
        GeoGeometry::GeometryCollection(gc) => {
            for g in gc.iter() {
                push_vertices(g, out);
            }
        }
    }
}

/// Every vertex of a geometry, closing ring vertices excluded
pub fn vertices(geometry: &GeoGeometry<f64>) -> Vec<Coord<f64>> {
    let mut out = Vec::new();
    push_vertices(geometry, &mut out);
    out
}

/// Mean of all vertices, closing ring vertices excluded (turf's `centroid`)
pub fn centroid(geometry: &GeoGeometry<f64>) -> Option<Coord<f64>> {
    let vertices = vertices(geometry);
    if vertices.is_empty() {
        return None;
    }
    let n = vertices.len() as f64;
    let (sx, sy) = vertices
        .iter()
        .fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
    Some(Coord { x: sx / n, y: sy / n })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn test_units() {
        assert_eq!(Units::Kilometers.to_meters(1.5), 1_500.0);
        assert!((Units::Miles.from_meters(1_609.344) - 1.0).abs() < 1e-12);
        let units: Units = serde_json::from_str("\"nauticalmiles\"").unwrap();
        assert_eq!(units, Units::Nauticalmiles);
    }

    #[test]
    fn test_circle_radius_and_centroid() {
        let center = c(-122.4, 37.7);
        let ring = circle(center, 500.0, CIRCLE_STEPS);
        assert_eq!(ring.exterior().0.len(), CIRCLE_STEPS + 1);
        for vertex in &ring.exterior().0 {
            assert!((distance(center, *vertex) - 500.0).abs() < 0.01);
        }
        let mid = centroid(&GeoGeometry::Polygon(ring)).unwrap();
        assert!(distance(center, mid) < 1.0);
    }

    #[test]
    fn test_line_buffer_covers_segment() {
        let line = GeoGeometry::LineString(LineString::new(vec![c(0.0, 0.0), c(0.01, 0.0)]));
        let buffered = buffer(&line, 100.0).unwrap();
        assert_eq!(buffered.0.len(), 1);
        let square_meters = area(&GeoGeometry::MultiPolygon(buffered));
        // ~1113 m long, 200 m wide, plus round caps
        assert!(square_meters > 200_000.0 && square_meters < 300_000.0);
    }

    #[test]
    fn test_convex_hull_rejects_collinear() {
        assert!(convex_hull(&[c(0.0, 0.0), c(1.0, 1.0), c(2.0, 2.0)]).is_err());
        let hull = convex_hull(&[c(0.0, 0.0), c(1.0, 0.0), c(0.0, 1.0), c(0.2, 0.2)]).unwrap();
        assert_eq!(hull.exterior().0.len(), 4);
    }

    #[test]
    fn test_concave_hull_falls_back_to_convex() {
        let points = [c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0), c(0.0, 1.0), c(0.5, 0.5)];
        let hull = concave_hull(&points, Some(1.0)).unwrap();
        assert!(hull.fell_back_to_convex);
        assert_eq!(hull.geometry.0.len(), 1);

        let generous = concave_hull(&points, None).unwrap();
        assert!(!generous.fell_back_to_convex);
        assert!(area(&GeoGeometry::MultiPolygon(generous.geometry)) > 0.0);
    }

    #[test]
    fn test_delaunay_square() {
        let points = [c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0), c(0.0, 1.0), c(0.5, 0.4)];
        assert_eq!(delaunay(&points).unwrap().len(), 4);
    }

    #[test]
    fn test_generous_concave_hull_matches_convex_hull() {
        // deterministic scatter over roughly 0.1 x 0.1 degrees
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            (seed % 10_000) as f64 / 100_000.0
        };
        let points: Vec<Coord<f64>> = (0..60).map(|_| c(2.3 + next(), 48.8 + next())).collect();

        let concave = concave_hull(&points, Some(1e7)).unwrap();
        assert!(!concave.fell_back_to_convex);
        let concave_area = area(&GeoGeometry::MultiPolygon(concave.geometry));
        let convex_area = area(&GeoGeometry::Polygon(convex_hull(&points).unwrap()));
        assert!((concave_area - convex_area).abs() / convex_area < 1e-4);
    }

    #[test]
    fn test_voronoi_cells_partition_box() {
        let cells = voronoi(&[c(-1.0, 0.0), c(1.0, 0.0)], [-2.0, -1.0, 2.0, 1.0]).unwrap();
        assert_eq!(cells.len(), 2);
        let left = &cells[0].1;
        assert!(left.exterior().0.iter().all(|p| p.x <= 1e-9));
        assert!(voronoi(&[c(0.0, 0.0)], [1.0, 1.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn test_intersect_and_difference() {
        let square = |x: f64| {
            Polygon::new(
                LineString::new(vec![c(x, 0.0), c(x + 1.0, 0.0), c(x + 1.0, 1.0), c(x, 1.0), c(x, 0.0)]),
                Vec::new(),
            )
        };
        assert!(intersect(vec![square(0.0)], vec![square(0.5)]).is_some());
        assert!(intersect(vec![square(0.0)], vec![square(5.0)]).is_none());
        assert!(difference(vec![square(0.0)], vec![square(-1.0), square(1.0)]).is_none());
    }
}
