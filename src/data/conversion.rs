//! Conversions between the runtime's GeoJSON model and `geo-types`

use geo_types::{
    Coord, Geometry as GeoGeometry, GeometryCollection, LineString, MultiLineString, MultiPoint,
    MultiPolygon, Point, Polygon,
};

use crate::data::geojson::{Feature, FeatureCollection, Geometry, Position};

fn coord(position: &Position) -> Coord<f64> {
    Coord {
        x: position.lng,
        y: position.lat,
    }
}

fn position(coord: &Coord<f64>) -> Position {
    Position::new(coord.x, coord.y)
}

fn line(positions: &[Position]) -> LineString<f64> {
    LineString::new(positions.iter().map(coord).collect())
}

fn polygon(rings: &[Vec<Position>]) -> Polygon<f64> {
    let mut rings = rings.iter().map(|r| line(r));
    let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
    Polygon::new(exterior, rings.collect())
}

fn ring_positions(ring: &LineString<f64>) -> Vec<Position> {
    ring.coords().map(position).collect()
}

fn polygon_rings(polygon: &Polygon<f64>) -> Vec<Vec<Position>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring_positions)
        .collect()
}

impl From<&Geometry> for GeoGeometry<f64> {
    fn from(geometry: &Geometry) -> Self {
        match geometry {
            Geometry::Point { coordinates } => GeoGeometry::Point(Point::from(coord(coordinates))),
            Geometry::LineString { coordinates } => GeoGeometry::LineString(line(coordinates)),
            Geometry::Polygon { coordinates } => GeoGeometry::Polygon(polygon(coordinates)),
            Geometry::MultiPoint { coordinates } => GeoGeometry::MultiPoint(MultiPoint::new(
                coordinates.iter().map(|p| Point::from(coord(p))).collect(),
            )),
            Geometry::MultiLineString { coordinates } => GeoGeometry::MultiLineString(
                MultiLineString::new(coordinates.iter().map(|l| line(l)).collect()),
            ),
            Geometry::MultiPolygon { coordinates } => GeoGeometry::MultiPolygon(MultiPolygon::new(
                coordinates.iter().map(|p| polygon(p)).collect(),
            )),
            Geometry::GeometryCollection { geometries } => GeoGeometry::GeometryCollection(
                GeometryCollection::new_from(geometries.iter().map(GeoGeometry::from).collect()),
            ),
        }
    }
}

impl From<&GeoGeometry<f64>> for Geometry {
    fn from(geometry: &GeoGeometry<f64>) -> Self {
        match geometry {
            GeoGeometry::Point(p) => Geometry::Point {
                coordinates: position(&p.0),
            },
            GeoGeometry::Line(l) => Geometry::LineString {
                coordinates: vec![position(&l.start), position(&l.end)],
            },
            GeoGeometry::LineString(l) => Geometry::LineString {
                coordinates: ring_positions(l),
            },
            GeoGeometry::Polygon(p) => Geometry::Polygon {
                coordinates: polygon_rings(p),
            },
            GeoGeometry::MultiPoint(mp) => Geometry::MultiPoint {
                coordinates: mp.iter().map(|p| position(&p.0)).collect(),
            },
            GeoGeometry::MultiLineString(ml) => Geometry::MultiLineString {
                coordinates: ml.iter().map(ring_positions).collect(),
            },
            GeoGeometry::MultiPolygon(mp) => Geometry::MultiPolygon {
                coordinates: mp.iter().map(polygon_rings).collect(),
            },
            GeoGeometry::GeometryCollection(gc) => Geometry::GeometryCollection {
                geometries: gc.iter().map(Geometry::from).collect(),
            },
            GeoGeometry::Rect(r) => Geometry::Polygon {
                coordinates: polygon_rings(&r.to_polygon()),
            },
            GeoGeometry::Triangle(t) => Geometry::Polygon {
                coordinates: polygon_rings(&t.to_polygon()),
            },
        }
    }
}

impl From<Polygon<f64>> for Geometry {
    fn from(polygon: Polygon<f64>) -> Self {
        Geometry::Polygon {
            coordinates: polygon_rings(&polygon),
        }
    }
}

/// Collapses a multipolygon with a single member into a plain polygon
pub fn simplify_multi(multi: MultiPolygon<f64>) -> Geometry {
    if multi.0.len() == 1 {
        let mut polygons = multi.0;
        Geometry::from(polygons.remove(0))
    } else {
        Geometry::from(&GeoGeometry::MultiPolygon(multi))
    }
}

/// All geometries of a collection as `geo` geometries, skipping null geometries
pub fn collection_geometries(collection: &FeatureCollection) -> Vec<GeoGeometry<f64>> {
    collection
        .features
        .iter()
        .filter_map(|f| f.geometry.as_ref())
        .map(GeoGeometry::from)
        .collect()
}

/// All polygons of a collection, multipolygons flattened
pub fn collection_polygons(collection: &FeatureCollection) -> Vec<Polygon<f64>> {
    let mut polygons = Vec::new();
    for geometry in collection_geometries(collection) {
        push_polygons(geometry, &mut polygons);
    }
    polygons
}

fn push_polygons(geometry: GeoGeometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        GeoGeometry::Polygon(p) => out.push(p),
        GeoGeometry::MultiPolygon(mp) => out.extend(mp.0),
        GeoGeometry::Rect(r) => out.push(r.to_polygon()),
        GeoGeometry::Triangle(t) => out.push(t.to_polygon()),
        GeoGeometry::GeometryCollection(gc) => {
            for g in gc {
                push_polygons(g, out);
            }
        }
        _ => {}
    }
}

/// All vertices of a collection, closing ring vertices included
pub fn collection_coords(collection: &FeatureCollection) -> Vec<Coord<f64>> {
    collection
        .features
        .iter()
        .filter_map(|f| f.geometry.as_ref())
        .flat_map(|g| g.positions())
        .map(|p| coord(&p))
        .collect()
}

/// Wraps a geometry in a feature carrying `properties`
pub fn feature_from(geometry: Geometry, properties: serde_json::Map<String, serde_json::Value>) -> Feature {
    Feature {
        geometry: Some(geometry),
        properties: Some(properties),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polygon_round_trip_keeps_rings() {
        let geometry = Geometry::Polygon {
            coordinates: vec![vec![
                Position::new(0.0, 0.0),
                Position::new(1.0, 0.0),
                Position::new(1.0, 1.0),
                Position::new(0.0, 0.0),
            ]],
        };
        let geo: GeoGeometry<f64> = (&geometry).into();
        assert!(matches!(geo, GeoGeometry::Polygon(_)));
        assert_eq!(Geometry::from(&geo), geometry);
    }

    #[test]
    fn test_collection_polygons_flattens_multi() {
        let square = |x: f64| {
            vec![vec![
                Position::new(x, 0.0),
                Position::new(x + 1.0, 0.0),
                Position::new(x + 1.0, 1.0),
                Position::new(x, 0.0),
            ]]
        };
        let collection = FeatureCollection::new(vec![
            Feature::new(Geometry::MultiPolygon {
                coordinates: vec![square(0.0), square(5.0)],
            }),
            Feature::new(Geometry::point(0.0, 0.0)),
        ]);
        assert_eq!(collection_polygons(&collection).len(), 2);
        assert_eq!(collection_coords(&collection).len(), 9);
    }
}
