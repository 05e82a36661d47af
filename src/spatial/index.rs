use crate::core::geo::{LngLat, LngLatBounds};

use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// A spatial item that can be indexed via an R-tree
#[derive(Debug, Clone)]
pub struct SpatialItem<T> {
    pub id: String,
    pub bounds: LngLatBounds,
    pub data: T,
}

impl<T> SpatialItem<T> {
    pub fn new(id: String, bounds: LngLatBounds, data: T) -> Self {
        Self { id, bounds, data }
    }

    pub fn from_lng_lat(id: String, lng_lat: LngLat, data: T) -> Self {
        Self::new(id, LngLatBounds::new(lng_lat, lng_lat), data)
    }
}

impl<T> PartialEq for SpatialItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for SpatialItem<T> {}

// --- rstar integration -------------------------------------------------------------------------

fn envelope_of(bounds: &LngLatBounds) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [bounds.south_west.lng, bounds.south_west.lat],
        [bounds.north_east.lng, bounds.north_east.lat],
    )
}

impl<T> RTreeObject for SpatialItem<T> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        envelope_of(&self.bounds)
    }
}

impl<T> PointDistance for SpatialItem<T> {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let center = self.bounds.center();
        let dx = center.lng - point[0];
        let dy = center.lat - point[1];
        dx * dx + dy * dy
    }

    fn contains_point(&self, point: &[f64; 2]) -> bool {
        self.bounds.contains(&LngLat::new(point[0], point[1]))
    }
}

/// R-tree over geographic envelopes, in insertion order per id
pub struct SpatialIndex<T> {
    rtree: RTree<SpatialItem<T>>,
    bounds: Option<LngLatBounds>,
}

impl<T: Clone> SpatialIndex<T> {
    pub fn new() -> Self {
        Self {
            rtree: RTree::new(),
            bounds: None,
        }
    }

    /// Bulk-loads an index, which gives a better balanced tree than repeated inserts
    pub fn bulk_load(items: Vec<SpatialItem<T>>) -> Self {
        let mut bounds: Option<LngLatBounds> = None;
        for item in &items {
            match bounds.as_mut() {
                Some(b) => {
                    b.extend(&item.bounds.south_west);
                    b.extend(&item.bounds.north_east);
                }
                None => bounds = Some(item.bounds),
            }
        }
        Self {
            rtree: RTree::bulk_load(items),
            bounds,
        }
    }

    pub fn insert(&mut self, item: SpatialItem<T>) {
        match self.bounds.as_mut() {
            Some(b) => {
                b.extend(&item.bounds.south_west);
                b.extend(&item.bounds.north_east);
            }
            None => self.bounds = Some(item.bounds),
        }
        self.rtree.insert(item);
    }

    /// Items whose envelope intersects `bounds`
    pub fn query(&self, bounds: &LngLatBounds) -> Vec<&SpatialItem<T>> {
        self.rtree
            .locate_in_envelope_intersecting(&envelope_of(bounds))
            .collect()
    }

    /// Items whose envelope contains `point`
    pub fn query_point(&self, point: &LngLat) -> Vec<&SpatialItem<T>> {
        self.rtree
            .locate_all_at_point(&[point.lng, point.lat])
            .collect()
    }

    pub fn remove(&mut self, id: &str) -> Option<SpatialItem<T>> {
        let found = self.rtree.iter().find(|obj| obj.id == id).cloned()?;
        let removed = self.rtree.remove(&found);

        if self.rtree.size() == 0 {
            self.bounds = None;
        } else {
            let env = self.rtree.root().envelope();
            self.bounds = Some(LngLatBounds::from_coords(
                env.lower()[0],
                env.lower()[1],
                env.upper()[0],
                env.upper()[1],
            ));
        }
        removed
    }

    pub fn bounds(&self) -> Option<LngLatBounds> {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.rtree.size() == 0
    }

    pub fn len(&self) -> usize {
        self.rtree.size()
    }
}

impl<T: Clone> Default for SpatialIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_by_bounds() {
        let mut index = SpatialIndex::new();
        index.insert(SpatialItem::from_lng_lat("a".into(), LngLat::new(1.0, 1.0), 1));
        index.insert(SpatialItem::from_lng_lat("b".into(), LngLat::new(10.0, 10.0), 2));

        let hits = index.query(&LngLatBounds::from_coords(0.0, 0.0, 2.0, 2.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].data, 1);
        assert_eq!(index.bounds(), Some(LngLatBounds::from_coords(1.0, 1.0, 10.0, 10.0)));
    }

    #[test]
    fn test_point_query_hits_envelopes() {
        let index = SpatialIndex::bulk_load(vec![
            SpatialItem::new("poly".into(), LngLatBounds::from_coords(-1.0, -1.0, 1.0, 1.0), ()),
            SpatialItem::from_lng_lat("far".into(), LngLat::new(50.0, 50.0), ()),
        ]);
        let hits = index.query_point(&LngLat::new(0.5, 0.5));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "poly");
    }

    #[test]
    fn test_remove_updates_bounds() {
        let mut index = SpatialIndex::new();
        index.insert(SpatialItem::from_lng_lat("a".into(), LngLat::new(1.0, 1.0), ()));
        index.insert(SpatialItem::from_lng_lat("b".into(), LngLat::new(5.0, 5.0), ()));
        assert!(index.remove("b").is_some());
        assert!(index.remove("missing").is_none());
        assert_eq!(index.len(), 1);
        assert_eq!(index.bounds(), Some(LngLatBounds::from_coords(1.0, 1.0, 1.0, 1.0)));
    }
}
