use crate::types::PlaceShape;
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::Point;
use rstar::{RTree, RTreeObject, AABB};

// Bounding box of one place, pointing back into the shape list.
struct ShapeEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for ShapeEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Point-in-boundary lookup for map clicks.
pub struct PlaceIndex {
    shapes: Vec<PlaceShape>,
    tree: RTree<ShapeEnvelope>,
}

impl PlaceIndex {
    pub fn new(shapes: Vec<PlaceShape>) -> Self {
        let items: Vec<ShapeEnvelope> = shapes
            .iter()
            .enumerate()
            .filter_map(|(index, shape)| {
                let rect = shape.geometry.bounding_rect()?;
                Some(ShapeEnvelope {
                    index,
                    aabb: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        PlaceIndex {
            shapes,
            tree: RTree::bulk_load(items),
        }
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Relation id of the place containing (lon, lat).
    pub fn locate(&self, lon: f64, lat: f64) -> Option<u64> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|candidate| self.shapes.get(candidate.index))
            .find(|shape| shape.geometry.contains(&point))
            .map(|shape| shape.relation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::place_shapes;
    use crate::data::tests::square;
    use geojson::FeatureCollection;

    fn index() -> PlaceIndex {
        let fc: FeatureCollection = vec![square(1, 0.0, 0.0), square(2, 1.0, 0.0), square(3, 10.0, 10.0)]
            .into_iter()
            .collect();
        PlaceIndex::new(place_shapes(&fc).unwrap())
    }

    #[test]
    fn finds_the_containing_place() {
        let index = index();
        assert_eq!(index.len(), 3);
        assert!(!index.is_empty());
        assert_eq!(index.locate(0.5, 0.5), Some(1));
        assert_eq!(index.locate(1.5, 0.25), Some(2));
        assert_eq!(index.locate(10.2, 10.9), Some(3));
    }

    #[test]
    fn empty_index_locates_nothing() {
        let index = PlaceIndex::new(Vec::new());
        assert!(index.is_empty());
        assert_eq!(index.locate(0.5, 0.5), None);
    }

    #[test]
    fn point_outside_every_place_is_none() {
        let index = index();
        assert_eq!(index.locate(5.0, 5.0), None);
        assert_eq!(index.locate(-1.0, 0.5), None);
    }
}
