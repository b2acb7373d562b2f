use std::collections::BTreeSet;

use geo::Rect;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};

use crate::catalog::{SegmentCatalog, SegmentKey};

/// Bounding boxes of every segment, bulk-loaded once. There's no way to insert or remove
/// afterwards; build a new one instead.
pub struct SpatialIndex {
    tree: RTree<GeomWithData<Rectangle<[f64; 2]>, SegmentKey>>,
}

impl SpatialIndex {
    pub fn new(catalog: &SegmentCatalog) -> SpatialIndex {
        let entries = catalog
            .iter()
            .map(|(key, segment)| {
                let min = segment.bbox.min();
                let max = segment.bbox.max();
                GeomWithData::new(Rectangle::from_corners([min.x, min.y], [max.x, max.y]), key)
            })
            .collect();
        SpatialIndex {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Every segment whose bounding box intersects the query
    pub fn query(&self, bounds: Rect) -> BTreeSet<SegmentKey> {
        let envelope = AABB::from_corners(
            [bounds.min().x, bounds.min().y],
            [bounds.max().x, bounds.max().y],
        );
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| entry.data)
            .collect()
    }

    pub fn size(&self) -> usize {
        self.tree.size()
    }
}
