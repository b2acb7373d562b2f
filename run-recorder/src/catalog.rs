use std::collections::{BTreeSet, HashMap, HashSet};

use geo::{BoundingRect, Coord, LineString, Rect};
use log::{info, warn};

use run_recorder_network::{NetworkMap, NodeId, SegmentId};

use crate::geometry::haversine;
use crate::snap::{nearest_vertex, Snap};
use crate::Config;

/// Assigned in insertion order when the catalog is built. Only valid for one catalog; after a
/// rebuild, go through the `SegmentId`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SegmentKey(pub u32);

pub struct Segment {
    pub id: SegmentId,
    pub start_node: NodeId,
    pub end_node: NodeId,
    pub length_meters: f64,
    /// Resampled, so consecutive points are close together. Goes from start_node to end_node.
    pub points: Vec<Coord>,
    pub bbox: Rect,
}

pub struct SegmentCatalog {
    segments: Vec<Segment>,
    by_id: HashMap<SegmentId, SegmentKey>,
    // Keyed by sorted node pair. Only used when a routing response is missing a segment ID.
    shortest_between: HashMap<(NodeId, NodeId), SegmentKey>,
    ignored: HashSet<SegmentId>,
}

impl SegmentCatalog {
    pub fn new(map: &NetworkMap, config: &Config, ignored: HashSet<SegmentId>) -> SegmentCatalog {
        let mut catalog = SegmentCatalog {
            segments: Vec::with_capacity(map.segments.len()),
            by_id: HashMap::new(),
            shortest_between: HashMap::new(),
            ignored,
        };

        let mut too_short = 0;
        for input in &map.segments {
            if input.length_meters < config.min_segment_length_meters {
                too_short += 1;
                continue;
            }
            if catalog.by_id.contains_key(&input.id) {
                warn!("Duplicate segment {}, keeping the first", input.id);
                continue;
            }

            let points = if input.multi_part {
                input.geometry.0.clone()
            } else {
                resample(&input.geometry.0, config.resample_spacing_meters)
            };
            let Some(bbox) = LineString::new(points.clone()).bounding_rect() else {
                warn!("Segment {} has no geometry, skipping", input.id);
                continue;
            };

            let key = SegmentKey(catalog.segments.len() as u32);
            catalog.by_id.insert(input.id.clone(), key);

            let pair = node_pair(input.start_node, input.end_node);
            let replace = match catalog.shortest_between.get(&pair) {
                Some(existing) => catalog.get(*existing).length_meters > input.length_meters,
                None => true,
            };
            if replace {
                catalog.shortest_between.insert(pair, key);
            }

            catalog.segments.push(Segment {
                id: input.id.clone(),
                start_node: input.start_node,
                end_node: input.end_node,
                length_meters: input.length_meters,
                points,
                bbox,
            });
        }

        info!(
            "Catalog has {} segments ({} filtered for being shorter than {}m)",
            catalog.segments.len(),
            too_short,
            config.min_segment_length_meters
        );
        catalog
    }

    pub fn get(&self, key: SegmentKey) -> &Segment {
        &self.segments[key.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SegmentKey, &Segment)> {
        self.segments
            .iter()
            .enumerate()
            .map(|(idx, segment)| (SegmentKey(idx as u32), segment))
    }

    pub fn key_of(&self, id: &SegmentId) -> Option<SegmentKey> {
        self.by_id.get(id).cloned()
    }

    /// Among all segments connecting two nodes (in either direction), the shortest
    pub fn shortest_between(&self, node1: NodeId, node2: NodeId) -> Option<SegmentKey> {
        self.shortest_between.get(&node_pair(node1, node2)).cloned()
    }

    /// Finds the segment a snap refers to, even if the snap was taken against a previous catalog.
    /// None if the segment has since been filtered out. If the segment was resampled differently,
    /// the snap moves to the nearest of its new vertices.
    pub fn resolve(&self, snap: &Snap) -> Option<Snap> {
        let key = match self.segments.get(snap.key.0 as usize) {
            Some(segment) if segment.id == snap.segment_id => snap.key,
            _ => self.key_of(&snap.segment_id)?,
        };
        if self.get(key).points.get(snap.vertex_idx) == Some(&snap.point) {
            let mut snap = snap.clone();
            snap.key = key;
            return Some(snap);
        }
        nearest_vertex(self, &[key], snap.point)
    }

    pub fn is_ignored(&self, id: &SegmentId) -> bool {
        self.ignored.contains(id)
    }

    pub fn ignored(&self) -> &HashSet<SegmentId> {
        &self.ignored
    }

    pub fn ignored_keys(&self) -> BTreeSet<SegmentKey> {
        self.ignored
            .iter()
            .filter_map(|id| self.key_of(id))
            .collect()
    }

    pub fn set_ignored(&mut self, ignored: HashSet<SegmentId>) {
        self.ignored = ignored;
    }

    /// Returns true if the segment is now ignored
    pub fn toggle_ignored(&mut self, id: SegmentId) -> bool {
        if self.ignored.remove(&id) {
            false
        } else {
            self.ignored.insert(id);
            true
        }
    }
}

fn node_pair(node1: NodeId, node2: NodeId) -> (NodeId, NodeId) {
    if node1 <= node2 {
        (node1, node2)
    } else {
        (node2, node1)
    }
}

/// Inserts linearly interpolated points so that no two consecutive points are more than
/// `spacing_meters` apart. The original points, including both endpoints, are kept.
pub fn resample(pts: &[Coord], spacing_meters: f64) -> Vec<Coord> {
    if pts.len() < 2 || spacing_meters <= 0.0 {
        return pts.to_vec();
    }

    let mut result = vec![pts[0]];
    for pair in pts.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let dist = haversine(a, b);
        if dist > spacing_meters {
            // Strictly more pieces than needed, so each piece is strictly shorter than spacing
            let pieces = (dist / spacing_meters).floor() as usize + 1;
            for i in 1..pieces {
                result.push(crate::geometry::lerp(a, b, i as f64 / pieces as f64));
            }
        }
        result.push(b);
    }
    result
}
