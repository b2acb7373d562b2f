use std::ops::Range;

use geo::Coord;
use log::warn;

use run_recorder_network::SegmentId;

use crate::catalog::{Segment, SegmentCatalog};
use crate::error::RecorderError;
use crate::geometry::haversine;
use crate::router::RoutedTraversal;
use crate::snap::Snap;

/// One directed pass over a segment, as part of a routed section
#[derive(Clone, Debug, PartialEq)]
pub struct Traversal {
    pub segment_id: SegmentId,
    /// In the direction of the segment's geometry?
    pub forward: bool,
    pub distance_meters: f64,
    /// The slice of the section's points covering this traversal
    pub pts: Range<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StitchedRoute {
    pub pts: Vec<Coord>,
    pub traversals: Vec<Traversal>,
    pub distance_meters: f64,
}

/// Glues the geometry of every traversal in a routing response into one continuous line from
/// `from` to `to`.
pub fn stitch(
    catalog: &SegmentCatalog,
    from: &Snap,
    to: &Snap,
    route: &[RoutedTraversal],
    tolerance_meters: f64,
) -> Result<StitchedRoute, RecorderError> {
    let mut result = StitchedRoute {
        pts: Vec::new(),
        traversals: Vec::new(),
        distance_meters: 0.0,
    };
    let last_idx = route.len().saturating_sub(1);

    for (idx, step) in route.iter().enumerate() {
        let segment = resolve(catalog, step)?;
        let pts = &segment.points;
        let from_vertex = from.vertex_idx.min(pts.len() - 1);
        let to_vertex = to.vertex_idx.min(pts.len() - 1);

        let (slice, forward, distance) = if route.len() == 1 {
            if from_vertex <= to_vertex {
                (pts[from_vertex..=to_vertex].to_vec(), true, partial_distance(step))
            } else {
                (reversed(&pts[to_vertex..=from_vertex]), false, partial_distance(step))
            }
        } else if idx == 0 {
            // Leave towards whichever end the response says
            if is_origin(step.end_distance_metres) {
                (reversed(&pts[..=from_vertex]), false, partial_distance(step))
            } else {
                (pts[from_vertex..].to_vec(), true, partial_distance(step))
            }
        } else if idx == last_idx {
            if is_origin(step.start_distance_metres) {
                (pts[..=to_vertex].to_vec(), true, partial_distance(step))
            } else {
                (reversed(&pts[to_vertex..]), false, partial_distance(step))
            }
        } else {
            // The whole segment, facing whichever way continues the line so far
            let distance = step.length_metres.unwrap_or(segment.length_meters);
            match result.pts.last() {
                Some(last) if haversine(pts[0], *last) > tolerance_meters => {
                    (reversed(pts), false, distance)
                }
                _ => (pts.to_vec(), true, distance),
            }
        };

        if let (Some(last), Some(first)) = (result.pts.last(), slice.first()) {
            let gap = haversine(*last, *first);
            if gap > tolerance_meters {
                warn!(
                    "Routed path has a {:.1}m gap before {}; the response may not match the catalog",
                    gap, segment.id
                );
            }
        }

        let start = append_deduped(&mut result.pts, slice);
        result.traversals.push(Traversal {
            segment_id: segment.id.clone(),
            forward,
            distance_meters: distance,
            pts: start..result.pts.len(),
        });
        result.distance_meters += distance;
    }

    Ok(result)
}

fn resolve<'a>(
    catalog: &'a SegmentCatalog,
    step: &RoutedTraversal,
) -> Result<&'a Segment, RecorderError> {
    if let Some(ref id) = step.segment_id {
        if let Some(key) = catalog.key_of(id) {
            return Ok(catalog.get(key));
        }
    }
    if let (Some(node1), Some(node2)) = (step.start_node, step.end_node) {
        if let Some(key) = catalog.shortest_between(node1, node2) {
            return Ok(catalog.get(key));
        }
    }
    Err(RecorderError::UnresolvedTraversal(format!(
        "segment {:?} between nodes {:?} and {:?}",
        step.segment_id.as_ref().map(|x| &x.0),
        step.start_node.map(|x| x.0),
        step.end_node.map(|x| x.0)
    )))
}

fn partial_distance(step: &RoutedTraversal) -> f64 {
    (step.end_distance_metres - step.start_distance_metres).abs()
}

fn is_origin(distance: f64) -> bool {
    distance <= 0.0
}

fn reversed(pts: &[Coord]) -> Vec<Coord> {
    let mut pts = pts.to_vec();
    pts.reverse();
    pts
}

// Returns the index where the slice starts. When the slice begins where the line already ends,
// that shared point isn't repeated, but it still counts as the start of the slice.
fn append_deduped(pts: &mut Vec<Coord>, slice: Vec<Coord>) -> usize {
    let shared = matches!((pts.last(), slice.first()), (Some(last), Some(first)) if last == first);
    if shared {
        let start = pts.len() - 1;
        pts.extend(slice.into_iter().skip(1));
        start
    } else {
        let start = pts.len();
        pts.extend(slice);
        start
    }
}
