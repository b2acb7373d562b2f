use geo::Coord;
use log::debug;

use run_recorder_network::SegmentId;

use crate::catalog::{SegmentCatalog, SegmentKey};
use crate::geometry::{buffer_around, haversine};
use crate::{Config, Network};

/// The nearest vertex on the network to some clicked point
#[derive(Clone, Debug, PartialEq)]
pub struct Snap {
    pub key: SegmentKey,
    pub segment_id: SegmentId,
    /// Into the segment's resampled points
    pub vertex_idx: usize,
    /// Cumulative distance from the start of the segment to this vertex
    pub distance_along_meters: f64,
    /// From the clicked point to the vertex
    pub distance_meters: f64,
    pub point: Coord,
}

/// Looks for the nearest vertex in a small box around the point, doubling the box size until
/// something turns up or `snap_retries` is exhausted. This is a local search; a vertex just
/// outside the first non-empty box could be closer.
pub fn snap_to_network(network: &Network, pt: Coord, config: &Config) -> Option<Snap> {
    for attempt in 0..=config.snap_retries {
        let radius = config.snap_radius_meters * 2.0_f64.powi(attempt as i32);
        let candidates: Vec<SegmentKey> = network
            .index
            .query(buffer_around(pt, radius))
            .into_iter()
            .filter(|key| !network.catalog.is_ignored(&network.catalog.get(*key).id))
            .collect();
        if candidates.is_empty() {
            continue;
        }

        let snap = nearest_vertex(&network.catalog, &candidates, pt);
        if let Some(ref snap) = snap {
            debug!(
                "Snapped to {} vertex {} ({:.1}m away) after {} attempts",
                snap.segment_id,
                snap.vertex_idx,
                snap.distance_meters,
                attempt + 1
            );
        }
        return snap;
    }
    None
}

/// Checks every vertex of every candidate. No interpolation between vertices happens, because
/// segments are already resampled.
pub fn nearest_vertex(catalog: &SegmentCatalog, candidates: &[SegmentKey], pt: Coord) -> Option<Snap> {
    let mut best: Option<Snap> = None;
    for key in candidates {
        let segment = catalog.get(*key);
        let mut distance_along = 0.0;
        for (idx, vertex) in segment.points.iter().enumerate() {
            if idx > 0 {
                distance_along += haversine(segment.points[idx - 1], *vertex);
            }
            let dist = haversine(*vertex, pt);
            if best.as_ref().map(|b| dist < b.distance_meters).unwrap_or(true) {
                best = Some(Snap {
                    key: *key,
                    segment_id: segment.id.clone(),
                    vertex_idx: idx,
                    distance_along_meters: distance_along,
                    distance_meters: dist,
                    point: *vertex,
                });
            }
        }
    }
    best
}
