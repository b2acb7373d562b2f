use std::collections::HashMap;

use geo::Coord;
use petgraph::graphmap::UnGraphMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use run_recorder_network::{NodeId, SegmentId};

use crate::catalog::{SegmentCatalog, SegmentKey};
use crate::geometry::haversine;
use crate::snap::Snap;

/// Sent to the routing collaborator to route between two snapped points
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RouteRequest {
    pub from_segment_id: SegmentId,
    pub from_segment_distance_along_segment_metres: f64,
    pub from_segment_start_node: NodeId,
    pub from_segment_end_node: NodeId,
    pub to_segment_id: SegmentId,
    pub to_segment_distance_along_segment_metres: f64,
    pub to_segment_start_node: NodeId,
    pub to_segment_end_node: NodeId,
}

impl RouteRequest {
    pub fn new(catalog: &SegmentCatalog, from: &Snap, to: &Snap) -> RouteRequest {
        let from_segment = catalog.get(from.key);
        let to_segment = catalog.get(to.key);
        RouteRequest {
            from_segment_id: from.segment_id.clone(),
            from_segment_distance_along_segment_metres: from.distance_along_meters,
            from_segment_start_node: from_segment.start_node,
            from_segment_end_node: from_segment.end_node,
            to_segment_id: to.segment_id.clone(),
            to_segment_distance_along_segment_metres: to.distance_along_meters,
            to_segment_start_node: to_segment.start_node,
            to_segment_end_node: to_segment.end_node,
        }
    }
}

/// One step of a routing response. The first and last steps partially cover the segments the
/// snaps are on; the ones in between fully cover a segment and may only identify it by nodes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RoutedTraversal {
    #[serde(default)]
    pub segment_id: Option<SegmentId>,
    #[serde(default)]
    pub start_node: Option<NodeId>,
    #[serde(default)]
    pub end_node: Option<NodeId>,
    #[serde(default)]
    pub start_distance_metres: f64,
    #[serde(default)]
    pub end_distance_metres: f64,
    #[serde(default)]
    pub length_metres: Option<f64>,
}

/// What the routing service responds with
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RouteResponse {
    pub route: Vec<RoutedTraversal>,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct RouteFailure(pub String);

/// Something that can answer routing requests. An empty route means there's no path.
pub trait RoutingCollaborator {
    fn route(&self, request: &RouteRequest) -> Result<Vec<RoutedTraversal>, RouteFailure>;
}

/// Answers routing requests in-process, over the same catalog used for snapping.
pub struct LocalRouter {
    graph: UnGraphMap<NodeId, SegmentKey>,
    edges: HashMap<SegmentKey, Edge>,
    by_id: HashMap<SegmentId, SegmentKey>,
    node_pts: HashMap<NodeId, Coord>,
}

struct Edge {
    id: SegmentId,
    start_node: NodeId,
    end_node: NodeId,
    length_meters: f64,
}

impl LocalRouter {
    /// If `respect_ignored`, ignored segments can't be used in the middle of a route.
    pub fn new(catalog: &SegmentCatalog, respect_ignored: bool) -> LocalRouter {
        let mut router = LocalRouter {
            graph: UnGraphMap::new(),
            edges: HashMap::new(),
            by_id: HashMap::new(),
            node_pts: HashMap::new(),
        };

        for (key, segment) in catalog.iter() {
            router.by_id.insert(segment.id.clone(), key);
            router.edges.insert(
                key,
                Edge {
                    id: segment.id.clone(),
                    start_node: segment.start_node,
                    end_node: segment.end_node,
                    length_meters: segment.length_meters,
                },
            );
            router
                .node_pts
                .entry(segment.start_node)
                .or_insert(segment.points[0]);
            if let Some(last) = segment.points.last() {
                router.node_pts.entry(segment.end_node).or_insert(*last);
            }

            if segment.start_node == segment.end_node
                || (respect_ignored && catalog.is_ignored(&segment.id))
            {
                continue;
            }
            // The graph can only hold one edge per pair, so keep the shortest
            let replace = match router.graph.edge_weight(segment.start_node, segment.end_node) {
                Some(existing) => router.edges[existing].length_meters > segment.length_meters,
                None => true,
            };
            if replace {
                router
                    .graph
                    .add_edge(segment.start_node, segment.end_node, key);
            }
        }

        router
    }

    fn edge(&self, id: &SegmentId) -> Result<&Edge, RouteFailure> {
        self.by_id
            .get(id)
            .map(|key| &self.edges[key])
            .ok_or_else(|| RouteFailure(format!("unknown segment {}", id)))
    }

    fn pathfind(&self, node1: NodeId, node2: NodeId) -> Option<(f64, Vec<NodeId>)> {
        if !self.graph.contains_node(node1) || !self.graph.contains_node(node2) {
            return None;
        }
        let goal_pt = self.node_pts[&node2];
        petgraph::algo::astar(
            &self.graph,
            node1,
            |i| i == node2,
            |(_, _, key)| self.edges[key].length_meters,
            |i| haversine(self.node_pts[&i], goal_pt),
        )
    }

    fn full_traversal(&self, node1: NodeId, node2: NodeId) -> Option<RoutedTraversal> {
        let key = self.graph.edge_weight(node1, node2)?;
        let edge = &self.edges[key];
        let (start, end) = if node1 == edge.start_node {
            (0.0, edge.length_meters)
        } else {
            (edge.length_meters, 0.0)
        };
        Some(RoutedTraversal {
            segment_id: Some(edge.id.clone()),
            start_node: Some(node1),
            end_node: Some(node2),
            start_distance_metres: start,
            end_distance_metres: end,
            length_metres: Some(edge.length_meters),
        })
    }
}

impl RoutingCollaborator for LocalRouter {
    fn route(&self, req: &RouteRequest) -> Result<Vec<RoutedTraversal>, RouteFailure> {
        let from = self.edge(&req.from_segment_id)?;
        let to = self.edge(&req.to_segment_id)?;
        let from_dist = req.from_segment_distance_along_segment_metres;
        let to_dist = req.to_segment_distance_along_segment_metres;

        if req.from_segment_id == req.to_segment_id {
            return Ok(vec![partial(from, from_dist, to_dist)]);
        }

        // Adjacent segments meet at a node; no pathfinding needed
        for (from_node, to_node) in [
            (from.end_node, to.start_node),
            (from.end_node, to.end_node),
            (from.start_node, to.start_node),
            (from.start_node, to.end_node),
        ] {
            if from_node == to_node {
                return Ok(vec![
                    partial(from, from_dist, distance_at(from, from_node)),
                    partial(to, distance_at(to, to_node), to_dist),
                ]);
            }
        }

        // Leaving the first segment from either end and entering the last from either end gives
        // 4 possibilities. Try them all to find the true shortest.
        let mut best: Option<(f64, NodeId, Vec<NodeId>)> = None;
        for leave_via in [from.start_node, from.end_node] {
            for enter_via in [to.start_node, to.end_node] {
                let Some((cost, path)) = self.pathfind(leave_via, enter_via) else {
                    continue;
                };
                let total = cost
                    + (from_dist - distance_at(from, leave_via)).abs()
                    + (distance_at(to, enter_via) - to_dist).abs();
                if best.as_ref().map(|(x, _, _)| total < *x).unwrap_or(true) {
                    best = Some((total, leave_via, path));
                }
            }
        }
        let Some((_, leave_via, path)) = best else {
            return Ok(Vec::new());
        };
        let enter_via = *path.last().unwrap_or(&leave_via);

        let mut route = vec![partial(from, from_dist, distance_at(from, leave_via))];
        for pair in path.windows(2) {
            route.extend(self.full_traversal(pair[0], pair[1]));
        }
        route.push(partial(to, distance_at(to, enter_via), to_dist));
        Ok(route)
    }
}

fn partial(edge: &Edge, start: f64, end: f64) -> RoutedTraversal {
    RoutedTraversal {
        segment_id: Some(edge.id.clone()),
        start_node: None,
        end_node: None,
        start_distance_metres: start,
        end_distance_metres: end,
        length_metres: Some(edge.length_meters),
    }
}

// Distance along the edge of one of its endpoints
fn distance_at(edge: &Edge, node: NodeId) -> f64 {
    if node == edge.start_node {
        0.0
    } else {
        edge.length_meters
    }
}
