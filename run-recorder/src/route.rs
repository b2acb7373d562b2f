use geo::{Coord, Line};
use log::{debug, info, warn};

use crate::error::RecorderError;
use crate::geometry::{haversine, lerp};
use crate::ledger::{DistanceLedger, Marker};
use crate::router::{RouteFailure, RouteRequest, RoutedTraversal, RoutingCollaborator};
use crate::snap::{snap_to_network, Snap};
use crate::stitch::{stitch, Traversal};
use crate::{Config, Network};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SectionId(pub u64);

/// How the user wants the next click connected to the previous one
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConnectionMode {
    Straight,
    Routed,
}

/// Which point the drawn route actually passes through for a section
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Anchor {
    Clicked,
    Snapped,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Connection {
    /// The first section of a route isn't connected to anything
    Start,
    Straight(Line),
    Routed {
        pts: Vec<Coord>,
        traversals: Vec<Traversal>,
    },
}

/// One click's worth of route: the point plus how it connects to the previous section. This is
/// the unit of undo and redo.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteSection {
    pub id: SectionId,
    pub predecessor: Option<SectionId>,
    pub clicked: Coord,
    pub snap: Option<Snap>,
    pub anchor: Anchor,
    pub connection: Connection,
    pub distance_meters: f64,
}

impl RouteSection {
    /// Where the drawn route currently ends
    pub fn end_point(&self) -> Coord {
        match (self.anchor, &self.snap) {
            (Anchor::Snapped, Some(snap)) => snap.point,
            _ => self.clicked,
        }
    }

    pub fn is_routed(&self) -> bool {
        matches!(self.connection, Connection::Routed { .. })
    }

    /// From the clicked point to where it snapped
    pub fn snap_indicator(&self) -> Option<Line> {
        self.snap
            .as_ref()
            .map(|snap| Line::new(self.clicked, snap.point))
    }

    pub fn geometry(&self) -> Vec<Coord> {
        match self.connection {
            Connection::Start => Vec::new(),
            Connection::Straight(line) => vec![line.start, line.end],
            Connection::Routed { ref pts, .. } => pts.clone(),
        }
    }

    pub fn traversals(&self) -> &[Traversal] {
        match self.connection {
            Connection::Routed { ref traversals, .. } => traversals,
            _ => &[],
        }
    }

    /// Approximates the point some distance along this section's connection. Within one routed
    /// traversal, points are assumed to be evenly spaced.
    pub fn position_at(&self, offset_meters: f64) -> Coord {
        match self.connection {
            Connection::Start => self.end_point(),
            Connection::Straight(line) => {
                if self.distance_meters <= 0.0 {
                    return line.end;
                }
                lerp(
                    line.start,
                    line.end,
                    (offset_meters / self.distance_meters).clamp(0.0, 1.0),
                )
            }
            Connection::Routed {
                ref pts,
                ref traversals,
            } => {
                let mut so_far = 0.0;
                for traversal in traversals {
                    if offset_meters <= so_far + traversal.distance_meters {
                        let slice = &pts[traversal.pts.clone()];
                        if slice.is_empty() {
                            break;
                        }
                        let fraction = if traversal.distance_meters > 0.0 {
                            ((offset_meters - so_far) / traversal.distance_meters).clamp(0.0, 1.0)
                        } else {
                            0.0
                        };
                        let idx = (fraction * (slice.len() - 1) as f64).round() as usize;
                        return slice[idx];
                    }
                    so_far += traversal.distance_meters;
                }
                pts.last().cloned().unwrap_or_else(|| self.end_point())
            }
        }
    }
}

/// Returned by a routed click. The caller sends `request` to the routing collaborator, then
/// hands the ticket back with the answer.
#[derive(Clone, Debug)]
pub struct RouteTicket {
    pub request: RouteRequest,
    revision: u64,
    generation: u64,
    predecessor: SectionId,
    clicked: Coord,
    from: Snap,
    to: Snap,
    // Replaces the predecessor if the route comes through
    correction: Option<RouteSection>,
}

#[derive(Debug)]
pub enum ClickOutcome {
    Added(SectionId),
    NeedsRoute(RouteTicket),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RouteState {
    Empty,
    Building { redo_available: bool },
}

/// The route being built, plus everything needed to undo and redo it
#[derive(Default)]
pub struct Route {
    sections: Vec<RouteSection>,
    // The top is the most recently undone section
    redo: Vec<RouteSection>,
    ledger: DistanceLedger,
    next_id: u64,
    // Bumped on every change to sections, so late routing responses can be detected
    revision: u64,
}

impl Route {
    pub fn new() -> Route {
        Route::default()
    }

    pub fn sections(&self) -> &[RouteSection] {
        &self.sections
    }

    pub fn redo_entries(&self) -> &[RouteSection] {
        &self.redo
    }

    pub fn total_meters(&self) -> f64 {
        self.ledger.total_meters()
    }

    pub fn markers(&self) -> impl Iterator<Item = &Marker> {
        self.ledger.markers()
    }

    pub fn ledger(&self) -> &DistanceLedger {
        &self.ledger
    }

    pub fn state(&self) -> RouteState {
        // Even if everything was undone and could come back with redo, there's no route right now
        if self.sections.is_empty() {
            RouteState::Empty
        } else {
            RouteState::Building {
                redo_available: !self.redo.is_empty(),
            }
        }
    }

    /// Undo, reset and submit all need something to act on
    pub fn can_undo(&self) -> bool {
        !self.sections.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Handles a click. Straight lines and the first point are added immediately. A routed
    /// connection needs an answer from the routing collaborator first; see `complete_route`.
    pub fn click(
        &mut self,
        network: &Network,
        config: &Config,
        pt: Coord,
        mode: ConnectionMode,
    ) -> Result<ClickOutcome, RecorderError> {
        let snap = snap_to_network(network, pt, config);
        if snap.is_none() && mode == ConnectionMode::Routed {
            return Err(RecorderError::Snapping);
        }

        let Some(prev) = self.sections.last() else {
            let anchor = if mode == ConnectionMode::Routed {
                Anchor::Snapped
            } else {
                Anchor::Clicked
            };
            let id = self.add_new(RouteSection {
                id: SectionId(0),
                predecessor: None,
                clicked: pt,
                snap,
                anchor,
                connection: Connection::Start,
                distance_meters: 0.0,
            });
            return Ok(ClickOutcome::Added(id));
        };

        let prev_snap = prev.snap.as_ref().and_then(|s| network.catalog.resolve(s));
        if let (ConnectionMode::Routed, Some(from), Some(to)) = (mode, prev_snap, snap.clone()) {
            // If the previous point was drawn freehand, the route will start from its snap
            // instead, so fix the line leading to it.
            let correction = if prev.anchor == Anchor::Clicked {
                Some(snap_corrected(prev, &from))
            } else {
                None
            };
            let request = RouteRequest::new(&network.catalog, &from, &to);
            debug!("Need a route for {:?}", request);
            return Ok(ClickOutcome::NeedsRoute(RouteTicket {
                request,
                revision: self.revision,
                generation: network.generation(),
                predecessor: prev.id,
                clicked: pt,
                from,
                to,
                correction,
            }));
        }

        let line = Line::new(prev.end_point(), pt);
        let predecessor = prev.id;
        let id = self.add_new(RouteSection {
            id: SectionId(0),
            predecessor: Some(predecessor),
            clicked: pt,
            snap,
            anchor: Anchor::Clicked,
            connection: Connection::Straight(line),
            distance_meters: haversine(line.start, line.end),
        });
        Ok(ClickOutcome::Added(id))
    }

    /// Finishes a routed click, as long as nothing has changed since the ticket was issued. On
    /// any failure, the route is left exactly as it was before the click.
    pub fn complete_route(
        &mut self,
        network: &Network,
        config: &Config,
        ticket: RouteTicket,
        response: Result<Vec<RoutedTraversal>, RouteFailure>,
    ) -> Result<SectionId, RecorderError> {
        if ticket.revision != self.revision
            || ticket.generation != network.generation()
            || self.sections.last().map(|s| s.id) != Some(ticket.predecessor)
        {
            warn!("Ignoring a late routing response for {:?}", ticket.request);
            return Err(RecorderError::StaleRoute);
        }
        let route = response.map_err(|err| RecorderError::NetworkFailure(err.0))?;

        let (connection, distance_meters) = if route.is_empty() {
            // Disconnected points; a straight line is better than nothing
            info!(
                "No route between {} and {}, drawing a straight line",
                ticket.from.segment_id, ticket.to.segment_id
            );
            let line = Line::new(ticket.from.point, ticket.to.point);
            (Connection::Straight(line), haversine(line.start, line.end))
        } else {
            let stitched = stitch(
                &network.catalog,
                &ticket.from,
                &ticket.to,
                &route,
                config.stitch_tolerance_meters,
            )?;
            (
                Connection::Routed {
                    pts: stitched.pts,
                    traversals: stitched.traversals,
                },
                stitched.distance_meters,
            )
        };

        if let Some(corrected) = ticket.correction {
            if let Some(old) = self.sections.pop() {
                self.ledger.remove_distance(old.distance_meters);
            }
            self.ledger
                .add_distance(corrected.distance_meters, |offset| corrected.position_at(offset));
            self.sections.push(corrected);
        }

        Ok(self.add_new(RouteSection {
            id: SectionId(0),
            predecessor: Some(ticket.predecessor),
            clicked: ticket.clicked,
            snap: Some(ticket.to),
            anchor: Anchor::Snapped,
            connection,
            distance_meters,
        }))
    }

    /// Clicks, and if a route is needed, asks the collaborator right away.
    pub fn click_with_router(
        &mut self,
        network: &Network,
        config: &Config,
        pt: Coord,
        mode: ConnectionMode,
        router: &dyn RoutingCollaborator,
    ) -> Result<SectionId, RecorderError> {
        match self.click(network, config, pt, mode)? {
            ClickOutcome::Added(id) => Ok(id),
            ClickOutcome::NeedsRoute(ticket) => {
                let response = router.route(&ticket.request);
                self.complete_route(network, config, ticket, response)
            }
        }
    }

    /// Returns the undone section, if there was one
    pub fn undo(&mut self) -> Option<SectionId> {
        let section = self.sections.pop()?;
        self.ledger.remove_distance(section.distance_meters);
        if self.sections.is_empty() {
            // Don't let floating point drift leave a tiny total behind
            self.ledger.reset();
        }

        // Only one unbroken chain of undone sections can be redone
        if let Some(top) = self.redo.last() {
            if top.predecessor != Some(section.id) {
                self.redo.clear();
            }
        }
        let id = section.id;
        self.redo.push(section);
        self.revision += 1;
        Some(id)
    }

    /// Restores the most recently undone section exactly as it was, without snapping or routing
    /// again.
    pub fn redo(&mut self) -> Result<SectionId, RecorderError> {
        let section = self.redo.pop().ok_or(RecorderError::NothingToRedo)?;
        if section.predecessor != self.sections.last().map(|s| s.id) {
            warn!("Redo entry {:?} doesn't continue the route; dropping the redo chain", section.id);
            self.redo.clear();
            return Err(RecorderError::NothingToRedo);
        }
        let id = section.id;
        self.push(section);
        Ok(id)
    }

    pub fn reset(&mut self) {
        self.sections.clear();
        self.redo.clear();
        self.ledger.reset();
        self.revision += 1;
    }

    // For sections created by a new click. Assigns the ID and invalidates anything to redo.
    fn add_new(&mut self, mut section: RouteSection) -> SectionId {
        section.id = SectionId(self.next_id);
        self.next_id += 1;
        if !self.redo.is_empty() {
            debug!("New click, forgetting {} sections to redo", self.redo.len());
            self.redo.clear();
        }
        let id = section.id;
        self.push(section);
        id
    }

    fn push(&mut self, section: RouteSection) {
        self.ledger
            .add_distance(section.distance_meters, |offset| section.position_at(offset));
        self.sections.push(section);
        self.revision += 1;
    }
}

// The same section, but ending at its snapped point instead of where it was clicked
fn snap_corrected(section: &RouteSection, snap: &Snap) -> RouteSection {
    let mut corrected = section.clone();
    corrected.snap = Some(snap.clone());
    corrected.anchor = Anchor::Snapped;
    if let Connection::Straight(line) = section.connection {
        let line = Line::new(line.start, snap.point);
        corrected.connection = Connection::Straight(line);
        corrected.distance_meters = haversine(line.start, line.end);
    }
    corrected
}
