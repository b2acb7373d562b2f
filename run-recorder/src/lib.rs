//! Record a run by clicking points on a map. Each click snaps to a road network, and consecutive
//! clicks are joined with straight lines or with routes along the network.

use std::collections::HashSet;

use anyhow::Result;
use geo::{Coord, LineString, Rect};
use geojson::{Feature, FeatureCollection, Geometry};
use log::info;
use rand::Rng;
use serde::Deserialize;

use run_recorder_network::{NetworkMap, SegmentId};

pub use crate::catalog::{resample, Segment, SegmentCatalog, SegmentKey};
pub use crate::error::{RecorderError, ValidationError};
pub use crate::index::SpatialIndex;
pub use crate::ledger::{DistanceLedger, Marker};
pub use crate::render::{MapSurface, SurfaceDiff, ViewportRenderer};
pub use crate::route::{
    Anchor, ClickOutcome, Connection, ConnectionMode, Route, RouteSection, RouteState,
    RouteTicket, SectionId,
};
pub use crate::router::{
    LocalRouter, RouteFailure, RouteRequest, RouteResponse, RoutedTraversal, RoutingCollaborator,
};
pub use crate::snap::{snap_to_network, Snap};
pub use crate::stitch::{stitch, StitchedRoute, Traversal};
pub use crate::submit::{MemoryRunStorage, RunForm, RunStorage, RunSubmission, StorageError};

mod catalog;
mod error;
pub mod geometry;
mod index;
#[cfg(target_arch = "wasm32")]
mod js;
mod ledger;
mod render;
mod route;
mod router;
mod snap;
mod stitch;
pub mod submit;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Segments are resampled so no two consecutive points are further apart than this
    pub resample_spacing_meters: f64,
    /// Shorter segments aren't loaded at all
    pub min_segment_length_meters: f64,
    /// The first search box around a click reaches this far. It doubles on every retry.
    pub snap_radius_meters: f64,
    pub snap_retries: u32,
    /// Below this zoom, no segments are drawn
    pub min_render_zoom: f64,
    /// Consecutive pieces of a routed path closer than this are considered connected
    pub stitch_tolerance_meters: f64,
    /// The chance of each point in a submitted run being nudged
    pub jitter_probability: f64,
    pub jitter_max_degrees: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            resample_spacing_meters: 10.0,
            min_segment_length_meters: 0.0,
            snap_radius_meters: 20.0,
            snap_retries: 5,
            min_render_zoom: 15.0,
            stitch_tolerance_meters: 5.0,
            jitter_probability: 0.5,
            jitter_max_degrees: 0.00005,
        }
    }
}

impl Config {
    // Changing these means the catalog and index have to be rebuilt
    fn needs_rebuild(&self, other: &Config) -> bool {
        self.resample_spacing_meters != other.resample_spacing_meters
            || self.min_segment_length_meters != other.min_segment_length_meters
    }
}

/// The segment catalog and the spatial index over it. Never modified after it's built, apart
/// from which segments are ignored.
pub struct Network {
    pub catalog: SegmentCatalog,
    pub index: SpatialIndex,
    generation: u64,
}

impl Network {
    pub fn new(
        map: &NetworkMap,
        config: &Config,
        ignored: HashSet<SegmentId>,
        generation: u64,
    ) -> Network {
        let catalog = SegmentCatalog::new(map, config, ignored);
        let index = SpatialIndex::new(&catalog);
        Network {
            catalog,
            index,
            generation,
        }
    }

    /// Distinguishes one build from the next
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Everything for one map session: the network, the route being recorded, and what's drawn.
pub struct RunRecorder {
    source: NetworkMap,
    network: Network,
    route: Route,
    renderer: ViewportRenderer,
    config: Config,
}

impl RunRecorder {
    /// Loads a network produced by geojson-to-run-recorder
    pub fn new(map_bytes: &[u8]) -> Result<RunRecorder> {
        info!("Got {} bytes, deserializing", map_bytes.len());
        let map: NetworkMap = bincode::deserialize(map_bytes)?;
        Ok(RunRecorder::from_network_map(map, Config::default()))
    }

    pub fn from_geojson(input: &str) -> Result<RunRecorder> {
        let map = NetworkMap::from_geojson(input)?;
        Ok(RunRecorder::from_network_map(map, Config::default()))
    }

    pub fn from_network_map(map: NetworkMap, config: Config) -> RunRecorder {
        info!("Building catalog and index for {} segments", map.segments.len());
        let network = Network::new(&map, &config, HashSet::new(), 0);
        RunRecorder {
            source: map,
            network,
            route: Route::new(),
            renderer: ViewportRenderer::default(),
            config,
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns true if the network had to be rebuilt. In that case, the caller should clear all
    /// drawn segments and refresh the viewport.
    pub fn set_config(&mut self, config: Config) -> bool {
        let rebuild = config.needs_rebuild(&self.config);
        self.config = config;
        if rebuild {
            info!("Network filters changed, rebuilding");
            // Build the new one completely before swapping it in
            let network = Network::new(
                &self.source,
                &self.config,
                self.network.catalog.ignored().clone(),
                self.network.generation() + 1,
            );
            self.network = network;
            self.renderer.forget();
        }
        rebuild
    }

    /// The caller should refresh the viewport afterwards.
    pub fn set_ignored_segments(&mut self, ids: HashSet<SegmentId>) {
        self.network.catalog.set_ignored(ids);
    }

    /// Returns true if the segment is now ignored. The caller should refresh the viewport.
    pub fn toggle_ignored(&mut self, id: SegmentId) -> bool {
        self.network.catalog.toggle_ignored(id)
    }

    pub fn refresh_viewport(&mut self, bounds: Rect, zoom: f64, surface: &mut dyn MapSurface) {
        self.renderer
            .refresh(&self.network, &self.config, bounds, zoom, surface);
    }

    pub fn shown_segments(&self) -> usize {
        self.renderer.shown().len()
    }

    /// Routes within the network loaded here, without any network calls
    pub fn local_router(&self, respect_ignored: bool) -> LocalRouter {
        LocalRouter::new(&self.network.catalog, respect_ignored)
    }

    pub fn click(&mut self, pt: Coord, mode: ConnectionMode) -> Result<ClickOutcome, RecorderError> {
        self.route.click(&self.network, &self.config, pt, mode)
    }

    pub fn complete_route(
        &mut self,
        ticket: RouteTicket,
        response: Result<Vec<RoutedTraversal>, RouteFailure>,
    ) -> Result<SectionId, RecorderError> {
        self.route
            .complete_route(&self.network, &self.config, ticket, response)
    }

    pub fn click_with_router(
        &mut self,
        pt: Coord,
        mode: ConnectionMode,
        router: &dyn RoutingCollaborator,
    ) -> Result<SectionId, RecorderError> {
        self.route
            .click_with_router(&self.network, &self.config, pt, mode, router)
    }

    pub fn undo(&mut self) -> Option<SectionId> {
        self.route.undo()
    }

    pub fn redo(&mut self) -> Result<SectionId, RecorderError> {
        self.route.redo()
    }

    pub fn reset(&mut self) {
        self.route.reset();
    }

    /// Validates and builds the payload to store, without changing anything.
    pub fn build_submission<R: Rng>(
        &self,
        form: &RunForm,
        rng: &mut R,
    ) -> Result<RunSubmission, RecorderError> {
        submit::build_submission(
            self.route.sections(),
            self.route.total_meters(),
            &self.network.catalog,
            form,
            &self.config,
            rng,
        )
    }

    /// Stores the run and starts over. If anything fails, the route is untouched.
    pub fn submit<R: Rng>(
        &mut self,
        form: &RunForm,
        storage: &mut dyn RunStorage,
        rng: &mut R,
    ) -> Result<RunSubmission, RecorderError> {
        let run = self.build_submission(form, rng)?;
        storage.store_run(&run)?;
        info!(
            "Stored a {:.2} mile run on {} covering {} segments",
            run.distance_miles,
            run.date,
            run.segment_traversals.len()
        );
        self.reset();
        Ok(run)
    }

    /// The entire route as one LineString, or None if there's nothing drawn yet
    pub fn to_final_feature(&self) -> Option<String> {
        let mut pts: Vec<Coord> = self
            .route
            .sections()
            .iter()
            .flat_map(|s| s.geometry())
            .collect();
        pts.dedup();
        if pts.len() < 2 {
            return None;
        }
        let mut feature = Feature::from(Geometry::from(&LineString::new(pts)));
        feature.set_property("length_meters", self.route.total_meters());
        Some(feature.to_string())
    }

    /// Everything about the current route to draw: the lines, clicked and snapped points, snap
    /// indicators and kilometre markers.
    pub fn render_geojson(&self) -> String {
        let mut features = Vec::new();

        for section in self.route.sections() {
            let pts = section.geometry();
            if pts.len() >= 2 {
                let mut f = Feature::from(Geometry::from(&LineString::new(pts)));
                f.set_property("type", if section.is_routed() { "routed" } else { "straight" });
                f.set_property("section", section.id.0);
                f.set_property("distance_meters", section.distance_meters);
                features.push(f);
            }

            if let Some(line) = section.snap_indicator() {
                let mut f = Feature::from(Geometry::from(&LineString::from(line)));
                f.set_property("type", "snap_indicator");
                f.set_property("section", section.id.0);
                features.push(f);
            }

            let end = section.end_point();
            let mut f = Feature::from(Geometry::from(geojson::Value::Point(vec![end.x, end.y])));
            f.set_property("type", "waypoint");
            f.set_property("section", section.id.0);
            features.push(f);
        }

        for marker in self.route.markers() {
            let mut f = Feature::from(Geometry::from(geojson::Value::Point(vec![
                marker.point.x,
                marker.point.y,
            ])));
            f.set_property("type", "marker");
            f.set_property("label", marker.label.clone());
            features.push(f);
        }

        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
        .to_string()
    }
}
