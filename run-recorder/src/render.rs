use std::collections::BTreeSet;

use geo::{LineString, Rect};
use geojson::{Feature, FeatureCollection, Geometry};

use crate::catalog::{Segment, SegmentKey};
use crate::{Config, Network};

/// Wherever segments actually get drawn
pub trait MapSurface {
    fn add_segment(&mut self, key: SegmentKey, segment: &Segment);
    fn remove_segment(&mut self, key: SegmentKey);
}

/// Keeps the segments drawn on the map in sync with the viewport, touching only what changed.
#[derive(Default)]
pub struct ViewportRenderer {
    shown: BTreeSet<SegmentKey>,
}

impl ViewportRenderer {
    pub fn shown(&self) -> &BTreeSet<SegmentKey> {
        &self.shown
    }

    pub fn refresh(
        &mut self,
        network: &Network,
        config: &Config,
        bounds: Rect,
        zoom: f64,
        surface: &mut dyn MapSurface,
    ) {
        if zoom < config.min_render_zoom {
            self.clear(surface);
            return;
        }

        let visible = network.index.query(bounds);
        // Ignored segments are always redrawn, so toggling one shows up immediately
        let ignored = network.catalog.ignored_keys();

        for key in &self.shown {
            if !visible.contains(key) || ignored.contains(key) {
                surface.remove_segment(*key);
            }
        }
        for key in &visible {
            if !self.shown.contains(key) || ignored.contains(key) {
                surface.add_segment(*key, network.catalog.get(*key));
            }
        }
        self.shown = visible;
    }

    pub fn clear(&mut self, surface: &mut dyn MapSurface) {
        for key in std::mem::take(&mut self.shown) {
            surface.remove_segment(key);
        }
    }

    /// Forget what's drawn without touching the map. Used when the network is rebuilt and the
    /// old keys mean nothing anymore.
    pub fn forget(&mut self) {
        self.shown.clear();
    }
}

/// Records changes instead of drawing them, so they can be shipped elsewhere as GeoJSON.
#[derive(Default)]
pub struct SurfaceDiff {
    added: Vec<Feature>,
    removed: Vec<u32>,
}

impl MapSurface for SurfaceDiff {
    fn add_segment(&mut self, key: SegmentKey, segment: &Segment) {
        let mut f = Feature::from(Geometry::from(&LineString::new(segment.points.clone())));
        f.set_property("key", key.0);
        f.set_property("segment_id", segment.id.0.clone());
        f.set_property("length_meters", segment.length_meters);
        self.added.push(f);
    }

    fn remove_segment(&mut self, key: SegmentKey) {
        self.removed.push(key.0);
    }
}

impl SurfaceDiff {
    pub fn added(&self) -> &[Feature] {
        &self.added
    }

    pub fn removed(&self) -> &[u32] {
        &self.removed
    }

    /// `{"add": FeatureCollection, "remove": [key, ...]}`
    pub fn to_json(self) -> serde_json::Value {
        let add = FeatureCollection {
            bbox: None,
            features: self.added,
            foreign_members: None,
        };
        serde_json::json!({
            "add": add,
            "remove": self.removed,
        })
    }
}
