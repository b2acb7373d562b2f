use std::collections::BTreeMap;

use geo::Coord;

/// Placed where the route crosses a whole number of kilometres
#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    pub km: u32,
    pub label: String,
    pub point: Coord,
}

/// The running total of the route, plus its kilometre markers. Markers exist for exactly the
/// whole kilometres between 1 and the total.
#[derive(Default, Clone, Debug)]
pub struct DistanceLedger {
    total_meters: f64,
    markers: BTreeMap<u32, Marker>,
}

impl DistanceLedger {
    pub fn total_meters(&self) -> f64 {
        self.total_meters
    }

    pub fn markers(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    pub fn marker(&self, km: u32) -> Option<&Marker> {
        self.markers.get(&km)
    }

    /// Extends the total. `position_at` finds the point some distance past the old total, so
    /// markers crossed by the new distance can be placed.
    pub fn add_distance<F: Fn(f64) -> Coord>(&mut self, meters: f64, position_at: F) {
        let before = self.total_meters;
        self.total_meters += meters.max(0.0);

        for km in (whole_km(before) + 1)..=whole_km(self.total_meters) {
            let offset = (km as f64) * 1000.0 - before;
            self.markers.insert(
                km,
                Marker {
                    km,
                    label: format!("{} km", km),
                    point: position_at(offset),
                },
            );
        }
    }

    /// Shrinks the total, never below zero, and drops markers past the new total.
    pub fn remove_distance(&mut self, meters: f64) {
        self.total_meters = (self.total_meters - meters.max(0.0)).max(0.0);
        while let Some(km) = self.markers.keys().next_back().copied() {
            if (km as f64) * 1000.0 > self.total_meters {
                self.markers.pop_last();
            } else {
                break;
            }
        }
    }

    pub fn reset(&mut self) {
        self.total_meters = 0.0;
        self.markers.clear();
    }
}

fn whole_km(meters: f64) -> u32 {
    (meters / 1000.0).floor() as u32
}
