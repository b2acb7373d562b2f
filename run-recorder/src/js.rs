use std::collections::{BTreeMap, HashSet};

use geo::{Coord, Rect};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use wasm_bindgen::prelude::*;

use run_recorder_network::SegmentId;

use crate::{
    ClickOutcome, Config, ConnectionMode, RouteFailure, RouteResponse, RouteTicket, RunForm,
    RunRecorder, SurfaceDiff,
};

#[wasm_bindgen]
pub struct JsRunRecorder {
    recorder: RunRecorder,
    // Routed clicks waiting for the host to call the routing service
    pending: BTreeMap<u32, RouteTicket>,
    next_ticket: u32,
    rng: XorShiftRng,
}

#[wasm_bindgen]
impl JsRunRecorder {
    #[wasm_bindgen(constructor)]
    pub fn new(map_bytes: &[u8]) -> Result<JsRunRecorder, JsValue> {
        // Panics shouldn't happen, but if they do, console.log them.
        console_error_panic_hook::set_once();
        // Fails if the logger is already set up, which is fine
        let _ = console_log::init_with_level(log::Level::Info);

        let recorder = RunRecorder::new(map_bytes).map_err(err_to_js)?;
        Ok(JsRunRecorder {
            recorder,
            pending: BTreeMap::new(),
            next_ticket: 0,
            rng: XorShiftRng::from_entropy(),
        })
    }

    /// Returns true if the network was rebuilt, meaning the caller should clear all drawn
    /// segments and refresh the viewport.
    #[wasm_bindgen(js_name = setConfig)]
    pub fn set_config(&mut self, input: JsValue) -> Result<bool, JsValue> {
        let config: Config = serde_wasm_bindgen::from_value(input)?;
        Ok(self.recorder.set_config(config))
    }

    #[wasm_bindgen(js_name = setIgnoredSegments)]
    pub fn set_ignored_segments(&mut self, input: JsValue) -> Result<(), JsValue> {
        let ids: Vec<String> = serde_wasm_bindgen::from_value(input)?;
        self.recorder
            .set_ignored_segments(ids.into_iter().map(SegmentId).collect::<HashSet<_>>());
        Ok(())
    }

    #[wasm_bindgen(js_name = toggleIgnored)]
    pub fn toggle_ignored(&mut self, segment_id: String) -> bool {
        self.recorder.toggle_ignored(SegmentId(segment_id))
    }

    /// Returns `{"add": FeatureCollection, "remove": [key, ...]}`
    #[wasm_bindgen(js_name = refreshViewport)]
    pub fn refresh_viewport(
        &mut self,
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
        zoom: f64,
    ) -> String {
        let bounds = Rect::new(
            Coord {
                x: min_lon,
                y: min_lat,
            },
            Coord {
                x: max_lon,
                y: max_lat,
            },
        );
        let mut diff = SurfaceDiff::default();
        self.recorder.refresh_viewport(bounds, zoom, &mut diff);
        diff.to_json().to_string()
    }

    /// Returns `{"added": section_id}` or, if the host has to call the routing service first,
    /// `{"ticket": n, "request": {...}}`. Pass the response to completeRoute.
    #[wasm_bindgen(js_name = onClick)]
    pub fn on_click(&mut self, lon: f64, lat: f64, routed: bool) -> Result<String, JsValue> {
        let mode = if routed {
            ConnectionMode::Routed
        } else {
            ConnectionMode::Straight
        };
        let result = match self
            .recorder
            .click(Coord { x: lon, y: lat }, mode)
            .map_err(err_to_js)?
        {
            ClickOutcome::Added(id) => serde_json::json!({ "added": id.0 }),
            ClickOutcome::NeedsRoute(ticket) => {
                let n = self.next_ticket;
                self.next_ticket += 1;
                let json = serde_json::json!({ "ticket": n, "request": &ticket.request });
                self.pending.insert(n, ticket);
                json
            }
        };
        Ok(result.to_string())
    }

    /// `response` is the routing service's JSON, `{"route": [...]}`
    #[wasm_bindgen(js_name = completeRoute)]
    pub fn complete_route(&mut self, ticket: u32, response: &str) -> Result<u64, JsValue> {
        let ticket = self.take_ticket(ticket)?;
        let response: RouteResponse = serde_json::from_str(response).map_err(err_to_js)?;
        let id = self
            .recorder
            .complete_route(ticket, Ok(response.route))
            .map_err(err_to_js)?;
        Ok(id.0)
    }

    /// The routing service couldn't be reached. Always returns the error to show the user.
    #[wasm_bindgen(js_name = failRoute)]
    pub fn fail_route(&mut self, ticket: u32, message: String) -> Result<(), JsValue> {
        let ticket = self.take_ticket(ticket)?;
        self.recorder
            .complete_route(ticket, Err(RouteFailure(message)))
            .map(|_| ())
            .map_err(err_to_js)
    }

    pub fn undo(&mut self) -> bool {
        self.recorder.undo().is_some()
    }

    pub fn redo(&mut self) -> Result<u64, JsValue> {
        self.recorder.redo().map(|id| id.0).map_err(err_to_js)
    }

    pub fn reset(&mut self) {
        self.recorder.reset();
        self.pending.clear();
    }

    #[wasm_bindgen(js_name = canUndo)]
    pub fn can_undo(&self) -> bool {
        self.recorder.route().can_undo()
    }

    #[wasm_bindgen(js_name = canRedo)]
    pub fn can_redo(&self) -> bool {
        self.recorder.route().can_redo()
    }

    #[wasm_bindgen(js_name = totalMeters)]
    pub fn total_meters(&self) -> f64 {
        self.recorder.route().total_meters()
    }

    #[wasm_bindgen(js_name = renderGeojson)]
    pub fn render_geojson(&self) -> String {
        self.recorder.render_geojson()
    }

    #[wasm_bindgen(js_name = toFinalFeature)]
    pub fn to_final_feature(&self) -> Option<String> {
        self.recorder.to_final_feature()
    }

    /// Validates the form and returns the JSON payload for run storage. Nothing changes until
    /// the host reports success with onSubmitted.
    #[wasm_bindgen(js_name = buildSubmission)]
    pub fn build_submission(&mut self, form: JsValue) -> Result<String, JsValue> {
        let form: RunForm = serde_wasm_bindgen::from_value(form)?;
        let run = self
            .recorder
            .build_submission(&form, &mut self.rng)
            .map_err(err_to_js)?;
        serde_json::to_string(&run).map_err(err_to_js)
    }

    #[wasm_bindgen(js_name = onSubmitted)]
    pub fn on_submitted(&mut self) {
        self.reset();
    }
}

impl JsRunRecorder {
    fn take_ticket(&mut self, ticket: u32) -> Result<RouteTicket, JsValue> {
        self.pending
            .remove(&ticket)
            .ok_or_else(|| JsValue::from_str(&format!("Unknown routing ticket {}", ticket)))
    }
}

fn err_to_js<E: std::fmt::Display>(err: E) -> JsValue {
    JsValue::from_str(&err.to_string())
}
