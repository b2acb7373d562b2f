use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveDate;
use geo::Coord;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use run_recorder_network::SegmentId;

use crate::catalog::SegmentCatalog;
use crate::error::{RecorderError, ValidationError};
use crate::route::RouteSection;
use crate::Config;

const METERS_PER_MILE: f64 = 1609.344;

/// What the user fills in before submitting
#[derive(Deserialize, Clone, Debug, Default)]
pub struct RunForm {
    pub date: String,
    pub duration: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub allow_multiple: bool,
}

/// The payload handed to run storage
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunSubmission {
    pub date: String,
    pub distance_miles: f64,
    pub duration: Option<String>,
    pub comments: Option<String>,
    /// `LINESTRING(lat lon, lat lon, ...)`
    pub linestring: String,
    pub allow_multiple: bool,
    pub segment_traversals: BTreeMap<String, u32>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Already a run on this date, and multiple weren't allowed
    #[error("{0}")]
    DuplicateRun(String),
    #[error("{0}")]
    Unreachable(String),
}

impl From<StorageError> for RecorderError {
    fn from(err: StorageError) -> RecorderError {
        match err {
            StorageError::DuplicateRun(reason) => RecorderError::DuplicateRun(reason),
            StorageError::Unreachable(reason) => RecorderError::NetworkFailure(reason),
        }
    }
}

pub trait RunStorage {
    fn store_run(&mut self, run: &RunSubmission) -> Result<(), StorageError>;
}

/// Keeps runs in memory, with the same duplicate-date rule as the real storage.
#[derive(Default)]
pub struct MemoryRunStorage {
    pub runs: Vec<RunSubmission>,
}

impl RunStorage for MemoryRunStorage {
    fn store_run(&mut self, run: &RunSubmission) -> Result<(), StorageError> {
        if !run.allow_multiple && self.runs.iter().any(|x| x.date == run.date) {
            return Err(StorageError::DuplicateRun(format!(
                "Run already exists for {}, and `allow_multiple`=False: new segments will not be added.",
                run.date
            )));
        }
        self.runs.push(run.clone());
        Ok(())
    }
}

/// Checks the form and the route, then builds the payload. Doesn't change anything.
pub fn build_submission<R: Rng>(
    sections: &[RouteSection],
    total_meters: f64,
    catalog: &SegmentCatalog,
    form: &RunForm,
    config: &Config,
    rng: &mut R,
) -> Result<RunSubmission, RecorderError> {
    validate(form, total_meters)?;

    Ok(RunSubmission {
        date: form.date.clone(),
        distance_miles: total_meters / METERS_PER_MILE,
        duration: form.duration.clone(),
        comments: form.comments.clone(),
        linestring: to_wkt(&jittered_path(sections, config, rng)),
        allow_multiple: form.allow_multiple,
        segment_traversals: count_traversals(sections, catalog),
    })
}

pub fn validate(form: &RunForm, total_meters: f64) -> Result<(), ValidationError> {
    if total_meters <= 0.0 {
        return Err(ValidationError::ZeroDistance);
    }
    let duration = match form.duration {
        Some(ref x) if !x.trim().is_empty() => x,
        _ => return Err(ValidationError::MissingDuration),
    };
    if parse_duration(duration)?.is_zero() {
        return Err(ValidationError::ZeroDuration);
    }
    parse_date(&form.date)?;
    Ok(())
}

/// Parses `HH:MM:SS.sss`. The fraction can have 1 to 3 digits, or be left off.
pub fn parse_duration(input: &str) -> Result<Duration, ValidationError> {
    let invalid = || ValidationError::InvalidDuration(input.to_string());
    let parts: Vec<&str> = input.trim().split(':').collect();
    let [hours, minutes, seconds] = parts[..] else {
        return Err(invalid());
    };
    let (seconds, millis) = match seconds.split_once('.') {
        Some((s, ms)) => (s, ms),
        None => (seconds, "0"),
    };

    let digits = |x: &str, max_len: usize| -> Result<u64, ValidationError> {
        if x.is_empty() || x.len() > max_len || !x.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        x.parse().map_err(|_| invalid())
    };
    let hours = digits(hours, 3)?;
    let minutes = digits(minutes, 2)?;
    let seconds = digits(seconds, 2)?;
    // ".5" means 500ms
    let millis = digits(millis, 3)? * 10_u64.pow(3 - millis.len() as u32);
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    Ok(Duration::from_millis(
        ((hours * 60 + minutes) * 60 + seconds) * 1000 + millis,
    ))
}

/// Only real calendar dates, written YYYY-MM-DD
pub fn parse_date(input: &str) -> Result<NaiveDate, ValidationError> {
    let invalid = || ValidationError::InvalidDate(input.to_string());
    if input.len() != "2021-06-01".len() {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| invalid())
}

/// How many times each segment was traversed. Passing over the same segment in the same
/// direction in consecutive traversals counts once, but doubling back counts again. A traversal
/// drawn as a single point, like leaving a segment from the junction it was snapped at, doesn't
/// count.
pub fn count_traversals(
    sections: &[RouteSection],
    catalog: &SegmentCatalog,
) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    let mut prev: Option<(&SegmentId, bool)> = None;
    for traversal in sections.iter().flat_map(|s| s.traversals()) {
        if traversal.pts.len() < 2 {
            continue;
        }
        let current = (&traversal.segment_id, traversal.forward);
        if prev != Some(current) && !catalog.is_ignored(&traversal.segment_id) {
            *counts.entry(traversal.segment_id.0.clone()).or_insert(0) += 1;
        }
        prev = Some(current);
    }
    counts
}

/// The whole route as one line, with some points nudged randomly so the exact path isn't
/// stored.
pub fn jittered_path<R: Rng>(sections: &[RouteSection], config: &Config, rng: &mut R) -> Vec<Coord> {
    let mut pts: Vec<Coord> = sections.iter().flat_map(|s| s.geometry()).collect();
    pts.dedup();

    let max = config.jitter_max_degrees;
    if max > 0.0 {
        for pt in &mut pts {
            if rng.gen_bool(config.jitter_probability.clamp(0.0, 1.0)) {
                pt.x += rng.gen_range(-max..=max);
                pt.y += rng.gen_range(-max..=max);
            }
        }
    }
    pts
}

/// Latitude comes first, as the run storage expects
pub fn to_wkt(pts: &[Coord]) -> String {
    let pairs: Vec<String> = pts
        .iter()
        .map(|pt| format!("{:.6} {:.6}", pt.y, pt.x))
        .collect();
    format!("LINESTRING({})", pairs.join(", "))
}
