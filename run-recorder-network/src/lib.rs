use anyhow::{bail, Result};
use geo::line_measures::LengthMeasurable;
use geo::{Coord, Geometry, Haversine, LineString};
use geojson::de::deserialize_geometry;
use serde::{Deserialize, Serialize};

/// The road network a run is recorded against, exactly as the geometry source delivered it.
/// Resampling and indexing happen later, when the engine builds its catalog.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NetworkMap {
    pub segments: Vec<NetworkSegment>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NetworkSegment {
    pub id: SegmentId,
    pub start_node: NodeId,
    pub end_node: NodeId,
    pub length_meters: f64,
    /// Goes from start_node to end_node
    pub geometry: LineString,
    /// The source had a MultiLineString with more than one part. The parts are flattened into
    /// `geometry`, but the result shouldn't be trusted for interpolation.
    pub multi_part: bool,
}

/// Stable external identifier, like "123456_0"
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SegmentId(pub String);

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(pub i64);

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl NetworkMap {
    /// Parses a GeoJSON FeatureCollection of segments. Every feature needs `segment_id`,
    /// `start_node` and `end_node` properties and a LineString or MultiLineString geometry.
    /// `length_m` is optional; when missing or nonsense, the haversine length is used.
    pub fn from_geojson(input: &str) -> Result<NetworkMap> {
        let input: Vec<InputSegment> = geojson::de::deserialize_feature_collection_str_to_vec(input)?;
        if input.is_empty() {
            bail!("No segments in the input. The input is probably incorrect.");
        }

        let mut segments = Vec::with_capacity(input.len());
        for segment in input {
            let (geometry, multi_part) = match segment.geometry {
                Geometry::LineString(ls) => (ls, false),
                Geometry::MultiLineString(mls) => {
                    let multi_part = mls.0.len() > 1;
                    let pts: Vec<Coord> = mls.0.into_iter().flat_map(|ls| ls.0).collect();
                    (LineString::new(pts), multi_part)
                }
                _ => bail!(
                    "Segment {} isn't a LineString or MultiLineString",
                    segment.segment_id
                ),
            };
            if geometry.0.len() < 2 {
                bail!("Segment {} has fewer than 2 points", segment.segment_id);
            }

            let length_meters = match segment.length_m {
                Some(x) if x.is_finite() && x >= 0.0 => x,
                _ => geometry.length(&Haversine),
            };

            segments.push(NetworkSegment {
                id: segment.segment_id,
                start_node: segment.start_node,
                end_node: segment.end_node,
                length_meters,
                geometry,
                multi_part,
            });
        }

        Ok(NetworkMap { segments })
    }
}

#[derive(Deserialize)]
struct InputSegment {
    #[serde(deserialize_with = "deserialize_geometry")]
    geometry: Geometry,
    #[serde(deserialize_with = "deserialize_segment_id")]
    segment_id: SegmentId,
    start_node: NodeId,
    end_node: NodeId,
    length_m: Option<f64>,
}

// OSM-derived IDs are usually strings, but plain numbers show up in hand-made files
fn deserialize_segment_id<'de, D: serde::Deserializer<'de>>(d: D) -> Result<SegmentId, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Str(String),
        Int(i64),
    }
    Ok(match RawId::deserialize(d)? {
        RawId::Str(x) => SegmentId(x),
        RawId::Int(x) => SegmentId(x.to_string()),
    })
}
