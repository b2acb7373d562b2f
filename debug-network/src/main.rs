use anyhow::Result;
use clap::Parser;
use geojson::{Feature, FeatureCollection, Geometry};
use log::info;
use run_recorder::{Config, RunRecorder};

#[derive(Parser)]
struct Args {
    /// Path to a snap.bin file
    input: String,

    /// JSON file overriding the default config, to see how resampling and filtering change things
    #[arg(long)]
    config: Option<String>,

    /// Output file to write
    #[arg(long, default_value = "debug.geojson")]
    output: String,
}

/// Dumps the resampled segments and their endpoints exactly as the recorder sees them.
fn main() -> Result<()> {
    simple_logger::init_with_level(log::Level::Info)?;
    let args = Args::parse();

    let mut recorder = RunRecorder::new(&std::fs::read(&args.input)?)?;
    if let Some(path) = args.config {
        let config: Config = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        recorder.set_config(config);
    }
    let catalog = &recorder.network().catalog;

    let mut features = Vec::new();
    let mut nodes = std::collections::BTreeMap::new();
    for (key, segment) in catalog.iter() {
        let mut f = Feature::from(Geometry::from(&geo::LineString::new(
            segment.points.clone(),
        )));
        f.set_property("key", key.0);
        f.set_property("segment_id", segment.id.0.clone());
        f.set_property("start_node", segment.start_node.0);
        f.set_property("end_node", segment.end_node.0);
        f.set_property("length_meters", segment.length_meters);
        f.set_property("num_points", segment.points.len());
        f.set_property(
            "bbox",
            vec![
                segment.bbox.min().x,
                segment.bbox.min().y,
                segment.bbox.max().x,
                segment.bbox.max().y,
            ],
        );
        features.push(f);

        if let (Some(first), Some(last)) = (segment.points.first(), segment.points.last()) {
            nodes.insert(segment.start_node.0, *first);
            nodes.insert(segment.end_node.0, *last);
        }
    }
    for (id, pt) in nodes {
        let mut f = Feature::from(Geometry::from(geojson::Value::Point(vec![pt.x, pt.y])));
        f.set_property("node_id", id);
        features.push(f);
    }

    info!(
        "Writing {} segments and {} features total to {}",
        catalog.len(),
        features.len(),
        args.output
    );
    let gj = geojson::GeoJson::from(features.into_iter().collect::<FeatureCollection>());
    std::fs::write(&args.output, serde_json::to_string_pretty(&gj)?)?;
    Ok(())
}
