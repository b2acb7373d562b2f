use std::fs::File;
use std::io::BufWriter;

use anyhow::Result;
use clap::Parser;
use log::info;
use run_recorder_network::NetworkMap;

#[derive(Parser)]
struct Args {
    /// Path to a .geojson file with one LineString feature per segment
    #[arg(long)]
    input: String,

    /// Output file to write
    #[arg(long, default_value = "snap.bin")]
    output: String,
}

fn main() -> Result<()> {
    simple_logger::init_with_level(log::Level::Info)?;
    let args = Args::parse();

    let map = NetworkMap::from_geojson(&std::fs::read_to_string(&args.input)?)?;
    let multi_part = map.segments.iter().filter(|s| s.multi_part).count();
    info!(
        "Read {} segments from {}, {} of them with multiple parts",
        map.segments.len(),
        args.input,
        multi_part
    );

    let output = BufWriter::new(File::create(&args.output)?);
    bincode::serialize_into(output, &map)?;
    info!("Wrote {}", args.output);
    Ok(())
}
