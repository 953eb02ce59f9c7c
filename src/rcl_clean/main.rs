// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

mod io;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use rcl_cleaner::{CancelFlag, CleaningConfig, CleaningJob, JobStatus, MergeType, ProgressEvent};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// GeoJSON FeatureCollection of road centre lines.
    #[arg(long)]
    input: PathBuf,

    /// Directory receiving edges.geojson, errors.geojson and unlinks.geojson.
    #[arg(long, env = "RCL_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// JSON cleaning configuration. Flags below override its fields.
    #[arg(long, env = "RCL_CLEAN_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long)]
    snap_threshold: Option<f64>,

    #[arg(long)]
    break_at_vertices: Option<bool>,

    /// intersections, collinear or none
    #[arg(long, value_parser = parse_merge_type)]
    merge_type: Option<MergeType>,

    #[arg(long)]
    collinear_threshold: Option<f64>,

    #[arg(long)]
    angle_threshold: Option<f64>,

    #[arg(long)]
    fix_unlinks: Option<bool>,

    #[arg(long)]
    orphans: Option<bool>,

    #[arg(long)]
    get_unlinks: Option<bool>,

    #[arg(long)]
    unlink_nudge: Option<f64>,
}

fn parse_merge_type(s: &str) -> Result<MergeType, String> {
    match s {
        "intersections" => Ok(MergeType::Intersections),
        "collinear" => Ok(MergeType::Collinear),
        "none" => Ok(MergeType::None),
        other => Err(format!("unknown merge type {:?}", other)),
    }
}

impl Args {
    fn cleaning_config(&self) -> Result<CleaningConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            None => CleaningConfig::default(),
        };
        if let Some(v) = self.snap_threshold {
            cfg.snap_threshold = v;
        }
        if let Some(v) = self.break_at_vertices {
            cfg.break_at_vertices = v;
        }
        if let Some(v) = self.merge_type {
            cfg.merge_type = v;
        }
        if let Some(v) = self.collinear_threshold {
            cfg.collinear_threshold = v;
        }
        if let Some(v) = self.angle_threshold {
            cfg.angle_threshold = v;
        }
        if let Some(v) = self.fix_unlinks {
            cfg.fix_unlinks = v;
        }
        if let Some(v) = self.orphans {
            cfg.orphans = v;
        }
        if let Some(v) = self.get_unlinks {
            cfg.get_unlinks = v;
        }
        if let Some(v) = self.unlink_nudge {
            cfg.unlink_nudge = v;
        }
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = args.cleaning_config()?;
    info!("cleaning with {:?}", config);
    let job = CleaningJob::new(config)?;

    let features = io::read_features(&args.input)?;
    info!("read {} features from {}", features.len(), args.input.display());

    let handle = job.spawn(features, CancelFlag::new())?;
    for event in handle.events.iter() {
        match event {
            ProgressEvent::Percent(p) => info!("{}%", p),
            ProgressEvent::Finished(status) => {
                if status != JobStatus::Done {
                    warn!("cleaning finished with {:?}", status);
                }
                break;
            }
        }
    }
    let output = handle.join()?;

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    io::write_geojson(
        &args.output_dir.join("edges.geojson"),
        &io::edges_to_geojson(&output.features),
    )?;
    io::write_geojson(
        &args.output_dir.join("errors.geojson"),
        &io::markers_to_geojson(&output.errors),
    )?;
    io::write_geojson(
        &args.output_dir.join("unlinks.geojson"),
        &io::markers_to_geojson(&output.unlinks),
    )?;

    let report = serde_json::to_string_pretty(&output.report)?;
    println!("{}", report);
    Ok(())
}
