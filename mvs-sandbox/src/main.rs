mod pipeline;

use log::*;
use mvs_reconstruction::{
    reprojection_statistics, track_length_statistics, ImageId, Reconstruction,
};
use mvs_select::{
    compute_covisibility, compute_neighbor_ranges, select_views, ViewSelectionSettings,
};
use pipeline::{MvsBackend, PipelinePlan, SfmBackend};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use structopt::StructOpt;

#[derive(StructOpt, Clone)]
#[structopt(
    name = "mvs-sandbox",
    about = "A tool for testing multi-view stereo view selection"
)]
enum Opt {
    /// Score view pairs of a reconstruction and pick neighbors for every view.
    Select(SelectOpt),
    /// Show which stages of the sfm → mvs → fuse pipeline would run in a workspace.
    Plan(PlanOpt),
}

#[derive(StructOpt, Clone)]
struct SelectOpt {
    /// The reconstruction to select views from.
    ///
    /// Files ending in `.json` are read as JSON, everything else as bincode.
    #[structopt(parse(from_os_str))]
    reconstruction: PathBuf,
    /// The file where settings are specified.
    ///
    /// This is in the format of `mvs_select::ViewSelectionSettings`.
    #[structopt(short, long, default_value = "view-selection-settings.json")]
    settings: PathBuf,
    /// Output JSON file to deposit the neighbor selections
    #[structopt(short, long)]
    output: Option<PathBuf>,
    /// Log reprojection and track length statistics
    #[structopt(long)]
    statistics: bool,
    /// Compute depth and disparity ranges against the neighbors of this image
    #[structopt(long)]
    ranges: Option<u32>,
    /// Bincode file to deposit the range maps
    #[structopt(long, default_value = "ranges.bin")]
    ranges_output: PathBuf,
}

#[derive(StructOpt, Clone)]
struct PlanOpt {
    /// The pipeline workspace directory
    #[structopt(parse(from_os_str))]
    workspace: PathBuf,
    #[structopt(long, default_value = "colmap")]
    sfm: SfmBackend,
    #[structopt(long, default_value = "colmap")]
    mvs: MvsBackend,
    #[structopt(long, default_value = "colmap")]
    fuse: MvsBackend,
    /// Only run the stages that are not done yet
    #[structopt(long)]
    auto_rerun: bool,
}

fn main() {
    pretty_env_logger::init_timed();
    let succeeded = match Opt::from_args() {
        Opt::Select(opt) => select(opt),
        Opt::Plan(opt) => plan(opt),
    };
    if !succeeded {
        std::process::exit(1);
    }
}

fn load<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let file = match std::fs::File::open(path) {
        Ok(file) => std::io::BufReader::new(file),
        Err(e) => {
            error!("unable to open {}: {}", path.display(), e);
            return None;
        }
    };
    let loaded = if path.extension().map_or(false, |ext| ext == "json") {
        serde_json::from_reader(file).map_err(|e| e.to_string())
    } else {
        bincode::deserialize_from(file).map_err(|e| e.to_string())
    };
    loaded
        .map_err(|e| error!("unable to read {}: {}", path.display(), e))
        .ok()
}

fn select(opt: SelectOpt) -> bool {
    info!("loading the reconstruction");
    let reconstruction: Reconstruction = match load(&opt.reconstruction) {
        Some(reconstruction) => reconstruction,
        None => return false,
    };
    info!(
        "loaded {} images and {} points",
        reconstruction.num_images(),
        reconstruction.num_points()
    );

    let settings = std::fs::File::open(&opt.settings)
        .ok()
        .and_then(|file| serde_json::from_reader(file).ok());
    if settings.is_some() {
        info!("loaded existing settings");
    } else {
        info!("used default settings");
    }
    let settings: ViewSelectionSettings = settings.unwrap_or_default();

    if opt.statistics {
        reprojection_statistics(&reconstruction);
        track_length_statistics(&reconstruction);
    }

    let table = compute_covisibility(&reconstruction, &settings);
    let selections = select_views(&table, settings.neighbors);
    for selection in &selections {
        debug!(
            "view {} neighbors {:?}",
            selection.reference,
            selection
                .neighbors
                .iter()
                .map(|&(view, _)| view.0)
                .collect::<Vec<_>>()
        );
    }

    if let Some(path) = &opt.output {
        info!("saving the neighbor selections");
        let saved = std::fs::File::create(path)
            .map_err(|e| e.to_string())
            .and_then(|file| {
                serde_json::to_writer_pretty(file, &selections).map_err(|e| e.to_string())
            });
        if let Err(e) = saved {
            error!("unable to save neighbor selections: {}", e);
            return false;
        }
    }

    if let Some(view) = opt.ranges {
        info!("computing ranges for image {}", view);
        let maps =
            match compute_neighbor_ranges(&reconstruction, &table, ImageId(view), &settings) {
                Ok(maps) => maps,
                Err(e) => {
                    error!("unable to compute ranges: {}", e);
                    return false;
                }
            };
        for map in &maps {
            info!(
                "neighbor {}: {} pixels, {} invisible, {} degenerate",
                map.neighbor,
                map.grid.len(),
                map.invisible(),
                map.degenerate()
            );
        }
        let saved = std::fs::File::create(&opt.ranges_output)
            .map_err(|e| e.to_string())
            .and_then(|file| bincode::serialize_into(file, &maps).map_err(|e| e.to_string()));
        if let Err(e) = saved {
            error!("unable to save range maps: {}", e);
            return false;
        }
    }
    true
}

fn plan(opt: PlanOpt) -> bool {
    let plan = match PipelinePlan::new(
        opt.workspace.clone(),
        opt.sfm,
        opt.mvs,
        opt.fuse,
        opt.auto_rerun,
    ) {
        Ok(plan) => plan,
        Err(e) => {
            error!("invalid pipeline: {}", e);
            return false;
        }
    };
    info!("converting with {} and {}", plan.mvs, plan.fuse);
    let stages = plan.schedule_on_disk();
    if stages.is_empty() {
        info!("all stages are done");
    }
    for stage in stages {
        info!("{:?} runs in {}", stage, plan.stage_dir(stage).display());
    }
    true
}
