use anyhow::Context;
use clap::Parser;
use pitchstats::camera_motion::CameraMovementCache;
use pitchstats::report::write_frame_rows;
use pitchstats::video::read_video;
use pitchstats::{
    CachedCameraMovement, CameraMotionEstimator, CameraMovementSource, Config, JsonTrackCache, MatchReport,
    Pipeline, TrackSource,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "pitchstats",
    about = "Camera-compensated speed, distance and possession statistics from tracked match video",
    version = "0.1.0"
)]
struct Args {
    /// Input match video
    #[arg(short, long)]
    video: PathBuf,

    /// Track table produced by the detector/tracker (JSON)
    #[arg(short, long)]
    tracks: PathBuf,

    /// Camera movement cache, read if present and valid, written otherwise
    #[arg(long, default_value = "stubs/camera_movement.json")]
    camera_cache: PathBuf,

    /// Path to configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Match report output
    #[arg(short, long, default_value = "report.json")]
    output: PathBuf,

    /// Also export every per-frame record to this file
    #[arg(long)]
    frame_rows: Option<PathBuf>,

    /// Ignore the camera cache and estimate camera movement again
    #[arg(long)]
    recompute_camera: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            info!("loading configuration from {:?}", path);
            Config::from_file(path).with_context(|| format!("failed to load config {:?}", path))?
        }
        None => Config::default(),
    };

    let table = JsonTrackCache::new(&args.tracks)
        .load()
        .with_context(|| format!("failed to load tracks from {:?}", args.tracks))?;
    let frames = read_video(&args.video).with_context(|| format!("failed to read video {:?}", args.video))?;

    let pipeline = Pipeline::new(config).context("invalid configuration")?;
    let estimator = CameraMotionEstimator::new(&pipeline.config().camera);

    let output = if args.recompute_camera {
        let movement = estimator.camera_movement(&frames)?;
        CameraMovementCache::new(&args.camera_cache).save(&movement)?;
        pipeline.run(&frames, table, &FixedMovement(movement))?
    } else {
        let source = CachedCameraMovement::new(&args.camera_cache, estimator);
        pipeline.run(&frames, table, &source)?
    };

    let report = MatchReport::build(&output.table, &output.possession);
    report
        .write_json(&args.output)
        .with_context(|| format!("failed to write report {:?}", args.output))?;

    if let Some(path) = &args.frame_rows {
        write_frame_rows(path, &output.table).with_context(|| format!("failed to write frame rows {:?}", path))?;
    }

    for (team, share) in &report.possession_share {
        info!("team {:?} possession: {:.1}%", team, share);
    }
    info!("{} ball transfers", report.transfers.len());
    Ok(())
}

/// Camera movement already computed for this run.
struct FixedMovement(Vec<pitchstats::Displacement>);

impl CameraMovementSource for FixedMovement {
    fn camera_movement(&self, _frames: &[opencv::core::Mat]) -> pitchstats::Result<Vec<pitchstats::Displacement>> {
        Ok(self.0.clone())
    }
}
