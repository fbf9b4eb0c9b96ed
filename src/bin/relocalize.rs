//! relocalize - run one relocalization against a still image
//!
//! Loads the pipeline configuration, feeds the image in as the camera frame,
//! asks the pose service for the camera pose and prints the placed anchor as
//! JSON on stdout.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pose_anchor::{
    config::CONFIG_ENV, Anchor, CameraIntrinsics, GeoLocation, PipelineConfig, Pose, PoseEstimate,
    RelocalizationPipeline, ScreenOrientation, StaticMetadata, StillImageSource, UreqTransport,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Relocalize a still image against the pose service")]
struct Args {
    /// Image used as the camera frame.
    image: PathBuf,

    /// Pipeline config file (JSON, or TOML by extension).
    #[arg(long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Focal length x in pixels. Without focal lengths the request is refused.
    #[arg(long)]
    fx: Option<f64>,

    /// Focal length y in pixels. Defaults to fx.
    #[arg(long)]
    fy: Option<f64>,

    /// Principal point x. Defaults to the image centre.
    #[arg(long)]
    cx: Option<f64>,

    /// Principal point y. Defaults to the image centre.
    #[arg(long)]
    cy: Option<f64>,

    #[arg(long, requires = "longitude", allow_hyphen_values = true)]
    latitude: Option<f64>,

    #[arg(long, requires = "latitude", allow_hyphen_values = true)]
    longitude: Option<f64>,

    /// portrait, portrait-upside-down, landscape-left or landscape-right.
    #[arg(long, default_value = "portrait")]
    orientation: String,

    /// Current camera position in the session, `x,y,z`.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    camera_position: Option<Vec<f64>>,

    /// Current camera rotation in the session, `x,y,z,w`.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    camera_rotation: Option<Vec<f64>>,

    /// Content scale, overriding the configured scale factor.
    #[arg(long)]
    scale: Option<f64>,
}

#[derive(Serialize)]
struct Output<'a> {
    estimate: &'a PoseEstimate,
    anchor: &'a Anchor,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_from(path)?,
        None => PipelineConfig::load()?,
    };
    if let Some(scale) = args.scale {
        config = config
            .with_scale_factor(scale)
            .context("invalid --scale")?;
    }

    let source = StillImageSource::open(&args.image)?;
    let (width, height) = image_dimensions(&args.image)?;
    let orientation = ScreenOrientation::parse(&args.orientation)
        .ok_or_else(|| anyhow!("unknown orientation '{}'", args.orientation))?;

    let intrinsics = args.fx.map(|fx| CameraIntrinsics {
        focal_length: (fx, args.fy.unwrap_or(fx)),
        principal_point: (
            args.cx.unwrap_or(width as f64 / 2.0),
            args.cy.unwrap_or(height as f64 / 2.0),
        ),
        resolution: (width, height),
        skew: 0.0,
    });
    if intrinsics.is_none() {
        log::warn!("no --fx given; the pose service cannot be queried without intrinsics");
    }
    let metadata = StaticMetadata {
        intrinsics,
        location: args
            .latitude
            .zip(args.longitude)
            .map(|(lat, lon)| GeoLocation::new(lat, lon)),
        heading: None,
        orientation,
    };
    let camera = camera_pose(&args)?;

    let transport = Arc::new(UreqTransport::new(config.service.timeout));
    let pipeline = RelocalizationPipeline::from_config(
        &config,
        transport,
        Box::new(source),
        Arc::new(metadata),
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    let (_, estimate) = runtime.block_on(pipeline.relocalize(|| camera))?;

    let anchors = pipeline.anchors();
    let anchor = anchors
        .active()
        .ok_or_else(|| anyhow!("placement finished without an anchor"))?;
    let output = Output {
        estimate: &estimate,
        anchor,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn image_dimensions(path: &Path) -> Result<(u32, u32)> {
    image::image_dimensions(path)
        .with_context(|| format!("failed to read dimensions of {}", path.display()))
}

fn camera_pose(args: &Args) -> Result<Pose> {
    let position = match args.camera_position.as_deref() {
        Some([x, y, z]) => [*x, *y, *z],
        Some(other) => return Err(anyhow!("camera position needs 3 values, got {}", other.len())),
        None => [0.0; 3],
    };
    let rotation = match args.camera_rotation.as_deref() {
        Some([x, y, z, w]) => [*x, *y, *z, *w],
        Some(other) => return Err(anyhow!("camera rotation needs 4 values, got {}", other.len())),
        None => [0.0, 0.0, 0.0, 1.0],
    };
    Pose::from_parts(position, rotation).map_err(|e| anyhow!("invalid camera pose: {}", e))
}
