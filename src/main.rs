//! Head-coupled parallax viewer driven by webcam face landmarks.

use anyhow::{Context, Result};
use clap::Parser;
use head_parallax::config::{Config, EXAMPLE_CONFIG};
use head_parallax::face_mesh::{Delegate, OnnxFaceMesh};
use head_parallax::landmark::TrackedLandmarkIndex;
use head_parallax::lifecycle::Lifecycle;
use head_parallax::render::{wireframe::WINDOW_TITLE, Viewport, WireframeRenderer};
use head_parallax::scheduler::IntervalScheduler;
use head_parallax::video::CameraSource;
use log::{info, warn};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Camera index to use
    #[arg(long)]
    cam: Option<i32>,

    /// Video file to play instead of a camera
    #[arg(short, long)]
    video: Option<PathBuf>,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Frame downscale factor before inference, in (0, 1]
    #[arg(short, long)]
    scale: Option<f64>,

    /// Maximum detection rate in cycles per second
    #[arg(long)]
    fps: Option<f64>,

    /// Face mesh ONNX model
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// SCRFD face detector ONNX model
    #[arg(long)]
    face_model: Option<PathBuf>,

    /// Run inference on the CPU
    #[arg(long)]
    cpu: bool,

    /// Landmark index that drives the camera
    #[arg(short, long)]
    landmark: Option<usize>,

    /// Filter spec (exponential, exponential:<k>, none)
    #[arg(short, long)]
    filter: Option<String>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Print an example configuration file and exit
    #[arg(long)]
    print_config: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(cam) = self.cam {
            config.camera.device_index = cam;
        }
        if let Some(video) = &self.video {
            config.camera.video_file = Some(video.clone());
        }
        if let Some(scale) = self.scale {
            config.tracking.scale = scale;
        }
        if let Some(fps) = self.fps {
            config.tracking.target_fps = fps;
        }
        if let Some(model) = &self.model {
            config.detector.model_path = model.clone();
        }
        if let Some(face_model) = &self.face_model {
            config.detector.face_model_path = face_model.clone();
        }
        if self.cpu {
            config.detector.delegate = Delegate::Cpu;
        }
        if let Some(landmark) = self.landmark {
            config.tracking.landmark_index = TrackedLandmarkIndex(landmark);
        }
        if let Some(filter) = &self.filter {
            config.tracking.filter = filter.clone();
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    if args.print_config {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }

    // Initialize logger
    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("Head Parallax v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(run(config, args.config))
}

async fn run(config: Config, config_path: Option<PathBuf>) -> Result<()> {
    let renderer = WireframeRenderer::open(
        WINDOW_TITLE,
        Viewport::new(config.display.window_width, config.display.window_height),
        config.display.show_landmarks,
    )?;
    let mut session = Lifecycle::new(&config, config_path, renderer)?;

    let shutdown = session.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            shutdown.cancel();
        }
    });

    // Detection is woken at display rate and throttled by its cadence gate
    let mut detection_ticks = IntervalScheduler::from_hz(config.display.refresh_hz)?;
    let mut render_ticks = IntervalScheduler::from_hz(config.display.refresh_hz)?;

    let report = session
        .run(
            CameraSource::open(config.camera.clone()),
            OnnxFaceMesh::load(config.detector.clone()),
            &mut detection_ticks,
            &mut render_ticks,
        )
        .await?;

    if let Some(e) = &report.init_error {
        warn!("Session ran without head tracking: {e}");
    }
    let stats = report.stats;
    info!(
        "Detection: {} cycles, {} tracked, {} missed, {} throttled, {} failed",
        stats.cycles, stats.tracked, stats.missed, stats.throttled, stats.failed
    );
    Ok(())
}
