//! Head-coupled parallax camera driven by webcam face landmarks.
//!
//! The library turns a live video feed into an off-axis ("fish-tank VR")
//! camera using:
//! - ONNX Runtime for face detection and face-mesh landmark inference
//! - `OpenCV` for capture, resizing and a wireframe display window
//! - `tokio` for the cooperative detection and render loops
//!
//! The pipeline consists of:
//! 1. A detection loop that samples frames at a throttled cadence and runs
//!    landmark inference, at most one frame at a time
//! 2. Selection of a single tracked landmark and conversion to world space
//! 3. Exponential smoothing of that point, once per detection cycle
//! 4. A render loop that maps the latest smoothed point to camera position,
//!    view offset and focal length at display rate
//!
//! # Examples
//!
//! ## Mapping a landmark
//!
//! ```
//! use head_parallax::filters::{create_filter, Smoothing, SmoothingState};
//! use head_parallax::landmark::NormalizedPoint;
//! use head_parallax::mapper::{map_to_camera, world_target, MapperConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = MapperConfig::default();
//! let mut filter = create_filter("exponential", &cfg.smoothing, SmoothingState::new(0.0, 0.0, 3.0))?;
//!
//! // Face slightly left of center, at the reference depth
//! let raw = NormalizedPoint::new(0.45, 0.5, 0.0);
//! let smoothed = filter.update(Some(world_target(&raw, &cfg)));
//!
//! let transform = map_to_camera(&smoothed, &cfg, 1280, 720);
//! println!("Camera at {:?}, focal length {:.1}", transform.position, transform.focal_length);
//! # Ok(())
//! # }
//! ```
//!
//! ## Running a session
//!
//! ```no_run
//! use head_parallax::config::Config;
//! use head_parallax::face_mesh::OnnxFaceMesh;
//! use head_parallax::lifecycle::Lifecycle;
//! use head_parallax::render::{Viewport, WireframeRenderer};
//! use head_parallax::scheduler::IntervalScheduler;
//! use head_parallax::video::CameraSource;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let renderer = WireframeRenderer::open("Head Parallax", Viewport::new(960, 540), true)?;
//! let mut session = Lifecycle::new(&config, None, renderer)?;
//!
//! let mut detection_ticks = IntervalScheduler::from_hz(60.0)?;
//! let mut render_ticks = IntervalScheduler::from_hz(60.0)?;
//! let report = session
//!     .run(
//!         CameraSource::open(config.camera.clone()),
//!         OnnxFaceMesh::load(config.detector.clone()),
//!         &mut detection_ticks,
//!         &mut render_ticks,
//!     )
//!     .await?;
//! println!("{} frames tracked", report.stats.tracked);
//! # Ok(())
//! # }
//! ```

/// Face landmark data types
pub mod landmark;

/// Signal filtering algorithms for smoothing the tracked point
pub mod filters;

/// Pure mapping from a smoothed point to camera parameters
pub mod mapper;

/// Throttled detection loop and its collaborators
pub mod detection;

/// Display-rate render loop, camera model and window renderer
pub mod render;

/// Session wiring and teardown
pub mod lifecycle;

/// Session liveness flag shared by both loops
pub mod liveness;

/// Tick sources for the loops
pub mod scheduler;

/// SCRFD face box detector
pub mod face_detection;

/// Face mesh landmark detector using ONNX Runtime
pub mod face_mesh;

/// Camera and video file capture
pub mod video;

/// Utility functions for numeric casts and image conversion
pub mod utils;

/// Error types and result handling
pub mod error;

/// Constants used throughout the application
pub mod constants;

/// Configuration management
pub mod config;

pub use error::{Error, Result};
