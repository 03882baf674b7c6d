//! Configuration management for the head parallax application

use crate::constants::{
    DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH, DEFAULT_DETECTION_FPS, DEFAULT_FACE_CONFIDENCE,
    DEFAULT_FAR_PLANE, DEFAULT_FOV_DEGREES, DEFAULT_NEAR_PLANE, DEFAULT_NMS_THRESHOLD, DEFAULT_PRESENCE_THRESHOLD,
    DEFAULT_REFRESH_HZ, MS_PER_SECOND, NUM_FACE_MESH_LANDMARKS,
};
use crate::detection::DetectionSettings;
use crate::face_mesh::Delegate;
use crate::filters::{create_filter, PointFilter, SmoothingState};
use crate::landmark::TrackedLandmarkIndex;
use crate::mapper::MapperConfig;
use crate::{Error, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::watch;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Video input
    pub camera: CameraConfig,

    /// Landmark model
    pub detector: DetectorConfig,

    /// Detection cadence and filtering
    pub tracking: TrackingConfig,

    /// Camera parameter mapping, hot-reloadable
    pub mapper: MapperConfig,

    /// Window and projection
    pub display: DisplayConfig,
}

/// Video input configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Capture device index
    pub device_index: i32,

    /// Play a video file instead of opening a device
    pub video_file: Option<PathBuf>,

    /// Requested capture width
    pub width: u32,

    /// Requested capture height
    pub height: u32,
}

/// Landmark model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Path to the face mesh ONNX model
    pub model_path: PathBuf,

    /// Path to the SCRFD face detector ONNX model
    pub face_model_path: PathBuf,

    /// Minimum face box score (0.0-1.0)
    pub face_confidence: f32,

    /// Overlap above which face boxes are merged (0.0-1.0)
    pub nms_threshold: f32,

    /// Inference hardware
    pub delegate: Delegate,

    /// Minimum face presence probability (0.0-1.0)
    pub presence_threshold: f32,
}

/// Detection loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Landmark that drives the camera
    pub landmark_index: TrackedLandmarkIndex,

    /// Maximum detection cycles per second
    pub target_fps: f64,

    /// Frame downscale factor before inference, in (0, 1]
    pub scale: f64,

    /// Filter spec, see [`crate::filters::create_filter`]
    pub filter: String,
}

/// Window and projection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Window width
    pub window_width: u32,

    /// Window height
    pub window_height: u32,

    /// Render loop rate
    pub refresh_hz: f64,

    /// Vertical field of view before focal length is applied, in degrees
    pub fov: f64,

    /// Near clip plane
    pub near: f64,

    /// Far clip plane
    pub far: f64,

    /// Draw the landmark inset
    pub show_landmarks: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            video_file: None,
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("assets/face_mesh.onnx"),
            face_model_path: PathBuf::from("assets/face_detector.onnx"),
            face_confidence: DEFAULT_FACE_CONFIDENCE,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            delegate: Delegate::Gpu,
            presence_threshold: DEFAULT_PRESENCE_THRESHOLD,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            landmark_index: TrackedLandmarkIndex::default(),
            target_fps: DEFAULT_DETECTION_FPS,
            scale: 1.0,
            filter: "exponential".to_string(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            window_width: 960,
            window_height: 540,
            refresh_hz: DEFAULT_REFRESH_HZ,
            fov: DEFAULT_FOV_DEGREES,
            near: DEFAULT_NEAR_PLANE,
            far: DEFAULT_FAR_PLANE,
            show_landmarks: true,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        serde_yaml::from_str(&content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Starting point of the filter and the camera before any detection
    pub fn initial_state(&self) -> SmoothingState {
        SmoothingState::new(0.0, 0.0, self.mapper.base_distance)
    }

    /// Create the configured filter, starting at [`Config::initial_state`]
    pub fn create_filter(&self) -> Result<Box<dyn PointFilter>> {
        create_filter(&self.tracking.filter, &self.mapper.smoothing, self.initial_state())
    }

    /// Detection loop settings derived from the tracking section
    pub fn detection_settings(&self) -> DetectionSettings {
        DetectionSettings {
            scale: self.tracking.scale,
            landmark: self.tracking.landmark_index,
            min_interval_ms: MS_PER_SECOND / self.tracking.target_fps,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        // Tracking
        if !(self.tracking.scale > 0.0 && self.tracking.scale <= 1.0) {
            return Err(Error::ConfigError(format!(
                "Scale must be in (0, 1], got {}",
                self.tracking.scale
            )));
        }
        if !self.tracking.target_fps.is_finite() || self.tracking.target_fps <= 0.0 {
            return Err(Error::ConfigError("Target FPS must be greater than 0".to_string()));
        }
        if self.tracking.landmark_index.0 >= NUM_FACE_MESH_LANDMARKS {
            return Err(Error::ConfigError(format!(
                "Landmark index must be below {NUM_FACE_MESH_LANDMARKS}, got {}",
                self.tracking.landmark_index.0
            )));
        }
        self.create_filter()
            .map_err(|e| Error::ConfigError(format!("Invalid filter: {e}")))?;

        // Detector
        if !(0.0..=1.0).contains(&self.detector.presence_threshold) {
            return Err(Error::ConfigError(
                "Presence threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.detector.face_confidence) {
            return Err(Error::ConfigError("Face confidence must be between 0.0 and 1.0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.detector.nms_threshold) {
            return Err(Error::ConfigError("NMS threshold must be between 0.0 and 1.0".to_string()));
        }

        // Camera
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(Error::ConfigError("Capture size must be non-zero".to_string()));
        }

        // Display
        if self.display.window_width == 0 || self.display.window_height == 0 {
            return Err(Error::ConfigError("Window size must be non-zero".to_string()));
        }
        if !self.display.refresh_hz.is_finite() || self.display.refresh_hz <= 0.0 {
            return Err(Error::ConfigError("Refresh rate must be greater than 0".to_string()));
        }
        if !(self.display.fov > 0.0 && self.display.fov < 180.0) {
            return Err(Error::ConfigError("Field of view must be between 0 and 180 degrees".to_string()));
        }
        if !(self.display.near > 0.0 && self.display.far > self.display.near) {
            return Err(Error::ConfigError(
                "Clip planes must satisfy 0 < near < far".to_string(),
            ));
        }

        self.mapper.validate()
    }
}

/// Mapper coefficients shared with the running loops.
///
/// Loops hold a `watch::Receiver` and read the current value on every use,
/// so an update takes effect on the next cycle without restarting anything.
pub struct LiveConfig {
    path: Option<PathBuf>,
    tx: watch::Sender<MapperConfig>,
}

impl LiveConfig {
    pub fn new(initial: MapperConfig, path: Option<PathBuf>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { path, tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<MapperConfig> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> MapperConfig {
        *self.tx.borrow()
    }

    /// Replace the live coefficients
    pub fn update(&self, mapper: MapperConfig) -> Result<()> {
        mapper.validate()?;
        self.tx.send_replace(mapper);
        Ok(())
    }

    /// Re-read the mapper section from the configuration file
    pub fn reload(&self) -> Result<MapperConfig> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| Error::ConfigError("No configuration file to reload".to_string()))?;
        let mapper = Config::from_file(path)?.mapper;
        self.update(mapper)?;
        info!("Reloaded mapper settings from {}", path.display());
        Ok(mapper)
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Head Parallax Configuration

# Video input
camera:
  device_index: 0
  # video_file: "demo.mp4"
  width: 320
  height: 240

# Face detector and face mesh models
detector:
  model_path: "assets/face_mesh.onnx"
  face_model_path: "assets/face_detector.onnx"
  face_confidence: 0.5
  nms_threshold: 0.4
  delegate: gpu
  presence_threshold: 0.5

# Detection loop
tracking:
  landmark_index: 168
  target_fps: 30.0
  scale: 1.0
  filter: "exponential"

# Camera mapping (press 'r' in the window to reload this section)
mapper:
  effect_amount_x: 1.0
  effect_amount_y: 1.0
  effect_amount_z: 1.0
  off_x: 0.05
  off_y: 0.05
  off_z: 10.0
  base_distance: 3.0
  smoothing:
    x: 4.0
    y: 4.0
    z: 8.0

# Window and projection
display:
  window_width: 960
  window_height: 540
  refresh_hz: 60.0
  fov: 75.0
  near: 0.1
  far: 1000.0
  show_landmarks: true
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_config_matches_defaults() {
        let parsed: Config = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();
        assert_eq!(parsed, Config::default());
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = serde_yaml::from_str("tracking:\n  scale: 0.5\n").unwrap();
        assert!((parsed.tracking.scale - 0.5).abs() < f64::EPSILON);
        assert_eq!(parsed.mapper, MapperConfig::default());
    }

    #[test]
    fn test_detection_settings() {
        let settings = Config::default().detection_settings();
        assert!((settings.min_interval_ms - 1000.0 / 30.0).abs() < 1e-9);
        assert_eq!(settings.landmark, TrackedLandmarkIndex(168));
    }

    #[test]
    fn test_initial_state_uses_base_distance() {
        let mut config = Config::default();
        config.mapper.base_distance = 5.0;
        assert_eq!(config.initial_state(), SmoothingState::new(0.0, 0.0, 5.0));
        assert_eq!(config.create_filter().unwrap().state(), config.initial_state());
    }

    #[test]
    fn test_live_config_rejects_invalid_update() {
        let live = LiveConfig::new(MapperConfig::default(), None);
        let rx = live.subscribe();
        let bad = MapperConfig {
            off_z: -1.0,
            ..MapperConfig::default()
        };
        assert!(live.update(bad).is_err());
        assert_eq!(*rx.borrow(), MapperConfig::default());
        assert!(live.reload().is_err());
    }
}
