//! Camera parameter mapping.
//!
//! Two pure steps turn a detected landmark into camera parameters:
//!
//! 1. [`world_target`] converts the raw normalized landmark into a small
//!    world-space displacement. Screen `y` grows downwards while world `y`
//!    grows upwards, so the vertical axis is flipped. This is the value the
//!    filter smooths.
//! 2. [`map_to_camera`] turns the smoothed point into an off-axis camera:
//!    the view offset shifts the rendered sub-window of a larger frustum so
//!    that on-screen objects keep their apparent position while the camera
//!    translates, and the focal length follows the head distance.

use crate::constants::{
    DEFAULT_BASE_DISTANCE, DEFAULT_EFFECT_AMOUNT, DEFAULT_FOCAL_SCALE, DEFAULT_OFFSET_SCALE, WORLD_DEPTH_SCALE,
    WORLD_SPAN_X, WORLD_SPAN_Y,
};
use crate::filters::{Smoothing, SmoothingState};
use crate::landmark::NormalizedPoint;
use crate::{Error, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Tunable mapping coefficients
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Lateral effect amplitude
    pub effect_amount_x: f64,
    /// Vertical effect amplitude
    pub effect_amount_y: f64,
    /// Depth effect amplitude
    pub effect_amount_z: f64,
    /// Horizontal lens-shift scale
    pub off_x: f64,
    /// Vertical lens-shift scale
    pub off_y: f64,
    /// Focal length per unit of smoothed distance
    pub off_z: f64,
    /// Camera distance when the detector reports zero depth
    pub base_distance: f64,
    /// Smoothing divisors applied by the filter
    pub smoothing: Smoothing,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            effect_amount_x: DEFAULT_EFFECT_AMOUNT,
            effect_amount_y: DEFAULT_EFFECT_AMOUNT,
            effect_amount_z: DEFAULT_EFFECT_AMOUNT,
            off_x: DEFAULT_OFFSET_SCALE,
            off_y: DEFAULT_OFFSET_SCALE,
            off_z: DEFAULT_FOCAL_SCALE,
            base_distance: DEFAULT_BASE_DISTANCE,
            smoothing: Smoothing::default(),
        }
    }
}

impl MapperConfig {
    /// Validate coefficients
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for non-finite coefficients, a non-positive
    /// focal scale or invalid smoothing divisors
    pub fn validate(&self) -> Result<()> {
        let coefficients = [
            ("effect_amount_x", self.effect_amount_x),
            ("effect_amount_y", self.effect_amount_y),
            ("effect_amount_z", self.effect_amount_z),
            ("off_x", self.off_x),
            ("off_y", self.off_y),
            ("off_z", self.off_z),
            ("base_distance", self.base_distance),
        ];
        if let Some((name, value)) = coefficients.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::ConfigError(format!("Mapper coefficient {name} must be finite, got {value}")));
        }
        if self.off_z <= 0.0 {
            return Err(Error::ConfigError("Mapper off_z must be positive".to_string()));
        }
        self.smoothing
            .validate()
            .map_err(|e| Error::ConfigError(format!("Invalid smoothing: {e}")))
    }
}

/// Asymmetric frustum shift in viewport pixels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewOffset {
    pub cx: f64,
    pub cy: f64,
}

/// Camera parameters for one render tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTransform {
    pub position: Vector3<f64>,
    pub view_offset: ViewOffset,
    pub focal_length: f64,
}

/// Convert a raw normalized landmark into the world-space target the filter
/// smooths towards.
#[must_use]
pub fn world_target(raw: &NormalizedPoint, cfg: &MapperConfig) -> Vector3<f64> {
    let x = -cfg.effect_amount_x * (f64::from(raw.x) - 0.5) * WORLD_SPAN_X;
    let y = cfg.effect_amount_y * (0.5 - f64::from(raw.y)) * WORLD_SPAN_Y;
    let z = cfg.effect_amount_z * f64::from(raw.z) * WORLD_DEPTH_SCALE + cfg.base_distance;
    Vector3::new(x, y, z)
}

/// Map a smoothed point to camera parameters for a viewport of the given
/// size. Pure: identical inputs always give identical outputs.
#[must_use]
pub fn map_to_camera(smoothed: &SmoothingState, cfg: &MapperConfig, width: u32, height: u32) -> CameraTransform {
    let width = f64::from(width);
    let height = f64::from(height);
    CameraTransform {
        position: smoothed.to_vector(),
        view_offset: ViewOffset {
            cx: cfg.effect_amount_x * cfg.off_x * width * smoothed.xs,
            cy: cfg.effect_amount_y * cfg.off_y * height * smoothed.ys,
        },
        focal_length: cfg.off_z * smoothed.zs,
    }
}
