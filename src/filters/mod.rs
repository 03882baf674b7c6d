//! Signal filtering for the tracked landmark stream.
//!
//! Filters run once per successful detection cycle, so their period is the
//! detection cadence rather than the display refresh rate. Samples are
//! world-space targets produced by [`crate::mapper::world_target`].

/// Exponential filter with per-axis divisors
pub mod exponential;

use crate::{Error, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

pub use exponential::ExponentialFilter;

/// Running estimate of a point filter, in world units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SmoothingState {
    pub xs: f64,
    pub ys: f64,
    pub zs: f64,
}

impl SmoothingState {
    pub fn new(xs: f64, ys: f64, zs: f64) -> Self {
        Self { xs, ys, zs }
    }

    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.xs, self.ys, self.zs)
    }
}

impl From<Vector3<f64>> for SmoothingState {
    fn from(v: Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<[f64; 3]> for SmoothingState {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Per-axis smoothing divisors. `1.0` snaps instantly, larger values lag more.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Smoothing {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Smoothing {
    fn default() -> Self {
        use crate::constants::{DEFAULT_SMOOTHING_XY, DEFAULT_SMOOTHING_Z};
        Self {
            x: DEFAULT_SMOOTHING_XY,
            y: DEFAULT_SMOOTHING_XY,
            z: DEFAULT_SMOOTHING_Z,
        }
    }
}

impl Smoothing {
    /// Same divisor on every axis
    pub fn uniform(k: f64) -> Self {
        Self { x: k, y: k, z: k }
    }

    /// Check that every divisor is finite and at least 1
    pub fn validate(&self) -> Result<()> {
        for (axis, k) in [("x", self.x), ("y", self.y), ("z", self.z)] {
            if !k.is_finite() || k < 1.0 {
                return Err(Error::FilterError(format!(
                    "Divisor for axis {axis} must be >= 1, got {k}"
                )));
            }
        }
        Ok(())
    }
}

/// Trait for all landmark point filters
pub trait PointFilter: Send {
    /// Feed one sample, or `None` when no face was found.
    ///
    /// `None` leaves the state untouched and returns it.
    fn update(&mut self, sample: Option<Vector3<f64>>) -> SmoothingState;

    /// Apply new smoothing coefficients without resetting state
    fn retune(&mut self, _smoothing: &Smoothing) {}

    /// Current estimate
    fn state(&self) -> SmoothingState;

    /// Return to the initial value
    fn reset(&mut self);

    /// Get filter name
    fn name(&self) -> &str;
}

/// Passthrough filter that still remembers the last sample
pub struct NoFilter {
    initial: SmoothingState,
    state: SmoothingState,
}

impl NoFilter {
    pub fn new(initial: SmoothingState) -> Self {
        Self {
            initial,
            state: initial,
        }
    }
}

impl PointFilter for NoFilter {
    fn update(&mut self, sample: Option<Vector3<f64>>) -> SmoothingState {
        if let Some(sample) = sample {
            self.state = sample.into();
        }
        self.state
    }

    fn state(&self) -> SmoothingState {
        self.state
    }

    fn reset(&mut self) {
        self.state = self.initial;
    }

    fn name(&self) -> &str {
        "NoFilter"
    }
}

/// Create a point filter from a spec string.
///
/// Accepted forms: `none`, `exponential` (divisors from `smoothing`) and
/// `exponential:<k>` (uniform divisor).
pub fn create_filter(
    spec: &str,
    smoothing: &Smoothing,
    initial: SmoothingState,
) -> Result<Box<dyn PointFilter>> {
    let lowered = spec.trim().to_lowercase();
    let mut parts = lowered.split(':');
    let name = parts.next().unwrap_or_default();
    let param = parts.next();
    if parts.next().is_some() {
        return Err(Error::FilterError(format!("Too many parameters in filter spec: {spec}")));
    }

    match (name, param) {
        ("none" | "nofilter", None) => Ok(Box::new(NoFilter::new(initial))),
        ("exponential" | "ema", None) => {
            smoothing.validate()?;
            Ok(Box::new(ExponentialFilter::new(*smoothing, initial)))
        }
        ("exponential" | "ema", Some(k)) => {
            let k: f64 = k
                .parse()
                .map_err(|_| Error::FilterError(format!("Invalid divisor in filter spec: {spec}")))?;
            let smoothing = Smoothing::uniform(k);
            smoothing.validate()?;
            Ok(Box::new(ExponentialFilter::new(smoothing, initial)))
        }
        _ => Err(Error::FilterError(format!("Unknown filter type: {spec}"))),
    }
}
