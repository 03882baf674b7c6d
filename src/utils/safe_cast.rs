//! Checked numeric conversions between frame sizes, `OpenCV` coordinates and
//! tensor dimensions.

use crate::{Error, Result};

/// Convert a tensor dimension to an `OpenCV` size
///
/// # Errors
///
/// Returns an error if the value exceeds `i32::MAX`
pub fn usize_to_i32(value: usize) -> Result<i32> {
    value
        .try_into()
        .map_err(|_| Error::InvalidInput(format!("Value {value} too large to fit in i32")))
}

/// Convert a frame dimension to an `OpenCV` size
///
/// # Errors
///
/// Returns an error if the value exceeds `i32::MAX`
pub fn u32_to_i32(value: u32) -> Result<i32> {
    value
        .try_into()
        .map_err(|_| Error::InvalidInput(format!("Value {value} too large to fit in i32")))
}

/// Convert an `OpenCV` dimension back to a frame dimension
///
/// # Errors
///
/// Returns an error for negative values
pub fn i32_to_u32(value: i32) -> Result<u32> {
    value
        .try_into()
        .map_err(|_| Error::InvalidInput(format!("Dimension {value} must not be negative")))
}

/// Convert an `OpenCV` dimension to a tensor dimension
///
/// # Errors
///
/// Returns an error for negative values
pub fn i32_to_usize(value: i32) -> Result<usize> {
    value
        .try_into()
        .map_err(|_| Error::InvalidInput(format!("Dimension {value} must not be negative")))
}

/// Clamp a projected coordinate into `[min, max]` and convert it to a pixel
/// coordinate. Non-finite values map to `min`.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Clamping ensures safe truncation
pub fn f64_to_i32_clamp(value: f64, min: i32, max: i32) -> i32 {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };
    if !value.is_finite() {
        return min;
    }
    (value.clamp(f64::from(min), f64::from(max)) as i32).clamp(min, max)
}
