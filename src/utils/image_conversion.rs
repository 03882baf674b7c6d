//! Conversion of `OpenCV` frames into model input tensors.

use crate::constants::{IMAGE_NORMALIZATION_OFFSET, IMAGE_NORMALIZATION_SCALE};
use crate::utils::safe_cast::{i32_to_usize, usize_to_i32};
use crate::{Error, Result};
use ndarray::Array4;
use opencv::core::{Mat, Rect, Scalar, Size, Vec3f, CV_32F, CV_8UC3};
use opencv::imgproc::{self, InterpolationFlags};
use opencv::prelude::*;

/// Memory layout of an image input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[batch, height, width, channels]`
    Nhwc,
    /// `[batch, channels, height, width]`
    Nchw,
}

/// Intermediate images reused across conversions
#[derive(Default)]
pub struct TensorScratch {
    resized: Mat,
    rgb: Mat,
    float: Mat,
}

/// Resize a BGR frame to `size` × `size`, convert it to RGB in `[0, 1]` and
/// pack it as a single-image batch in the requested layout.
///
/// # Errors
///
/// Returns an error if the frame is empty or not 3-channel, or if an
/// `OpenCV` conversion fails
pub fn mat_to_rgb_tensor(image: &Mat, size: usize, layout: TensorLayout, scratch: &mut TensorScratch) -> Result<Array4<f32>> {
    check_bgr(image)?;
    let side = usize_to_i32(size)?;
    imgproc::resize(
        image,
        &mut scratch.resized,
        Size::new(side, side),
        0.0,
        0.0,
        InterpolationFlags::INTER_LINEAR as i32,
    )?;
    imgproc::cvt_color(&scratch.resized, &mut scratch.rgb, imgproc::COLOR_BGR2RGB, 0)?;
    scratch.rgb.convert_to(&mut scratch.float, CV_32F, 1.0 / 255.0, 0.0)?;

    let float = if scratch.float.is_continuous() {
        &scratch.float
    } else {
        scratch.resized = scratch.float.try_clone()?;
        &scratch.resized
    };
    let pixels = float.data_typed::<Vec3f>()?;
    let expected = size * size;
    if pixels.len() != expected {
        return Err(Error::ModelInputError(format!(
            "Converted frame has {} pixels, expected {expected}",
            pixels.len()
        )));
    }

    let tensor = match layout {
        TensorLayout::Nhwc => Array4::from_shape_fn((1, size, size, 3), |(_, y, x, c)| pixels[y * size + x][c]),
        TensorLayout::Nchw => Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| pixels[y * size + x][c]),
    };
    Ok(tensor)
}

/// Letterbox a BGR frame into a `width` × `height` canvas (top-left
/// aligned, zero padded), convert it to RGB normalized around zero and pack
/// it as a single NCHW image.
///
/// Returns the tensor and the factor that maps frame pixels to canvas
/// pixels.
///
/// # Errors
///
/// Returns an error if the frame is empty or not 3-channel, or if an
/// `OpenCV` conversion fails
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn letterbox_rgb_tensor(
    image: &Mat,
    width: i32,
    height: i32,
    scratch: &mut TensorScratch,
) -> Result<(Array4<f32>, f32)> {
    check_bgr(image)?;
    let scale = (width as f32 / image.cols() as f32).min(height as f32 / image.rows() as f32);
    let fitted_width = ((image.cols() as f32 * scale) as i32).clamp(1, width);
    let fitted_height = ((image.rows() as f32 * scale) as i32).clamp(1, height);

    imgproc::resize(
        image,
        &mut scratch.resized,
        Size::new(fitted_width, fitted_height),
        0.0,
        0.0,
        InterpolationFlags::INTER_LINEAR as i32,
    )?;
    let mut canvas = Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(0.0))?;
    {
        let mut roi = canvas.roi_mut(Rect::new(0, 0, fitted_width, fitted_height))?;
        scratch.resized.copy_to(&mut roi)?;
    }
    imgproc::cvt_color(&canvas, &mut scratch.rgb, imgproc::COLOR_BGR2RGB, 0)?;
    scratch.rgb.convert_to(
        &mut scratch.float,
        CV_32F,
        f64::from(1.0 / IMAGE_NORMALIZATION_SCALE),
        f64::from(-IMAGE_NORMALIZATION_OFFSET / IMAGE_NORMALIZATION_SCALE),
    )?;

    let (w, h) = (i32_to_usize(width)?, i32_to_usize(height)?);
    let pixels = scratch.float.data_typed::<Vec3f>()?;
    if pixels.len() != w * h {
        return Err(Error::ModelInputError(format!(
            "Letterboxed frame has {} pixels, expected {}",
            pixels.len(),
            w * h
        )));
    }
    let tensor = Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| pixels[y * w + x][c]);
    Ok((tensor, scale))
}

fn check_bgr(image: &Mat) -> Result<()> {
    if image.empty() {
        return Err(Error::InvalidInput("Cannot convert an empty frame".to_string()));
    }
    if image.channels() != 3 {
        return Err(Error::InvalidInput(format!(
            "Expected a 3-channel BGR frame, got {} channels",
            image.channels()
        )));
    }
    Ok(())
}
