//! Utility functions for numeric casts and image conversion.

pub mod image_conversion;
pub mod safe_cast;
