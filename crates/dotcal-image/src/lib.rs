#![deny(missing_docs)]
//! Image types and pixel-level operations for the dotcal calibration crates

/// grayscale-first image container with interleaved channels.
pub mod image;

/// error types shared by the image operations.
pub mod error;

/// Pixel-wise operations on images.
pub mod ops;

pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize};
