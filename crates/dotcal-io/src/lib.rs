#![deny(missing_docs)]
//! Reading and writing for the dotcal calibration workflow: grayscale PNG
//! images and plain-text calibration metadata.

/// Error types for I/O operations.
pub mod error;

/// PNG image encoding and decoding.
///
/// Read and write grayscale PNG images at 8 and 16 bit depth.
pub mod png;

/// Plain-text persistence for calibration results.
///
/// Save and load the distortion center and model coefficients so a
/// calibration can be reused without access to the original target image.
pub mod metadata;

pub use crate::error::IoError;
