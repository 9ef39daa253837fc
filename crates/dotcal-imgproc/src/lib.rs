#![deny(missing_docs)]
//! Image processing operations for the dotcal calibration crates

/// image cropping and region helpers.
pub mod crop;

/// image filtering operations.
pub mod filter;

/// compute the pixel intensity histogram of images.
pub mod histogram;

/// interpolation and remapping operations.
pub mod interpolation;

/// parallel iteration helpers over image rows.
pub mod parallel;

/// image thresholding operations.
pub mod threshold;
