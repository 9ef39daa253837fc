//! Interpolated sampling at fractional pixel coordinates.
//!
//! The kernels here back the [`remap`] resampling operation, which reads a
//! source image at arbitrary sub-pixel positions.

mod bilinear;
mod nearest;
mod remap;

use bilinear::bilinear_interpolation;
use dotcal_image::Image;
use nearest::nearest_neighbor_interpolation;

pub use remap::remap;

/// How a sample between pixel centers is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    /// Bilinear interpolation
    Bilinear,
    /// Nearest neighbor interpolation
    Nearest,
}

/// Sample an image at a fractional coordinate.
///
/// Dispatches on `interpolation` and returns the sampled pixel values.
/// Coordinates outside the image are clamped to the border.
pub fn interpolate_pixel<const C: usize>(
    image: &Image<f32, C>,
    u: f32,
    v: f32,
    interpolation: InterpolationMode,
) -> [f32; C] {
    match interpolation {
        InterpolationMode::Bilinear => bilinear_interpolation(image, u, v),
        InterpolationMode::Nearest => nearest_neighbor_interpolation(image, u, v),
    }
}
