use crate::parallel;

use super::{interpolate_pixel, InterpolationMode};
use dotcal_image::{Image, ImageError};

/// Resample an image through a coordinate lookup table.
///
/// Every destination pixel `(u, v)` is read from the source image at
/// `(map_x[v, u], map_y[v, u])` with the requested interpolation.
///
/// # Arguments
///
/// * `src` - The image to sample from.
/// * `dst` - The resampled output, sized like the maps.
/// * `map_x` - The source x coordinate for every destination pixel.
/// * `map_y` - The source y coordinate for every destination pixel.
/// * `interpolation` - The interpolation mode to use.
///
/// # Errors
///
/// Returns an error when the two maps disagree in size, or when `dst` is not
/// sized like the maps.
pub fn remap<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    map_x: &Image<f32, 1>,
    map_y: &Image<f32, 1>,
    interpolation: InterpolationMode,
) -> Result<(), ImageError> {
    if map_x.size() != map_y.size() {
        return Err(ImageError::InvalidImageSize(
            map_x.cols(),
            map_x.rows(),
            map_y.cols(),
            map_y.rows(),
        ));
    }

    if dst.size() != map_x.size() {
        return Err(ImageError::InvalidImageSize(
            dst.cols(),
            dst.rows(),
            map_x.cols(),
            map_x.rows(),
        ));
    }

    // parallelize the remap operation by rows
    parallel::par_iter_rows_resample(dst, map_x, map_y, |&x, &y, dst_pixel| {
        let pixel = interpolate_pixel(src, x, y, interpolation);
        dst_pixel.copy_from_slice(&pixel);
    });

    Ok(())
}
