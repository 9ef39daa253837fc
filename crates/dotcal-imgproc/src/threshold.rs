use num_traits::Zero;
use std::cmp::PartialOrd;

use dotcal_image::{Image, ImageError};

use crate::histogram::compute_histogram;
use crate::parallel;

/// Binarize an image with a pixel predicate.
fn binarize<T, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<T, C>,
    max_value: T,
    keep: impl Fn(&T) -> bool + Send + Sync,
) -> Result<(), ImageError>
where
    T: Copy + Send + Sync + Zero,
{
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    parallel::par_iter_rows_val(src, dst, |src_pixel, dst_pixel| {
        *dst_pixel = if keep(src_pixel) {
            max_value
        } else {
            T::zero()
        };
    });

    Ok(())
}

/// Apply a binary threshold to an image.
///
/// Pixels above `threshold` become `max_value`, the rest zero.
///
/// # Arguments
///
/// * `src` - The input image.
/// * `dst` - The output image of the same size and type.
/// * `threshold` - The threshold value.
/// * `max_value` - The value assigned to pixels above the threshold.
///
/// # Examples
///
/// ```
/// use dotcal_image::{Image, ImageSize};
/// use dotcal_imgproc::threshold::threshold_binary;
///
/// let image = Image::<_, 1>::new(
///     ImageSize { width: 2, height: 2 },
///     vec![40u8, 160, 90, 220],
/// ).unwrap();
///
/// let mut mask = Image::from_size_val(image.size(), 0u8).unwrap();
///
/// threshold_binary(&image, &mut mask, 120, 255).unwrap();
/// assert_eq!(mask.as_slice(), [0, 255, 0, 255]);
/// ```
pub fn threshold_binary<T, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<T, C>,
    threshold: T,
    max_value: T,
) -> Result<(), ImageError>
where
    T: Copy + Send + Sync + PartialOrd + Zero,
{
    binarize(src, dst, max_value, move |pixel| *pixel > threshold)
}

/// Apply an inverse binary threshold to an image.
///
/// Pixels at or below `threshold` become `max_value`, the rest zero.
///
/// # Arguments
///
/// * `src` - The input image.
/// * `dst` - The output image of the same size and type.
/// * `threshold` - The threshold value.
/// * `max_value` - The value assigned to pixels at or below the threshold.
pub fn threshold_binary_inverse<T, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<T, C>,
    threshold: T,
    max_value: T,
) -> Result<(), ImageError>
where
    T: Copy + Send + Sync + PartialOrd + Zero,
{
    binarize(src, dst, max_value, move |pixel| *pixel <= threshold)
}

/// Compute the Otsu threshold level of an 8-bit image.
///
/// The level maximizes the between-class variance of the 256-bin intensity
/// histogram.
///
/// # Arguments
///
/// * `src` - The input image with a single 8-bit channel.
///
/// # Returns
///
/// The threshold level in `[0, 255]`.
pub fn otsu_level(src: &Image<u8, 1>) -> Result<u8, ImageError> {
    let histogram = compute_histogram(src, 256)?;

    let total_pixels = (src.width() * src.height()) as f64;
    let mut sum_total = 0.0;

    for (i, &count) in histogram.iter().enumerate() {
        sum_total += i as f64 * count as f64;
    }

    let mut best_variance = 0.0;
    let mut best_threshold = 0;

    let mut weight_back = 0.0;
    let mut sum_back = 0.0;

    for (current_threshold, &hist_count) in histogram.iter().enumerate() {
        let current_threshold = current_threshold as u8;

        weight_back += hist_count as f64;
        sum_back += current_threshold as f64 * hist_count as f64;

        // skip empty classes
        if weight_back == 0.0 || weight_back == total_pixels {
            continue;
        }

        let mean_back = sum_back / weight_back;
        let weight_fore = total_pixels - weight_back;
        let sum_fore = sum_total - sum_back;
        let mean_fore = sum_fore / weight_fore;

        let variance = weight_back * weight_fore * (mean_back - mean_fore).powi(2);

        if variance > best_variance {
            best_variance = variance;
            best_threshold = current_threshold;
        }
    }

    Ok(best_threshold)
}

/// Apply Otsu's thresholding to an image.
///
/// # Arguments
///
/// * `src` - The input image with a single 8-bit channel.
/// * `dst` - The output binary image.
/// * `max_value` - The value to assign to pixels above the computed level.
///
/// # Returns
///
/// The threshold level that was applied.
///
/// # Examples
///
/// ```
/// use dotcal_image::{Image, ImageSize};
/// use dotcal_imgproc::threshold::otsu_threshold;
///
/// let image = Image::<_, 1>::new(
///     ImageSize { width: 3, height: 2 },
///     vec![30u8, 30, 30, 190, 190, 200],
/// ).unwrap();
///
/// let mut mask = Image::from_size_val(image.size(), 0u8).unwrap();
///
/// let level = otsu_threshold(&image, &mut mask, 255).unwrap();
/// assert_eq!(level, 30);
/// assert_eq!(mask.as_slice(), [0, 0, 0, 255, 255, 255]);
/// ```
pub fn otsu_threshold(
    src: &Image<u8, 1>,
    dst: &mut Image<u8, 1>,
    max_value: u8,
) -> Result<u8, ImageError> {
    let level = otsu_level(src)?;
    threshold_binary(src, dst, level, max_value)?;

    Ok(level)
}
