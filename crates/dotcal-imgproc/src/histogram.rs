use dotcal_image::{Image, ImageError};
use rayon::prelude::*;

/// Count the pixel intensities of an 8-bit image into equal-width bins.
///
/// The 256 intensity levels are split evenly over `num_bins` bins, so with
/// 256 bins every level gets its own bin.
///
/// # Arguments
///
/// * `src` - The input image with a single 8-bit channel.
/// * `num_bins` - The number of bins, between 1 and 256.
///
/// # Returns
///
/// A vector of `num_bins` counts.
///
/// # Example
///
/// ```
/// use dotcal_image::{Image, ImageSize};
/// use dotcal_imgproc::histogram::compute_histogram;
///
/// let image = Image::<u8, 1>::new(
///   ImageSize {
///     width: 2,
///     height: 2,
///   },
///   vec![0, 64, 128, 255],
/// ).unwrap();
///
/// let histogram = compute_histogram(&image, 4).unwrap();
/// assert_eq!(histogram, vec![1, 1, 1, 1]);
/// ```
pub fn compute_histogram(src: &Image<u8, 1>, num_bins: usize) -> Result<Vec<u32>, ImageError> {
    if num_bins == 0 || num_bins > 256 {
        return Err(ImageError::InvalidHistogramBins(num_bins));
    }

    let histogram = src
        .as_slice()
        .par_chunks(8192)
        .map(|chunk| {
            let mut counts = vec![0u32; num_bins];
            for &pixel in chunk {
                counts[pixel as usize * num_bins / 256] += 1;
            }
            counts
        })
        .reduce(
            || vec![0u32; num_bins],
            |mut acc, counts| {
                for (total, count) in acc.iter_mut().zip(counts) {
                    *total += count;
                }
                acc
            },
        );

    Ok(histogram)
}
