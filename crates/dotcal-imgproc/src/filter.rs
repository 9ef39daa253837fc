use dotcal_image::{Image, ImageError};
use rayon::prelude::*;

/// Build a normalized 1-d Gaussian kernel.
///
/// # Arguments
///
/// * `kernel_size` - The number of taps.
/// * `sigma` - The standard deviation of the Gaussian.
///
/// # Returns
///
/// A vector of `kernel_size` weights summing to one.
pub fn gaussian_kernel_1d(kernel_size: usize, sigma: f32) -> Vec<f32> {
    let center = (kernel_size - 1) as f32 / 2.0;
    let denom = 2.0 * sigma * sigma;

    let weights: Vec<f32> = (0..kernel_size)
        .map(|i| {
            let x = i as f32 - center;
            (-(x * x) / denom).exp()
        })
        .collect();

    let norm: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / norm).collect()
}

/// Apply a separable filter to an image with replicated borders.
///
/// Pixels sampled outside the image take the value of the nearest edge
/// pixel, so a normalized kernel preserves the mean intensity at the rim.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dst` - The destination image with shape (H, W, C).
/// * `kernel_x` - The horizontal kernel.
/// * `kernel_y` - The vertical kernel.
pub fn separable_filter<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    kernel_x: &[f32],
    kernel_y: &[f32],
) -> Result<(), ImageError> {
    if kernel_x.is_empty() || kernel_y.is_empty() {
        return Err(ImageError::InvalidKernelLength(
            kernel_x.len(),
            kernel_y.len(),
        ));
    }

    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let rows = src.rows();
    let cols = src.cols();

    let half_x = (kernel_x.len() / 2) as isize;
    let half_y = (kernel_y.len() / 2) as isize;

    let src_data = src.as_slice();
    let mut temp = vec![0.0f32; src_data.len()];

    // horizontal pass
    temp.par_chunks_exact_mut(cols * C)
        .enumerate()
        .for_each(|(r, temp_row)| {
            let row_offset = r * cols * C;
            for c in 0..cols {
                let mut acc = [0.0f32; C];
                for (i, &k) in kernel_x.iter().enumerate() {
                    let x = (c as isize + i as isize - half_x).clamp(0, cols as isize - 1);
                    let idx = row_offset + x as usize * C;
                    for (ch, acc_val) in acc.iter_mut().enumerate() {
                        *acc_val += src_data[idx + ch] * k;
                    }
                }
                temp_row[c * C..(c + 1) * C].copy_from_slice(&acc);
            }
        });

    // vertical pass
    dst.as_slice_mut()
        .par_chunks_exact_mut(cols * C)
        .enumerate()
        .for_each(|(r, dst_row)| {
            for c in 0..cols {
                let mut acc = [0.0f32; C];
                for (i, &k) in kernel_y.iter().enumerate() {
                    let y = (r as isize + i as isize - half_y).clamp(0, rows as isize - 1);
                    let idx = y as usize * cols * C + c * C;
                    for (ch, acc_val) in acc.iter_mut().enumerate() {
                        *acc_val += temp[idx + ch] * k;
                    }
                }
                dst_row[c * C..(c + 1) * C].copy_from_slice(&acc);
            }
        });

    Ok(())
}

/// Blur an image with a separable Gaussian filter.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `dst` - The destination image, same size as `src`.
/// * `kernel_size` - The number of taps per axis as `(x, y)`.
/// * `sigma` - The standard deviation per axis as `(x, y)`.
///
/// # Errors
///
/// Returns an error when the images differ in size or a kernel is empty.
pub fn gaussian_blur<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    kernel_size: (usize, usize),
    sigma: (f32, f32),
) -> Result<(), ImageError> {
    let kernel_x = gaussian_kernel_1d(kernel_size.0, sigma.0);
    let kernel_y = gaussian_kernel_1d(kernel_size.1, sigma.1);
    separable_filter(src, dst, &kernel_x, &kernel_y)?;
    Ok(())
}
