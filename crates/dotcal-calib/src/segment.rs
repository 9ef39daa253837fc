use dotcal_image::Image;
use dotcal_imgproc::crop::{centered_roi, crop_image};
use dotcal_imgproc::filter::gaussian_blur;
use dotcal_imgproc::parallel::par_iter_rows_val;
use dotcal_imgproc::threshold::otsu_level;

use crate::dot::DotMask;
use crate::error::CalibError;

/// Configuration of dot segmentation.
#[derive(Debug, Clone, Copy)]
pub struct SegmentConfig {
    /// Fraction of each image extent used to sample the intensity range for
    /// automatic thresholding.
    pub crop_ratio: f64,
    /// Binarization threshold. Estimated with Otsu's method on the centered
    /// crop when unset.
    pub threshold: Option<f32>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            crop_ratio: 0.3,
            threshold: None,
        }
    }
}

/// Flatten a slowly varying background by dividing by its blurred estimate.
///
/// The background is a Gaussian blur of scale `sigma` and the quotient is
/// rescaled to the mean of the estimate, so flat regions keep their original
/// intensity. The replicated-border blur keeps the estimate usable up to the
/// image edge.
///
/// # Errors
///
/// Returns [`CalibError::InvalidGeometry`] when `sigma` is not positive.
pub fn normalize_background(
    src: &Image<f32, 1>,
    dst: &mut Image<f32, 1>,
    sigma: f32,
) -> Result<(), CalibError> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(CalibError::InvalidGeometry(format!(
            "background sigma must be positive, got {sigma}"
        )));
    }

    let radius = (3.0 * sigma).ceil() as usize;
    let ksize = 2 * radius + 1;
    gaussian_blur(src, dst, (ksize, ksize), (sigma, sigma))?;

    let total: f64 = dst.as_slice().iter().map(|&v| v as f64).sum();
    let mean = (total / dst.as_slice().len() as f64) as f32;

    par_iter_rows_val(src, dst, |src_pixel, dst_pixel| {
        let background = *dst_pixel;
        *dst_pixel = if background > f32::EPSILON {
            *src_pixel / background * mean
        } else {
            *src_pixel
        };
    });

    Ok(())
}

/// Otsu threshold computed on a centered crop, mapped back to source units.
fn auto_threshold(src: &Image<f32, 1>, crop_ratio: f64) -> Result<f32, CalibError> {
    let (x, y, roi_size) = centered_roi(src.size(), crop_ratio);
    let mut roi = Image::<f32, 1>::from_size_val(roi_size, 0.0)?;
    crop_image(src, &mut roi, x, y)?;

    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for &value in roi.as_slice() {
        lo = lo.min(value);
        hi = hi.max(value);
    }
    if !(hi > lo) {
        return Err(CalibError::InvalidGeometry(
            "the image has no intensity contrast to segment".to_string(),
        ));
    }

    let scale = 255.0 / (hi - lo);
    let mut gray = Image::<u8, 1>::from_size_val(roi_size, 0)?;
    par_iter_rows_val(&roi, &mut gray, |src_pixel, dst_pixel| {
        *dst_pixel = ((*src_pixel - lo) * scale).min(255.0) as u8;
    });
    let level = otsu_level(&gray)?;

    Ok(lo + (level as f32 + 0.5) / scale)
}

/// Binarize a dot pattern image into a dot mask.
///
/// Dots are assumed darker than the background. When the initial mask covers
/// more than half of the image the polarity is flipped, so bright dots on a
/// dark background segment the same way.
///
/// # Errors
///
/// Returns [`CalibError::InvalidGeometry`] when `crop_ratio` is out of range
/// or the image has no contrast.
pub fn segment(src: &Image<f32, 1>, config: &SegmentConfig) -> Result<DotMask, CalibError> {
    if !(config.crop_ratio.is_finite() && config.crop_ratio > 0.0 && config.crop_ratio <= 1.0) {
        return Err(CalibError::InvalidGeometry(format!(
            "crop ratio must be in (0, 1], got {}",
            config.crop_ratio
        )));
    }

    let threshold = match config.threshold {
        Some(value) => value,
        None => auto_threshold(src, config.crop_ratio)?,
    };

    let mut mask = DotMask::from_size_val(src.size(), 0)?;
    par_iter_rows_val(src, &mut mask, |src_pixel, dst_pixel| {
        *dst_pixel = if *src_pixel < threshold { 255 } else { 0 };
    });

    let foreground = mask.as_slice().iter().filter(|&&m| m != 0).count();
    if 2 * foreground > mask.as_slice().len() {
        par_iter_rows_val(src, &mut mask, |src_pixel, dst_pixel| {
            *dst_pixel = if *src_pixel > threshold { 255 } else { 0 };
        });
    }

    Ok(mask)
}
