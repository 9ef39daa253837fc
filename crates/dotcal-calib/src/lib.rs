#![deny(missing_docs)]
//! # dotcal-calib
//!
//! Calibration of radial lens distortion from dot-grid target images:
//! segmentation, grid grouping, center estimation, polynomial model fitting
//! and image correction.

use dotcal_image::Image;

use crate::{
    center::{DistortionCenter, FineSearchConfig},
    dot::PatternStats,
    line::{Direction, GroupConfig, LineSet},
    model::DistortionModel,
    residual::LineResidual,
    segment::SegmentConfig,
};

/// Error types for the calibration pipeline.
pub mod error;

/// Dot extraction from binary masks and shape statistics.
pub mod dot;

/// Background normalization and dot pattern binarization.
pub mod segment;

/// Grouping of dots into horizontal and vertical grid lines.
pub mod line;

/// Least-squares fitting of radial distortion models.
pub mod fit;

/// Distortion center estimation.
pub mod center;

/// Polynomial radial distortion models.
pub mod model;

/// Straightness residuals of grouped lines.
pub mod residual;

/// Image and line correction with fitted models.
pub mod unwarp;

mod union_find;

pub use crate::error::CalibError;

/// Configuration of the full calibration pipeline.
#[derive(Debug, Clone)]
pub struct CalibConfig {
    /// Dot segmentation parameters.
    pub segment: SegmentConfig,
    /// Whether to flatten the illumination background before segmentation.
    pub normalize_background: bool,
    /// Gaussian scale of the background estimate in pixels.
    pub background_sigma: f32,
    /// Keep dots whose area is within this fraction of the median area.
    pub size_ratio: f64,
    /// Keep dots whose axis ratio is at most this fraction above round.
    pub axis_ratio: f64,
    /// Line grouping parameters.
    pub group: GroupConfig,
    /// Drop grouped dots whose parabola residual exceeds this many pixels.
    pub residual_threshold: f64,
    /// Whether to refine the coarse center with the symmetry search.
    pub refine_center: bool,
    /// Fine center search parameters.
    pub fine_search: FineSearchConfig,
    /// Number of polynomial coefficients of the fitted model.
    pub num_coef: usize,
    /// Residual in pixels above which the distortion is significant.
    pub distortion_threshold: f64,
}

impl Default for CalibConfig {
    fn default() -> Self {
        Self {
            segment: SegmentConfig::default(),
            normalize_background: true,
            background_sigma: 20.0,
            size_ratio: 0.3,
            axis_ratio: 0.3,
            group: GroupConfig::default(),
            residual_threshold: 2.0,
            refine_center: false,
            fine_search: FineSearchConfig::default(),
            num_coef: 5,
            distortion_threshold: 1.0,
        }
    }
}

/// Result of a dot-grid calibration.
#[derive(Debug, Clone)]
pub struct Calibration {
    /// Estimated distortion center.
    pub center: DistortionCenter,
    /// Fitted backward distortion model.
    pub model: DistortionModel,
    /// Grouped horizontal lines after cleanup.
    pub hor_lines: LineSet,
    /// Grouped vertical lines after cleanup.
    pub ver_lines: LineSet,
    /// Median dot size and spacing of the pattern.
    pub stats: PatternStats,
    /// Line residuals measured on the distorted grid.
    pub residual_before: Vec<LineResidual>,
    /// Line residuals measured after correction with the fitted model.
    pub residual_after: Vec<LineResidual>,
    /// Whether the measured distortion exceeded the significance threshold.
    pub significant_distortion: bool,
}

/// Calibrate radial distortion from a dot-grid target image.
///
/// Runs the full pipeline: dot segmentation, shape filtering, line
/// grouping, center estimation, backward model fitting and a residual
/// check of the corrected grid.
///
/// # Arguments
///
/// * `src` - The target image with one channel, dots darker or brighter
///   than the background.
/// * `config` - The pipeline configuration.
///
/// # Errors
///
/// Returns [`CalibError::InsufficientDots`] when too few dots survive the
/// shape filters, and the segmentation, grouping or fitting errors of the
/// corresponding stage otherwise.
pub fn calibrate(src: &Image<f32, 1>, config: &CalibConfig) -> Result<Calibration, CalibError> {
    // Step 1: Segment the dot pattern
    let mask = if config.normalize_background {
        let mut flattened = Image::from_size_val(src.size(), 0.0)?;
        segment::normalize_background(src, &mut flattened, config.background_sigma)?;
        segment::segment(&flattened, &config.segment)?
    } else {
        segment::segment(src, &config.segment)?
    };

    // Step 2: Extract dots and filter by shape
    let stats = dot::pattern_stats(&mask, config.segment.crop_ratio)?;
    let dots = dot::extract_dots(&mask)?;
    let dots = dot::select_dots_by_size(dots, stats.dot_size, config.size_ratio);
    let dots = dot::select_dots_by_ratio(dots, config.axis_ratio);
    if dots.len() < dot::MIN_DOTS {
        return Err(CalibError::InsufficientDots(dots.len(), dot::MIN_DOTS));
    }
    log::debug!(
        "kept {} dots, median size {:.1} px, spacing {:.1} px",
        dots.len(),
        stats.dot_size,
        stats.dot_dist
    );

    // Step 3: Group dots into grid lines
    let slope_h = line::estimate_slope(
        &dots,
        src.size(),
        config.segment.crop_ratio,
        stats.dot_dist,
        Direction::Horizontal,
    )?;
    let slope_v = line::estimate_slope(
        &dots,
        src.size(),
        config.segment.crop_ratio,
        stats.dot_dist,
        Direction::Vertical,
    )?;
    let hor = line::group_dots(&dots, slope_h, stats.dot_dist, Direction::Horizontal, &config.group)?;
    let ver = line::group_dots(&dots, slope_v, stats.dot_dist, Direction::Vertical, &config.group)?;
    let hor = line::remove_residual_dots(&hor, config.residual_threshold)?;
    let ver = line::remove_residual_dots(&ver, config.residual_threshold)?;
    log::debug!(
        "grouped {} horizontal and {} vertical lines",
        hor.lines.len(),
        ver.lines.len()
    );

    // Step 4: Locate the distortion center
    let coarse = center::find_center_coarse(&hor, &ver)?;
    let center = if config.refine_center {
        center::find_center_fine(&hor, &ver, &coarse, stats.dot_dist, &config.fine_search)?
    } else {
        coarse
    };
    log::info!("distortion center at ({:.2}, {:.2})", center.x, center.y);

    // Step 5: Fit the backward model
    let model = fit::fit_backward(&hor, &ver, &center, config.num_coef)?;

    // Step 6: Measure residuals before and after correction
    let mut residual_before = residual::line_residuals(&hor, &center);
    residual_before.extend(residual::line_residuals(&ver, &center));
    let significant_distortion =
        residual::check_distortion(&residual_before, config.distortion_threshold);

    let hor_corrected = unwarp::unwarp_line_backward(&hor, &model, &center)?;
    let ver_corrected = unwarp::unwarp_line_backward(&ver, &model, &center)?;
    let mut residual_after = residual::line_residuals(&hor_corrected, &center);
    residual_after.extend(residual::line_residuals(&ver_corrected, &center));

    let worst_before = residual_before.iter().map(|r| r.max_abs).fold(0.0, f64::max);
    let worst_after = residual_after.iter().map(|r| r.max_abs).fold(0.0, f64::max);
    log::info!(
        "line residuals: {worst_before:.3} px before, {worst_after:.3} px after correction"
    );

    Ok(Calibration {
        center,
        model,
        hor_lines: hor,
        ver_lines: ver,
        stats,
        residual_before,
        residual_after,
        significant_distortion,
    })
}
