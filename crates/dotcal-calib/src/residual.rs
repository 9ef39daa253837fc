use crate::center::DistortionCenter;
use crate::fit::linear_fit;
use crate::line::LineSet;

/// Straightness of one grouped line.
#[derive(Debug, Clone, Copy)]
pub struct LineResidual {
    /// Index of the line within its set.
    pub index: usize,
    /// Number of dots measured.
    pub dot_count: usize,
    /// Mean absolute perpendicular distance to the fitted straight line.
    pub mean_abs: f64,
    /// Largest absolute perpendicular distance.
    pub max_abs: f64,
    /// Largest dot radius about the center.
    pub max_radius: f64,
}

/// Perpendicular residuals of every line against its own straight-line fit.
///
/// A perfectly corrected grid has straight lines, so these residuals measure
/// remaining distortion. Lines with fewer than two dots carry no
/// straightness information and are skipped.
pub fn line_residuals(set: &LineSet, center: &DistortionCenter) -> Vec<LineResidual> {
    let mut residuals = Vec::with_capacity(set.lines.len());
    for line in &set.lines {
        if line.dots.len() < 2 {
            continue;
        }
        let (us, vs): (Vec<f64>, Vec<f64>) =
            line.dots.iter().map(|d| set.direction.split(d)).unzip();
        let Some((slope, intercept)) = linear_fit(&us, &vs) else {
            continue;
        };

        let norm = (1.0 + slope * slope).sqrt();
        let mut sum_abs = 0.0;
        let mut max_abs = 0.0_f64;
        let mut max_radius = 0.0_f64;
        for dot in &line.dots {
            let (u, v) = set.direction.split(dot);
            let deviation = (v - (slope * u + intercept)).abs() / norm;
            sum_abs += deviation;
            max_abs = max_abs.max(deviation);
            max_radius = max_radius.max((dot.x - center.x).hypot(dot.y - center.y));
        }
        residuals.push(LineResidual {
            index: line.index,
            dot_count: line.dots.len(),
            mean_abs: sum_abs / line.dots.len() as f64,
            max_abs,
            max_radius,
        });
    }
    residuals
}

/// Whether the measured residuals indicate significant distortion.
///
/// True when either the largest residual or the mean of the per-line means
/// exceeds `threshold`.
pub fn check_distortion(residuals: &[LineResidual], threshold: f64) -> bool {
    if residuals.is_empty() {
        return false;
    }
    let max = residuals.iter().map(|r| r.max_abs).fold(0.0_f64, f64::max);
    let mean = residuals.iter().map(|r| r.mean_abs).sum::<f64>() / residuals.len() as f64;
    max > threshold || mean > threshold
}
