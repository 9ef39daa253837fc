use rayon::prelude::*;

use dotcal_image::{Image, ImageError};
use dotcal_imgproc::interpolation::{remap, InterpolationMode};

use crate::center::DistortionCenter;
use crate::dot::Dot;
use crate::error::CalibError;
use crate::line::{Line, LineSet};
use crate::model::{DistortionModel, ModelKind};

/// Coverage of the destination frame after forward scattering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageReport {
    /// Number of destination pixels.
    pub total: usize,
    /// Destination pixels no source pixel landed in.
    pub vacant: usize,
    /// Vacant pixels recovered from their neighbors.
    pub filled: usize,
}

impl CoverageReport {
    /// Fraction of the destination covered after filling.
    pub fn coverage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.total - self.vacant + self.filled) as f64 / self.total as f64
    }
}

/// Correct a distorted image with a backward model.
///
/// Every destination pixel evaluates the factor at its own undistorted
/// radius and samples the source at the re-distorted position, so the
/// output has no holes.
///
/// # Errors
///
/// Returns [`CalibError::InvalidGeometry`] when the model is not backward
/// and [`CalibError::Image`] when the image sizes differ.
pub fn unwarp_image_backward<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    model: &DistortionModel,
    center: &DistortionCenter,
    interpolation: InterpolationMode,
) -> Result<(), CalibError> {
    if model.kind != ModelKind::Backward {
        return Err(CalibError::InvalidGeometry(format!(
            "expected a backward model, got {:?}",
            model.kind
        )));
    }
    if src.size() != dst.size() {
        return Err(CalibError::Image(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        )));
    }

    let size = src.size();
    let cols = size.width;
    let mut map_x = Image::<f32, 1>::from_size_val(size, 0.0)?;
    let mut map_y = Image::<f32, 1>::from_size_val(size, 0.0)?;

    map_x
        .as_slice_mut()
        .par_chunks_exact_mut(cols)
        .zip(map_y.as_slice_mut().par_chunks_exact_mut(cols))
        .enumerate()
        .for_each(|(row, (xs, ys))| {
            let yu = row as f64 - center.y;
            for (col, (mx, my)) in xs.iter_mut().zip(ys.iter_mut()).enumerate() {
                let xu = col as f64 - center.x;
                let factor = model.factor(xu.hypot(yu));
                *mx = (center.x + xu * factor) as f32;
                *my = (center.y + yu * factor) as f32;
            }
        });

    remap(src, dst, &map_x, &map_y, interpolation)?;
    Ok(())
}

/// Correct a distorted image with a forward model by scattering pixels.
///
/// Every source pixel is pushed to its corrected position rounded to the
/// nearest destination pixel; collisions average. Vacant destination pixels
/// with at least one scattered 8-neighbor are filled with the neighbor mean
/// in a single pass; pixels that stay vacant keep their existing
/// destination value.
///
/// # Errors
///
/// Returns [`CalibError::InvalidGeometry`] when the model is not forward
/// and [`CalibError::Image`] when the image sizes differ.
pub fn unwarp_image_forward<const C: usize>(
    src: &Image<f32, C>,
    dst: &mut Image<f32, C>,
    model: &DistortionModel,
    center: &DistortionCenter,
) -> Result<CoverageReport, CalibError> {
    if model.kind != ModelKind::Forward {
        return Err(CalibError::InvalidGeometry(format!(
            "expected a forward model, got {:?}",
            model.kind
        )));
    }
    if src.size() != dst.size() {
        return Err(CalibError::Image(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        )));
    }

    let cols = src.cols();
    let rows = src.rows();
    let src_slice = src.as_slice();
    let mut sums = vec![0.0f64; cols * rows * C];
    let mut counts = vec![0u32; cols * rows];

    for row in 0..rows {
        let yd = row as f64 - center.y;
        for col in 0..cols {
            let xd = col as f64 - center.x;
            let factor = model.factor(xd.hypot(yd));
            let tx = (center.x + xd * factor).round();
            let ty = (center.y + yd * factor).round();
            if !(tx.is_finite() && ty.is_finite())
                || tx < 0.0
                || ty < 0.0
                || tx >= cols as f64
                || ty >= rows as f64
            {
                continue;
            }
            let dst_idx = ty as usize * cols + tx as usize;
            let src_idx = (row * cols + col) * C;
            for ch in 0..C {
                sums[dst_idx * C + ch] += src_slice[src_idx + ch] as f64;
            }
            counts[dst_idx] += 1;
        }
    }

    let dst_slice = dst.as_slice_mut();
    for (idx, &count) in counts.iter().enumerate() {
        if count > 0 {
            for ch in 0..C {
                dst_slice[idx * C + ch] = (sums[idx * C + ch] / count as f64) as f32;
            }
        }
    }

    // the fill only reads scattered neighbors, so its order does not matter
    let total = cols * rows;
    let vacant = counts.iter().filter(|&&c| c == 0).count();
    let mut filled = 0usize;
    for row in 0..rows {
        for col in 0..cols {
            let idx = row * cols + col;
            if counts[idx] > 0 {
                continue;
            }
            let mut neighbor_sum = [0.0f64; C];
            let mut neighbor_count = 0u32;
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let ny = row as i64 + dy;
                    let nx = col as i64 + dx;
                    if ny < 0 || nx < 0 || ny >= rows as i64 || nx >= cols as i64 {
                        continue;
                    }
                    let nidx = ny as usize * cols + nx as usize;
                    if counts[nidx] == 0 {
                        continue;
                    }
                    for ch in 0..C {
                        neighbor_sum[ch] += dst_slice[nidx * C + ch] as f64;
                    }
                    neighbor_count += 1;
                }
            }
            if neighbor_count > 0 {
                for ch in 0..C {
                    dst_slice[idx * C + ch] = (neighbor_sum[ch] / neighbor_count as f64) as f32;
                }
                filled += 1;
            }
        }
    }

    Ok(CoverageReport {
        total,
        vacant,
        filled,
    })
}

/// Apply a point transform to every dot and refresh the per-line slopes.
fn transform_lines(set: &LineSet, transform: impl Fn(f64, f64) -> (f64, f64)) -> LineSet {
    let lines = set
        .lines
        .iter()
        .map(|line| {
            let dots: Vec<Dot> = line
                .dots
                .iter()
                .map(|dot| {
                    let (x, y) = transform(dot.x, dot.y);
                    Dot {
                        x,
                        y,
                        area: dot.area,
                        axis_ratio: dot.axis_ratio,
                    }
                })
                .collect();
            let slope = crate::line::fitted_slope(&dots, set.direction).unwrap_or(line.slope);
            Line {
                index: line.index,
                slope,
                dots,
            }
        })
        .collect();
    LineSet {
        direction: set.direction,
        lines,
    }
}

/// Straighten grouped lines with a backward model.
///
/// The backward factor is defined on undistorted radii, so correcting a
/// measured dot inverts the radius map numerically.
///
/// # Errors
///
/// Returns [`CalibError::InvalidGeometry`] when the model is not backward.
pub fn unwarp_line_backward(
    set: &LineSet,
    model: &DistortionModel,
    center: &DistortionCenter,
) -> Result<LineSet, CalibError> {
    if model.kind != ModelKind::Backward {
        return Err(CalibError::InvalidGeometry(format!(
            "expected a backward model, got {:?}",
            model.kind
        )));
    }
    Ok(transform_lines(set, |x, y| model.unwarp_point(x, y, center)))
}

/// Straighten grouped lines with a forward model.
///
/// # Errors
///
/// Returns [`CalibError::InvalidGeometry`] when the model is not forward.
pub fn unwarp_line_forward(
    set: &LineSet,
    model: &DistortionModel,
    center: &DistortionCenter,
) -> Result<LineSet, CalibError> {
    if model.kind != ModelKind::Forward {
        return Err(CalibError::InvalidGeometry(format!(
            "expected a forward model, got {:?}",
            model.kind
        )));
    }
    Ok(transform_lines(set, |x, y| model.warp_point(x, y, center)))
}
