use std::collections::HashMap;

use dotcal_image::Image;
use dotcal_imgproc::crop::{centered_roi, crop_image};

use crate::error::CalibError;
use crate::union_find::UnionFind;

/// Binary dot mask, 255 for dot pixels and 0 for background.
pub type DotMask = Image<u8, 1>;

/// Minimum number of dots required for a usable calibration pattern.
pub(crate) const MIN_DOTS: usize = 25;

/// A segmented dot blob.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dot {
    /// Centroid column in sub-pixel coordinates.
    pub x: f64,
    /// Centroid row in sub-pixel coordinates.
    pub y: f64,
    /// Blob area in pixels.
    pub area: usize,
    /// Major over minor axis ratio of the moment ellipse, `>= 1`.
    pub axis_ratio: f64,
}

/// Median blob statistics measured near the image center.
#[derive(Debug, Clone, Copy)]
pub struct PatternStats {
    /// Median dot area in pixels.
    pub dot_size: f64,
    /// Median nearest-neighbour centroid distance in pixels.
    pub dot_dist: f64,
}

#[derive(Default)]
struct Moments {
    m00: usize,
    m10: f64,
    m01: f64,
    m20: f64,
    m02: f64,
    m11: f64,
}

/// Label 4-connected foreground components and reduce each to a [`Dot`].
fn label_dots(mask: &DotMask) -> Vec<Dot> {
    let cols = mask.cols();
    let rows = mask.rows();
    let data = mask.as_slice();

    let mut uf = UnionFind::new(data.len());
    for y in 0..rows {
        for x in 0..cols {
            let i = y * cols + x;
            if data[i] == 0 {
                continue;
            }
            if x + 1 < cols && data[i + 1] != 0 {
                uf.union(i, i + 1);
            }
            if y + 1 < rows && data[i + cols] != 0 {
                uf.union(i, i + cols);
            }
        }
    }

    let mut components: HashMap<usize, Moments> = HashMap::new();
    for y in 0..rows {
        for x in 0..cols {
            let i = y * cols + x;
            if data[i] == 0 {
                continue;
            }
            let moments = components.entry(uf.find(i)).or_default();
            let (xf, yf) = (x as f64, y as f64);
            moments.m00 += 1;
            moments.m10 += xf;
            moments.m01 += yf;
            moments.m20 += xf * xf;
            moments.m02 += yf * yf;
            moments.m11 += xf * yf;
        }
    }

    let mut dots: Vec<Dot> = components
        .values()
        .map(|m| {
            let m00 = m.m00 as f64;
            let cx = m.m10 / m00;
            let cy = m.m01 / m00;
            let mu20 = m.m20 / m00 - cx * cx;
            let mu02 = m.m02 / m00 - cy * cy;
            let mu11 = m.m11 / m00 - cx * cy;
            let mean = 0.5 * (mu20 + mu02);
            let dev = (0.25 * (mu20 - mu02) * (mu20 - mu02) + mu11 * mu11).sqrt();
            let (l_max, l_min) = (mean + dev, mean - dev);
            let axis_ratio = if l_min > 1e-9 {
                (l_max / l_min).sqrt()
            } else if l_max > 1e-9 {
                f64::INFINITY
            } else {
                1.0
            };
            Dot {
                x: cx,
                y: cy,
                area: m.m00,
                axis_ratio,
            }
        })
        .collect();
    dots.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));
    dots
}

/// Extract dot blobs from a binary mask.
///
/// Components are labeled with 4-connectivity; each yields a centroid, an
/// area, and the axis ratio of its second-moment ellipse. Dots are returned
/// in row-major centroid order.
///
/// # Errors
///
/// Returns [`CalibError::InsufficientDots`] when fewer than 25 dots are found.
pub fn extract_dots(mask: &DotMask) -> Result<Vec<Dot>, CalibError> {
    let dots = label_dots(mask);
    if dots.len() < MIN_DOTS {
        return Err(CalibError::InsufficientDots(dots.len(), MIN_DOTS));
    }
    Ok(dots)
}

/// Measure median dot statistics over a centered crop of the mask.
///
/// The crop keeps the measurement in the flat-field region where grid
/// geometry is unaffected by distortion.
pub fn pattern_stats(mask: &DotMask, crop_ratio: f64) -> Result<PatternStats, CalibError> {
    if !(crop_ratio > 0.0 && crop_ratio <= 1.0) {
        return Err(CalibError::InvalidGeometry(format!(
            "crop ratio {crop_ratio} is outside (0, 1]"
        )));
    }

    let (x, y, roi) = centered_roi(mask.size(), crop_ratio);
    let mut cropped = Image::from_size_val(roi, 0u8)?;
    crop_image(mask, &mut cropped, x, y)?;

    let dots = label_dots(&cropped);
    if dots.len() < 2 {
        return Err(CalibError::InsufficientDots(dots.len(), 2));
    }

    let mut areas: Vec<f64> = dots.iter().map(|d| d.area as f64).collect();
    let mut distances: Vec<f64> = dots
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let mut nearest = f64::INFINITY;
            for (j, b) in dots.iter().enumerate() {
                if i != j {
                    nearest = nearest.min((a.x - b.x).hypot(a.y - b.y));
                }
            }
            nearest
        })
        .collect();

    Ok(PatternStats {
        dot_size: median(&mut areas).unwrap_or_default(),
        dot_dist: median(&mut distances).unwrap_or_default(),
    })
}

/// Keep dots whose area lies within `ratio` of the median size.
pub fn select_dots_by_size(dots: Vec<Dot>, median_size: f64, ratio: f64) -> Vec<Dot> {
    let low = median_size * (1.0 - ratio);
    let high = median_size * (1.0 + ratio);
    dots.into_iter()
        .filter(|d| {
            let area = d.area as f64;
            area >= low && area <= high
        })
        .collect()
}

/// Keep dots whose moment ellipse is close to circular.
pub fn select_dots_by_ratio(dots: Vec<Dot>, ratio: f64) -> Vec<Dot> {
    let limit = 1.0 + ratio;
    dots.into_iter().filter(|d| d.axis_ratio <= limit).collect()
}

/// Median of a sample, averaging the two middle values for even counts.
pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some(0.5 * (values[mid - 1] + values[mid]))
    }
}
