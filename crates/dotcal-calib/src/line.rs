use dotcal_image::ImageSize;
use dotcal_imgproc::crop::centered_roi;

use crate::center::DistortionCenter;
use crate::dot::{median, Dot};
use crate::error::CalibError;
use crate::fit::{linear_fit, parabola_fit};

/// Orientation of a grid line family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Lines running along image rows.
    Horizontal,
    /// Lines running along image columns.
    Vertical,
}

impl Direction {
    /// Travel and perpendicular coordinates of a dot for this direction.
    pub(crate) fn split(&self, dot: &Dot) -> (f64, f64) {
        match self {
            Direction::Horizontal => (dot.x, dot.y),
            Direction::Vertical => (dot.y, dot.x),
        }
    }

    /// Travel and perpendicular components of the distortion center.
    pub(crate) fn split_center(&self, center: &DistortionCenter) -> (f64, f64) {
        match self {
            Direction::Horizontal => (center.x, center.y),
            Direction::Vertical => (center.y, center.x),
        }
    }
}

/// One grouped grid line.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// Position of the line within its sorted set.
    pub index: usize,
    /// Straight-line slope in travel/perpendicular coordinates.
    pub slope: f64,
    /// Member dots, ordered along the travel direction.
    pub dots: Vec<Dot>,
}

/// All grid lines of one direction, sorted by perpendicular position.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSet {
    /// Orientation of the lines.
    pub direction: Direction,
    /// The grouped lines.
    pub lines: Vec<Line>,
}

impl LineSet {
    /// Total number of dots across all lines.
    pub fn dot_count(&self) -> usize {
        self.lines.iter().map(|line| line.dots.len()).sum()
    }
}

/// Parameters for grouping dots into grid lines.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Accepted perpendicular deviation from the slope prediction, as a
    /// fraction of the grid spacing.
    pub tolerance_ratio: f64,
    /// Number of consecutive missing dots a line may bridge.
    pub num_dot_miss: usize,
    /// Lines shorter than this fraction of the longest line are dropped.
    pub accepted_ratio: f64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            tolerance_ratio: 0.3,
            num_dot_miss: 6,
            accepted_ratio: 0.7,
        }
    }
}

/// Estimate the global line slope of one direction from the centered crop.
///
/// Crop dots are clustered by gaps in the perpendicular coordinate; each
/// cluster of at least three dots contributes a regression slope, and the
/// median over clusters is returned. Falls back to zero slope when no
/// cluster is large enough.
pub fn estimate_slope(
    dots: &[Dot],
    size: ImageSize,
    crop_ratio: f64,
    spacing: f64,
    direction: Direction,
) -> Result<f64, CalibError> {
    if !(crop_ratio > 0.0 && crop_ratio <= 1.0) {
        return Err(CalibError::InvalidGeometry(format!(
            "crop ratio {crop_ratio} is outside (0, 1]"
        )));
    }
    if !(spacing > 0.0 && spacing.is_finite()) {
        return Err(CalibError::InvalidGeometry(format!(
            "grid spacing must be positive, got {spacing}"
        )));
    }

    let (x, y, roi) = centered_roi(size, crop_ratio);
    let (x0, y0) = (x as f64, y as f64);
    let (x1, y1) = (x0 + roi.width as f64, y0 + roi.height as f64);

    let mut coords: Vec<(f64, f64)> = dots
        .iter()
        .filter(|d| d.x >= x0 && d.x < x1 && d.y >= y0 && d.y < y1)
        .map(|d| direction.split(d))
        .collect();
    coords.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.total_cmp(&b.0)));

    let mut slopes = Vec::new();
    let mut cluster: Vec<(f64, f64)> = Vec::new();
    for &(u, v) in &coords {
        if let Some(&(_, prev_v)) = cluster.last() {
            if v - prev_v > 0.5 * spacing {
                push_cluster_slope(&cluster, &mut slopes);
                cluster.clear();
            }
        }
        cluster.push((u, v));
    }
    push_cluster_slope(&cluster, &mut slopes);

    match median(&mut slopes) {
        Some(slope) => Ok(slope),
        None => {
            log::warn!("no dot cluster of three or more in the centered crop, assuming zero slope");
            Ok(0.0)
        }
    }
}

fn push_cluster_slope(cluster: &[(f64, f64)], slopes: &mut Vec<f64>) {
    if cluster.len() < 3 {
        return;
    }
    let us: Vec<f64> = cluster.iter().map(|c| c.0).collect();
    let vs: Vec<f64> = cluster.iter().map(|c| c.1).collect();
    if let Some((slope, _)) = linear_fit(&us, &vs) {
        slopes.push(slope);
    }
}

/// Group dots into grid lines of one direction.
///
/// Seeds are processed in perpendicular-then-travel coordinate order. Each
/// line grows in both travel directions, accepting the nearest unused dot
/// within `num_dot_miss × spacing` whose perpendicular deviation from the
/// slope prediction stays within `tolerance_ratio × spacing`. Lines shorter
/// than `accepted_ratio` of the longest line are dropped; survivors are
/// sorted by mean perpendicular coordinate and indexed.
///
/// All orders are fixed coordinate sorts, so the grouping is deterministic.
pub fn group_dots(
    dots: &[Dot],
    slope: f64,
    spacing: f64,
    direction: Direction,
    config: &GroupConfig,
) -> Result<LineSet, CalibError> {
    if !(spacing > 0.0 && spacing.is_finite()) {
        return Err(CalibError::InvalidGeometry(format!(
            "grid spacing must be positive, got {spacing}"
        )));
    }
    if !(config.tolerance_ratio > 0.0) || config.num_dot_miss == 0 {
        return Err(CalibError::InvalidGeometry(
            "grouping tolerance and miss count must be positive".to_string(),
        ));
    }
    if !(config.accepted_ratio > 0.0 && config.accepted_ratio <= 1.0) {
        return Err(CalibError::InvalidGeometry(format!(
            "accepted ratio {} is outside (0, 1]",
            config.accepted_ratio
        )));
    }

    let coords: Vec<(f64, f64)> = dots.iter().map(|d| direction.split(d)).collect();

    let mut seed_order: Vec<usize> = (0..coords.len()).collect();
    seed_order.sort_by(|&i, &j| {
        coords[i]
            .1
            .total_cmp(&coords[j].1)
            .then(coords[i].0.total_cmp(&coords[j].0))
    });
    let mut travel_order: Vec<usize> = (0..coords.len()).collect();
    travel_order.sort_by(|&i, &j| {
        coords[i]
            .0
            .total_cmp(&coords[j].0)
            .then(coords[i].1.total_cmp(&coords[j].1))
    });

    let tolerance = config.tolerance_ratio * spacing;
    let reach = config.num_dot_miss as f64 * spacing;

    let mut used = vec![false; coords.len()];
    let mut grouped: Vec<Vec<usize>> = Vec::new();

    for &seed in &seed_order {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        let mut members = vec![seed];

        // grow toward increasing travel coordinate
        let (mut u_cur, mut v_cur) = coords[seed];
        loop {
            let mut next = None;
            for &cand in &travel_order {
                if used[cand] {
                    continue;
                }
                let du = coords[cand].0 - u_cur;
                if du <= 0.0 {
                    continue;
                }
                if du > reach {
                    break;
                }
                if (coords[cand].1 - (v_cur + slope * du)).abs() <= tolerance {
                    next = Some(cand);
                    break;
                }
            }
            match next {
                Some(cand) => {
                    used[cand] = true;
                    members.push(cand);
                    (u_cur, v_cur) = coords[cand];
                }
                None => break,
            }
        }

        // grow toward decreasing travel coordinate
        let (mut u_cur, mut v_cur) = coords[seed];
        loop {
            let mut next = None;
            for &cand in travel_order.iter().rev() {
                if used[cand] {
                    continue;
                }
                let du = coords[cand].0 - u_cur;
                if du >= 0.0 {
                    continue;
                }
                if -du > reach {
                    break;
                }
                if (coords[cand].1 - (v_cur + slope * du)).abs() <= tolerance {
                    next = Some(cand);
                    break;
                }
            }
            match next {
                Some(cand) => {
                    used[cand] = true;
                    members.push(cand);
                    (u_cur, v_cur) = coords[cand];
                }
                None => break,
            }
        }

        grouped.push(members);
    }

    let max_len = grouped.iter().map(Vec::len).max().unwrap_or(0);
    let mut kept: Vec<(f64, Vec<usize>)> = grouped
        .into_iter()
        .filter(|members| members.len() as f64 >= config.accepted_ratio * max_len as f64)
        .map(|members| {
            let mean_v =
                members.iter().map(|&i| coords[i].1).sum::<f64>() / members.len() as f64;
            (mean_v, members)
        })
        .collect();
    kept.sort_by(|a, b| a.0.total_cmp(&b.0));

    let lines = kept
        .into_iter()
        .enumerate()
        .map(|(index, (_, mut members))| {
            members.sort_by(|&i, &j| {
                coords[i]
                    .0
                    .total_cmp(&coords[j].0)
                    .then(coords[i].1.total_cmp(&coords[j].1))
            });
            let line_dots: Vec<Dot> = members.iter().map(|&i| dots[i]).collect();
            let line_slope = fitted_slope(&line_dots, direction).unwrap_or(slope);
            Line {
                index,
                slope: line_slope,
                dots: line_dots,
            }
        })
        .collect();

    Ok(LineSet { direction, lines })
}

/// Drop dots deviating from their line's parabola fit, one pass.
///
/// Each line is refit with a parabola in the perpendicular coordinate; dots
/// whose absolute residual exceeds `threshold` are removed and the line slope
/// is refit once. Lines left with fewer than three dots are dropped.
pub fn remove_residual_dots(set: &LineSet, threshold: f64) -> Result<LineSet, CalibError> {
    if !(threshold > 0.0) {
        return Err(CalibError::InvalidGeometry(format!(
            "residual threshold must be positive, got {threshold}"
        )));
    }

    let origin = DistortionCenter { x: 0.0, y: 0.0 };
    let mut lines = Vec::with_capacity(set.lines.len());
    for line in &set.lines {
        let Some(para) = parabola_fit(&line.dots, set.direction, &origin) else {
            continue;
        };
        let kept: Vec<Dot> = line
            .dots
            .iter()
            .filter(|dot| {
                let (u, v) = set.direction.split(dot);
                (v - ((para.a * u + para.b) * u + para.c)).abs() <= threshold
            })
            .copied()
            .collect();
        if kept.len() < 3 {
            continue;
        }
        let slope = fitted_slope(&kept, set.direction).unwrap_or(line.slope);
        lines.push(Line {
            index: lines.len(),
            slope,
            dots: kept,
        });
    }

    Ok(LineSet {
        direction: set.direction,
        lines,
    })
}

/// Regression slope of dots in travel/perpendicular coordinates.
pub(crate) fn fitted_slope(dots: &[Dot], direction: Direction) -> Option<f64> {
    let us: Vec<f64> = dots.iter().map(|d| direction.split(d).0).collect();
    let vs: Vec<f64> = dots.iter().map(|d| direction.split(d).1).collect();
    linear_fit(&us, &vs).map(|(slope, _)| slope)
}
