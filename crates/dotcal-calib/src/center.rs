use faer::prelude::SpSolverLstsq;

use crate::error::CalibError;
use crate::fit::{collect_scale_samples, parabola_fit, ScaleSample};
use crate::line::LineSet;

/// Minimum number of scale samples for a meaningful symmetry cost.
const MIN_COST_SAMPLES: usize = 20;

/// Center of radial distortion in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionCenter {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

/// Parameters of the fine center search.
#[derive(Debug, Clone, Copy)]
pub struct FineSearchConfig {
    /// Initial step of the pattern search in pixels.
    pub step: f64,
    /// Step below which the search stops, in pixels.
    pub stop: f64,
    /// Maximum pattern search iterations.
    pub max_iters: usize,
}

impl Default for FineSearchConfig {
    fn default() -> Self {
        Self {
            step: 2.0,
            stop: 0.05,
            max_iters: 100,
        }
    }
}

/// Distortion axis of one direction as slope and intercept in its `(u, v)`
/// frame.
///
/// Radial distortion bends lines away from the center, so the parabola
/// curvature changes sign where the grid crosses the center. The axis is
/// interpolated between the adjacent lines whose curvatures disagree in
/// sign, weighted by curvature magnitude. A grid that never crosses the
/// center falls back to its flattest line.
fn direction_axis(set: &LineSet) -> Result<(f64, f64), CalibError> {
    let origin = DistortionCenter { x: 0.0, y: 0.0 };
    let parabolas: Vec<_> = set
        .lines
        .iter()
        .filter_map(|line| parabola_fit(&line.dots, set.direction, &origin))
        .collect();
    if parabolas.is_empty() {
        return Err(CalibError::DegenerateFit {
            constraints: 0,
            unknowns: 3,
        });
    }

    for pair in parabolas.windows(2) {
        let (p0, p1) = (&pair[0], &pair[1]);
        if p0.a * p1.a < 0.0 {
            let t = p0.a.abs() / (p0.a.abs() + p1.a.abs());
            let slope = p0.b + t * (p1.b - p0.b);
            let intercept = p0.c + t * (p1.c - p0.c);
            return Ok((slope, intercept));
        }
    }

    let mut flattest = &parabolas[0];
    for para in &parabolas[1..] {
        if para.a.abs() < flattest.a.abs() {
            flattest = para;
        }
    }
    Ok((flattest.b, flattest.c))
}

/// Coarse distortion center from the intersection of the two distortion
/// axes.
///
/// # Errors
///
/// Returns [`CalibError::DegenerateFit`] when a direction has no line with
/// three or more dots, and [`CalibError::InvalidGeometry`] when the two axes
/// are nearly parallel.
pub fn find_center_coarse(hor: &LineSet, ver: &LineSet) -> Result<DistortionCenter, CalibError> {
    let (slope_h, icept_h) = direction_axis(hor)?;
    let (slope_v, icept_v) = direction_axis(ver)?;

    // y = slope_h·x + icept_h crossed with x = slope_v·y + icept_v
    let den = 1.0 - slope_h * slope_v;
    if den.abs() < 1e-8 {
        return Err(CalibError::InvalidGeometry(
            "the distortion axes are nearly parallel".to_string(),
        ));
    }
    Ok(DistortionCenter {
        x: (icept_v + slope_v * icept_h) / den,
        y: (icept_h + slope_h * icept_v) / den,
    })
}

/// Radial symmetry cost of a center candidate.
///
/// Collects the scale samples both directions would contribute at this
/// center and measures how well a single even polynomial in the radius
/// explains them. At the true center the per-dot scales are a function of
/// the radius alone, so the residual is the cost. Returns infinity when the
/// candidate yields too few samples.
fn symmetry_cost(
    hor: &LineSet,
    ver: &LineSet,
    center: &DistortionCenter,
    min_intercept: f64,
) -> f64 {
    let mut samples: Vec<ScaleSample> = Vec::new();
    if collect_scale_samples(hor, center, min_intercept, &mut samples).is_err() {
        return f64::INFINITY;
    }
    if collect_scale_samples(ver, center, min_intercept, &mut samples).is_err() {
        return f64::INFINITY;
    }
    if samples.len() < MIN_COST_SAMPLES {
        return f64::INFINITY;
    }

    let r_norm = samples.iter().map(|s| s.ru).fold(0.0_f64, f64::max);
    if !(r_norm > 0.0) {
        return f64::INFINITY;
    }

    let mut rows = Vec::with_capacity(samples.len());
    let mut targets = Vec::with_capacity(samples.len());
    for sample in &samples {
        let x = sample.ru / r_norm;
        rows.push([1.0, x * x, x * x * x * x]);
        targets.push(1.0 / sample.t);
    }

    let mut mat_a = faer::Mat::<f64>::zeros(rows.len(), 3);
    let mut mat_b = faer::Mat::<f64>::zeros(rows.len(), 1);
    for (i, (row, target)) in rows.iter().zip(&targets).enumerate() {
        unsafe {
            mat_a.write_unchecked(i, 0, row[0]);
            mat_a.write_unchecked(i, 1, row[1]);
            mat_a.write_unchecked(i, 2, row[2]);
            mat_b.write_unchecked(i, 0, *target);
        }
    }
    let params = mat_a.qr().solve_lstsq(mat_b);
    let sol = params.col(0);

    let mut sum_sq = 0.0;
    for (row, target) in rows.iter().zip(&targets) {
        let predicted = sol[0] * row[0] + sol[1] * row[1] + sol[2] * row[2];
        let residual = predicted - target;
        sum_sq += residual * residual;
    }
    let cost = (sum_sq / rows.len() as f64).sqrt();
    if cost.is_finite() {
        cost
    } else {
        f64::INFINITY
    }
}

/// Refine a distortion center by minimizing the radial symmetry cost.
///
/// Sweeps a `spacing`-wide grid of candidates around `start`, then runs a
/// pattern search that halves its step whenever no neighbor improves. The
/// result never has a higher cost than `start`.
///
/// # Errors
///
/// Returns [`CalibError::InvalidGeometry`] when `spacing` or the search
/// configuration is not positive.
pub fn find_center_fine(
    hor: &LineSet,
    ver: &LineSet,
    start: &DistortionCenter,
    spacing: f64,
    config: &FineSearchConfig,
) -> Result<DistortionCenter, CalibError> {
    if !(spacing.is_finite() && spacing > 0.0) {
        return Err(CalibError::InvalidGeometry(format!(
            "dot spacing must be positive, got {spacing}"
        )));
    }
    if !(config.step.is_finite() && config.step > 0.0 && config.stop.is_finite() && config.stop > 0.0)
    {
        return Err(CalibError::InvalidGeometry(format!(
            "search steps must be positive, got step {} and stop {}",
            config.step, config.stop
        )));
    }

    // lines closer to the center than two spacings carry more centering
    // error than signal
    let min_intercept = 2.0 * spacing;
    let mut best = *start;
    let mut best_cost = symmetry_cost(hor, ver, start, min_intercept);

    let half = 0.5 * spacing;
    let mut dy = -half;
    while dy <= half + 1e-9 {
        let mut dx = -half;
        while dx <= half + 1e-9 {
            let candidate = DistortionCenter {
                x: start.x + dx,
                y: start.y + dy,
            };
            let cost = symmetry_cost(hor, ver, &candidate, min_intercept);
            if cost < best_cost {
                best = candidate;
                best_cost = cost;
            }
            dx += config.step;
        }
        dy += config.step;
    }

    const NEIGHBORS: [(f64, f64); 8] = [
        (-1.0, -1.0),
        (-1.0, 0.0),
        (-1.0, 1.0),
        (0.0, -1.0),
        (0.0, 1.0),
        (1.0, -1.0),
        (1.0, 0.0),
        (1.0, 1.0),
    ];
    let mut step = config.step;
    let mut iters = 0;
    while step > config.stop && iters < config.max_iters {
        let mut moved = false;
        for (nx, ny) in NEIGHBORS {
            let candidate = DistortionCenter {
                x: best.x + nx * step,
                y: best.y + ny * step,
            };
            let cost = symmetry_cost(hor, ver, &candidate, min_intercept);
            if cost < best_cost {
                best = candidate;
                best_cost = cost;
                moved = true;
            }
        }
        if !moved {
            step *= 0.5;
        }
        iters += 1;
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dot::Dot;
    use crate::line::{Direction, Line};
    use crate::model::{DistortionModel, ModelKind};

    fn truth_barrel() -> DistortionModel {
        DistortionModel {
            kind: ModelKind::Backward,
            coeffs: vec![1.0, 0.0, -4e-9, 0.0, -2e-15],
        }
    }

    fn distorted_grid(
        direction: Direction,
        truth: &DistortionModel,
        center: &DistortionCenter,
        grid: usize,
        pitch: f64,
    ) -> LineSet {
        let offset = 25.0;
        let lines = (0..grid)
            .map(|row| {
                let dots = (0..grid)
                    .map(|col| {
                        let (ix, iy) = match direction {
                            Direction::Horizontal => {
                                (offset + pitch * col as f64, offset + pitch * row as f64)
                            }
                            Direction::Vertical => {
                                (offset + pitch * row as f64, offset + pitch * col as f64)
                            }
                        };
                        let (x, y) = truth.warp_point(ix, iy, center);
                        Dot {
                            x,
                            y,
                            area: 4,
                            axis_ratio: 1.0,
                        }
                    })
                    .collect();
                Line {
                    index: row,
                    slope: 0.0,
                    dots,
                }
            })
            .collect();
        LineSet { direction, lines }
    }

    fn line_through(direction: Direction, slope: f64, offset: f64) -> Line {
        let dots = (0..5)
            .map(|i| {
                let u = 10.0 * i as f64;
                let v = slope * u + offset;
                let (x, y) = match direction {
                    Direction::Horizontal => (u, v),
                    Direction::Vertical => (v, u),
                };
                Dot {
                    x,
                    y,
                    area: 4,
                    axis_ratio: 1.0,
                }
            })
            .collect();
        Line {
            index: 0,
            slope,
            dots,
        }
    }

    #[test]
    fn coarse_center_of_a_symmetric_grid() {
        let truth = truth_barrel();
        let center = DistortionCenter { x: 605.0, y: 605.0 };
        let hor = distorted_grid(Direction::Horizontal, &truth, &center, 30, 40.0);
        let ver = distorted_grid(Direction::Vertical, &truth, &center, 30, 40.0);

        let coarse = find_center_coarse(&hor, &ver).unwrap();
        assert!((coarse.x - center.x).abs() < 0.1);
        assert!((coarse.y - center.y).abs() < 0.1);
    }

    #[test]
    fn coarse_center_needs_lines_to_fit() {
        let empty_hor = LineSet {
            direction: Direction::Horizontal,
            lines: Vec::new(),
        };
        let empty_ver = LineSet {
            direction: Direction::Vertical,
            lines: Vec::new(),
        };
        let result = find_center_coarse(&empty_hor, &empty_ver);
        assert!(matches!(
            result,
            Err(CalibError::DegenerateFit {
                constraints: 0,
                unknowns: 3
            })
        ));
    }

    #[test]
    fn coarse_center_rejects_parallel_axes() {
        // both axes at 45 degrees never intersect in a stable way
        let hor = LineSet {
            direction: Direction::Horizontal,
            lines: vec![
                line_through(Direction::Horizontal, 1.0, -20.0),
                line_through(Direction::Horizontal, 1.0, 0.0),
                line_through(Direction::Horizontal, 1.0, 20.0),
            ],
        };
        let ver = LineSet {
            direction: Direction::Vertical,
            lines: vec![
                line_through(Direction::Vertical, 1.0, -20.0),
                line_through(Direction::Vertical, 1.0, 0.0),
                line_through(Direction::Vertical, 1.0, 20.0),
            ],
        };
        let result = find_center_coarse(&hor, &ver);
        assert!(matches!(result, Err(CalibError::InvalidGeometry(_))));
    }

    #[test]
    fn fine_center_stays_near_the_truth() {
        let truth = truth_barrel();
        let center = DistortionCenter { x: 605.0, y: 605.0 };
        let hor = distorted_grid(Direction::Horizontal, &truth, &center, 30, 40.0);
        let ver = distorted_grid(Direction::Vertical, &truth, &center, 30, 40.0);

        let refined =
            find_center_fine(&hor, &ver, &center, 40.0, &FineSearchConfig::default()).unwrap();
        assert!((refined.x - center.x).abs() < 0.5);
        assert!((refined.y - center.y).abs() < 0.5);
    }

    #[test]
    fn fine_center_recovers_from_a_perturbed_start() {
        let truth = truth_barrel();
        let center = DistortionCenter { x: 605.0, y: 605.0 };
        let hor = distorted_grid(Direction::Horizontal, &truth, &center, 30, 40.0);
        let ver = distorted_grid(Direction::Vertical, &truth, &center, 30, 40.0);

        let start = DistortionCenter { x: 608.0, y: 606.5 };
        let refined =
            find_center_fine(&hor, &ver, &start, 40.0, &FineSearchConfig::default()).unwrap();
        assert!((refined.x - center.x).abs() < 1.0);
        assert!((refined.y - center.y).abs() < 1.0);
    }

    #[test]
    fn fine_center_returns_the_start_when_nothing_improves() {
        // two-dot lines cannot be fitted, every candidate costs infinity
        let hor = LineSet {
            direction: Direction::Horizontal,
            lines: vec![Line {
                index: 0,
                slope: 0.0,
                dots: vec![
                    Dot {
                        x: 0.0,
                        y: 0.0,
                        area: 4,
                        axis_ratio: 1.0,
                    },
                    Dot {
                        x: 10.0,
                        y: 0.0,
                        area: 4,
                        axis_ratio: 1.0,
                    },
                ],
            }],
        };
        let ver = LineSet {
            direction: Direction::Vertical,
            lines: Vec::new(),
        };

        let start = DistortionCenter { x: 5.0, y: 5.0 };
        let refined =
            find_center_fine(&hor, &ver, &start, 10.0, &FineSearchConfig::default()).unwrap();
        assert_eq!(refined, start);
    }

    #[test]
    fn fine_center_rejects_bad_parameters() {
        let hor = LineSet {
            direction: Direction::Horizontal,
            lines: Vec::new(),
        };
        let ver = LineSet {
            direction: Direction::Vertical,
            lines: Vec::new(),
        };
        let start = DistortionCenter { x: 0.0, y: 0.0 };

        let result = find_center_fine(&hor, &ver, &start, 0.0, &FineSearchConfig::default());
        assert!(matches!(result, Err(CalibError::InvalidGeometry(_))));

        let config = FineSearchConfig {
            step: -1.0,
            ..Default::default()
        };
        let result = find_center_fine(&hor, &ver, &start, 10.0, &config);
        assert!(matches!(result, Err(CalibError::InvalidGeometry(_))));
    }
}
