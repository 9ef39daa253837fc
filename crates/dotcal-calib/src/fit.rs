use faer::prelude::SpSolverLstsq;

use crate::center::DistortionCenter;
use crate::dot::{median, Dot};
use crate::error::CalibError;
use crate::line::{Direction, LineSet};
use crate::model::{DistortionModel, ModelKind};

/// Lines on each side of the anchor used to estimate the undistorted spacing.
const INTERCEPT_WINDOW: usize = 4;
/// Intercept magnitude below which a line cannot constrain the radial scale.
const MIN_INTERCEPT: f64 = 1.0;
/// Perpendicular distance below which a dot's scale is numerically unstable.
const MIN_DENOMINATOR: f64 = 1.0;
/// Samples of the forward curve used for numeric inversion.
const INVERSION_SAMPLES: usize = 1000;

/// Quadratic fit `v = a·u² + b·u + c` in center-relative coordinates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Parabola {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

/// Least-squares parabola through a line's dots, relative to a center.
pub(crate) fn parabola_fit(
    dots: &[Dot],
    direction: Direction,
    center: &DistortionCenter,
) -> Option<Parabola> {
    if dots.len() < 3 {
        return None;
    }

    let (cu, cv) = direction.split_center(center);
    let mut mat_a = faer::Mat::<f64>::zeros(dots.len(), 3);
    let mut mat_b = faer::Mat::<f64>::zeros(dots.len(), 1);
    for (i, dot) in dots.iter().enumerate() {
        let (u, v) = direction.split(dot);
        let (u, v) = (u - cu, v - cv);
        unsafe {
            mat_a.write_unchecked(i, 0, u * u);
            mat_a.write_unchecked(i, 1, u);
            mat_a.write_unchecked(i, 2, 1.0);
            mat_b.write_unchecked(i, 0, v);
        }
    }

    let params = mat_a.qr().solve_lstsq(mat_b);
    let sol = params.col(0);
    let para = Parabola {
        a: sol[0],
        b: sol[1],
        c: sol[2],
    };
    (para.a.is_finite() && para.b.is_finite() && para.c.is_finite()).then_some(para)
}

/// Closed-form least-squares slope and intercept of `v` against `u`.
pub(crate) fn linear_fit(us: &[f64], vs: &[f64]) -> Option<(f64, f64)> {
    let n = us.len().min(vs.len());
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let su: f64 = us[..n].iter().sum();
    let sv: f64 = vs[..n].iter().sum();
    let suu: f64 = us[..n].iter().map(|u| u * u).sum();
    let suv: f64 = us[..n].iter().zip(&vs[..n]).map(|(u, v)| u * v).sum();
    let den = nf * suu - su * su;
    if den.abs() <= 1e-12 * nf * suu.abs().max(1.0) {
        return None;
    }
    let slope = (nf * suv - su * sv) / den;
    Some((slope, (sv - slope * su) / nf))
}

/// Undistorted intercept for every line from grid regularity.
///
/// The line closest to the center anchors the grid; the undistorted spacing
/// is the median adjacent-intercept gap over a window of lines around the
/// anchor, where distortion is weakest. Each line gets an integer grid index
/// by rounding, and a linear fit of intercept against index over the central
/// window predicts the undistorted intercepts.
pub(crate) fn ideal_intercepts(intercepts: &[f64]) -> Result<Vec<f64>, CalibError> {
    let count = intercepts.len();
    if count < 2 {
        return Err(CalibError::DegenerateFit {
            constraints: count,
            unknowns: 2,
        });
    }

    let mut order: Vec<usize> = (0..count).collect();
    order.sort_by(|&i, &j| intercepts[i].total_cmp(&intercepts[j]));
    let sorted: Vec<f64> = order.iter().map(|&i| intercepts[i]).collect();

    let mut anchor = 0;
    for (k, c) in sorted.iter().enumerate() {
        if c.abs() < sorted[anchor].abs() {
            anchor = k;
        }
    }
    let c_anchor = sorted[anchor];

    let lo = anchor.saturating_sub(INTERCEPT_WINDOW);
    let hi = (anchor + INTERCEPT_WINDOW + 1).min(count);
    let mut gaps: Vec<f64> = sorted[lo..hi].windows(2).map(|w| w[1] - w[0]).collect();
    let spacing = median(&mut gaps).unwrap_or_default();
    if !(spacing.is_finite() && spacing.abs() > 1e-6) {
        return Err(CalibError::InvalidGeometry(
            "grid line spacing collapsed while estimating undistorted intercepts".to_string(),
        ));
    }

    let indices: Vec<f64> = sorted
        .iter()
        .map(|c| ((c - c_anchor) / spacing).round())
        .collect();
    let mut fit_idx = Vec::new();
    let mut fit_c = Vec::new();
    for (k, &idx) in indices.iter().enumerate() {
        if idx.abs() <= INTERCEPT_WINDOW as f64 {
            fit_idx.push(idx);
            fit_c.push(sorted[k]);
        }
    }
    let Some((slope, offset)) = linear_fit(&fit_idx, &fit_c) else {
        return Err(CalibError::DegenerateFit {
            constraints: fit_idx.len(),
            unknowns: 2,
        });
    };

    let mut ideal = vec![0.0; count];
    for (k, &idx) in indices.iter().enumerate() {
        ideal[order[k]] = offset + slope * idx;
    }
    Ok(ideal)
}

/// One dot's contribution to the radial scale fit.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScaleSample {
    /// Measured radius about the center.
    pub rd: f64,
    /// Radius after applying the per-dot scale.
    pub ru: f64,
    /// Scale that lands the dot on its line's undistorted straight line.
    pub t: f64,
}

/// Collect per-dot radial scale samples from one line set.
///
/// Every usable line contributes `t = uc / (v − b·u)` per dot, the radial
/// scale that moves the dot onto the straight line `v = b·u + uc` predicted
/// by grid regularity. Lines closer to the center than `min_intercept` and
/// dots with tiny perpendicular distance are skipped.
pub(crate) fn collect_scale_samples(
    set: &LineSet,
    center: &DistortionCenter,
    min_intercept: f64,
    samples: &mut Vec<ScaleSample>,
) -> Result<(), CalibError> {
    let mut fitted = Vec::with_capacity(set.lines.len());
    for line in &set.lines {
        if let Some(para) = parabola_fit(&line.dots, set.direction, center) {
            fitted.push((line, para));
        }
    }
    if fitted.len() < 2 {
        return Err(CalibError::DegenerateFit {
            constraints: fitted.len(),
            unknowns: 2,
        });
    }

    let intercepts: Vec<f64> = fitted.iter().map(|(_, para)| para.c).collect();
    let ideal = ideal_intercepts(&intercepts)?;

    for ((line, para), &uc) in fitted.iter().zip(&ideal) {
        if uc.abs() < min_intercept {
            continue;
        }
        for dot in &line.dots {
            let (dx, dy) = (dot.x - center.x, dot.y - center.y);
            let denom = match set.direction {
                Direction::Horizontal => dy - para.b * dx,
                Direction::Vertical => dx - para.b * dy,
            };
            if denom.abs() < MIN_DENOMINATOR {
                continue;
            }
            let t = uc / denom;
            if !(t.is_finite() && t > 0.0) {
                continue;
            }
            let rd = dx.hypot(dy);
            samples.push(ScaleSample { rd, ru: t * rd, t });
        }
    }
    Ok(())
}

/// Solve the stacked polynomial system for one mapping direction.
fn solve_factor(
    samples: &[ScaleSample],
    kind: ModelKind,
    num_coef: usize,
) -> Result<DistortionModel, CalibError> {
    if num_coef == 0 {
        return Err(CalibError::InvalidGeometry(
            "a distortion model needs at least one coefficient".to_string(),
        ));
    }
    if samples.len() < num_coef {
        return Err(CalibError::DegenerateFit {
            constraints: samples.len(),
            unknowns: num_coef,
        });
    }

    let radius = |sample: &ScaleSample| match kind {
        ModelKind::Backward => sample.ru,
        ModelKind::Forward => sample.rd,
    };
    let r_norm = samples.iter().map(|s| radius(s)).fold(0.0_f64, f64::max);
    if !(r_norm > 0.0) {
        return Err(CalibError::InvalidGeometry(
            "all scale samples collapse onto the distortion center".to_string(),
        ));
    }

    // columns are normalized radius powers to keep the system well conditioned
    let mut mat_a = faer::Mat::<f64>::zeros(samples.len(), num_coef);
    let mut mat_b = faer::Mat::<f64>::zeros(samples.len(), 1);
    for (i, sample) in samples.iter().enumerate() {
        let x = radius(sample) / r_norm;
        let target = match kind {
            ModelKind::Backward => 1.0 / sample.t,
            ModelKind::Forward => sample.t,
        };
        let mut power = 1.0;
        for j in 0..num_coef {
            unsafe {
                mat_a.write_unchecked(i, j, power);
            }
            power *= x;
        }
        unsafe {
            mat_b.write_unchecked(i, 0, target);
        }
    }

    let params = mat_a.qr().solve_lstsq(mat_b);
    let sol = params.col(0);

    let mut coeffs = Vec::with_capacity(num_coef);
    let mut scale = 1.0;
    for j in 0..num_coef {
        let coef = sol[j] / scale;
        if !coef.is_finite() {
            return Err(CalibError::DegenerateFit {
                constraints: samples.len(),
                unknowns: num_coef,
            });
        }
        coeffs.push(coef);
        scale *= r_norm;
    }

    Ok(DistortionModel { kind, coeffs })
}

/// Fit a backward distortion model from grouped lines.
///
/// Stacks the line-straightening constraint `Σ_j k_j·r_u^j = 1/t` over every
/// usable dot of both directions and solves the least-squares system in one
/// pass.
///
/// # Errors
///
/// Returns [`CalibError::DegenerateFit`] when fewer than `num_coef` usable
/// constraints are available or the solution is not finite.
pub fn fit_backward(
    hor: &LineSet,
    ver: &LineSet,
    center: &DistortionCenter,
    num_coef: usize,
) -> Result<DistortionModel, CalibError> {
    let mut samples = Vec::new();
    collect_scale_samples(hor, center, MIN_INTERCEPT, &mut samples)?;
    collect_scale_samples(ver, center, MIN_INTERCEPT, &mut samples)?;
    solve_factor(&samples, ModelKind::Backward, num_coef)
}

/// Fit a forward distortion model from grouped lines.
///
/// Same samples as [`fit_backward`] with the dual constraint
/// `Σ_j k_j·r_d^j = t`.
pub fn fit_forward(
    hor: &LineSet,
    ver: &LineSet,
    center: &DistortionCenter,
    num_coef: usize,
) -> Result<DistortionModel, CalibError> {
    let mut samples = Vec::new();
    collect_scale_samples(hor, center, MIN_INTERCEPT, &mut samples)?;
    collect_scale_samples(ver, center, MIN_INTERCEPT, &mut samples)?;
    solve_factor(&samples, ModelKind::Forward, num_coef)
}

/// Fit a forward model, then derive its backward counterpart numerically.
///
/// The forward radius map is sampled at 1000 uniform radii over the measured
/// range and a backward polynomial is least-squares fitted to the inverse
/// samples. Polynomial inversion has no closed form beyond low degree, so
/// the inversion is numeric by construction.
pub fn fit_backward_from_forward(
    hor: &LineSet,
    ver: &LineSet,
    center: &DistortionCenter,
    num_coef: usize,
) -> Result<(DistortionModel, DistortionModel), CalibError> {
    let mut samples = Vec::new();
    collect_scale_samples(hor, center, MIN_INTERCEPT, &mut samples)?;
    collect_scale_samples(ver, center, MIN_INTERCEPT, &mut samples)?;
    let forward = solve_factor(&samples, ModelKind::Forward, num_coef)?;

    let r_max = samples.iter().map(|s| s.rd).fold(0.0_f64, f64::max);
    let mut inverse = Vec::with_capacity(INVERSION_SAMPLES);
    for i in 1..=INVERSION_SAMPLES {
        let rd = r_max * i as f64 / INVERSION_SAMPLES as f64;
        let t = forward.factor(rd);
        if !(t.is_finite() && t > 0.0) {
            continue;
        }
        inverse.push(ScaleSample { rd, ru: rd * t, t });
    }
    let backward = solve_factor(&inverse, ModelKind::Backward, num_coef)?;

    Ok((forward, backward))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::Line;

    fn truth_barrel() -> DistortionModel {
        DistortionModel {
            kind: ModelKind::Backward,
            coeffs: vec![1.0, 0.0, -4e-9, 0.0, -2e-15],
        }
    }

    fn truth_pincushion() -> DistortionModel {
        DistortionModel {
            kind: ModelKind::Backward,
            coeffs: vec![1.0, 0.0, 4e-9, 0.0, 3e-15],
        }
    }

    fn test_center() -> DistortionCenter {
        DistortionCenter {
            x: 1000.0,
            y: 1000.0,
        }
    }

    /// Grid lines distorted by the natural map of a backward truth model.
    fn synthetic_set(
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

    #[test]
    fn ideal_intercepts_pass_straight_grid_through() {
        let intercepts = [-200.0, -100.0, 0.0, 100.0, 200.0];
        let ideal = ideal_intercepts(&intercepts).unwrap();
        for (got, want) in ideal.iter().zip(&intercepts) {
            approx::assert_abs_diff_eq!(got, want, epsilon = 1e-9);
        }
    }

    #[test]
    fn ideal_intercepts_regularize_a_warped_grid() {
        let intercepts = [-204.0, -101.0, 0.0, 101.0, 204.0];
        let ideal = ideal_intercepts(&intercepts).unwrap();
        let expected = [-203.6, -101.8, 0.0, 101.8, 203.6];
        for (got, want) in ideal.iter().zip(&expected) {
            approx::assert_abs_diff_eq!(got, want, epsilon = 1e-9);
        }
    }

    #[test]
    fn ideal_intercepts_reject_collapsed_spacing() {
        let result = ideal_intercepts(&[5.0, 5.0]);
        assert!(matches!(result, Err(CalibError::InvalidGeometry(_))));
    }

    #[test]
    fn scale_samples_expand_a_barrel_grid() {
        let truth = truth_barrel();
        let center = test_center();
        let set = synthetic_set(Direction::Horizontal, &truth, &center, 40, 50.0);

        let mut samples = Vec::new();
        collect_scale_samples(&set, &center, MIN_INTERCEPT, &mut samples).unwrap();

        assert!(samples.len() > 1000);
        for sample in &samples {
            // barrel compression undoes with scales slightly above one
            assert!(sample.t > 0.95 && sample.t < 1.1);
            approx::assert_relative_eq!(sample.ru, sample.t * sample.rd, epsilon = 1e-12);
        }
    }

    #[test]
    fn backward_fit_recovers_barrel_coefficients() {
        let truth = truth_barrel();
        let center = test_center();
        let hor = synthetic_set(Direction::Horizontal, &truth, &center, 40, 50.0);
        let ver = synthetic_set(Direction::Vertical, &truth, &center, 40, 50.0);

        let model = fit_backward(&hor, &ver, &center, 5).unwrap();
        assert_eq!(model.kind, ModelKind::Backward);
        approx::assert_relative_eq!(model.coeffs[0], 1.0, max_relative = 1e-3);
        approx::assert_relative_eq!(model.coeffs[2], -4e-9, max_relative = 0.01);
        approx::assert_relative_eq!(model.coeffs[4], -2e-15, max_relative = 0.01);

        for i in 1..=28 {
            let r = 50.0 * i as f64;
            assert!((model.map_radius(r) - truth.map_radius(r)).abs() < 0.1);
        }
    }

    #[test]
    fn backward_fit_recovers_pincushion_coefficients() {
        let truth = truth_pincushion();
        let center = test_center();
        let hor = synthetic_set(Direction::Horizontal, &truth, &center, 40, 50.0);
        let ver = synthetic_set(Direction::Vertical, &truth, &center, 40, 50.0);

        let model = fit_backward(&hor, &ver, &center, 5).unwrap();
        approx::assert_relative_eq!(model.coeffs[2], 4e-9, max_relative = 0.01);
        approx::assert_relative_eq!(model.coeffs[4], 3e-15, max_relative = 0.01);
    }

    #[test]
    fn forward_fit_straightens_distorted_radii() {
        let truth = truth_barrel();
        let center = test_center();
        let hor = synthetic_set(Direction::Horizontal, &truth, &center, 40, 50.0);
        let ver = synthetic_set(Direction::Vertical, &truth, &center, 40, 50.0);

        let forward = fit_forward(&hor, &ver, &center, 5).unwrap();
        assert_eq!(forward.kind, ModelKind::Forward);

        for (ix, iy) in [(25.0, 25.0), (25.0, 1000.0), (525.0, 775.0)] {
            let ru_true = (ix - center.x).hypot(iy - center.y);
            let (dx, dy) = truth.warp_point(ix, iy, &center);
            let rd = (dx - center.x).hypot(dy - center.y);
            assert!((forward.map_radius(rd) - ru_true).abs() < 0.1);
        }
    }

    #[test]
    fn numeric_inversion_matches_the_forward_model() {
        let truth = truth_pincushion();
        let center = test_center();
        let hor = synthetic_set(Direction::Horizontal, &truth, &center, 40, 50.0);
        let ver = synthetic_set(Direction::Vertical, &truth, &center, 40, 50.0);

        let (forward, backward) = fit_backward_from_forward(&hor, &ver, &center, 5).unwrap();
        assert_eq!(forward.kind, ModelKind::Forward);
        assert_eq!(backward.kind, ModelKind::Backward);

        // composing the backward natural map over the forward correction
        // returns the measured positions
        for line in hor.lines.iter().step_by(7) {
            for dot in line.dots.iter().step_by(7) {
                let (ux, uy) = forward.warp_point(dot.x, dot.y, &center);
                let (bx, by) = backward.warp_point(ux, uy, &center);
                assert!((bx - dot.x).hypot(by - dot.y) < 0.15);
            }
        }
    }

    #[test]
    fn fit_needs_at_least_two_lines_per_direction() {
        let truth = truth_barrel();
        let center = test_center();
        let mut hor = synthetic_set(Direction::Horizontal, &truth, &center, 5, 50.0);
        hor.lines.truncate(1);
        let ver = synthetic_set(Direction::Vertical, &truth, &center, 5, 50.0);

        let result = fit_backward(&hor, &ver, &center, 3);
        assert!(matches!(
            result,
            Err(CalibError::DegenerateFit {
                constraints: 1,
                unknowns: 2
            })
        ));
    }

    #[test]
    fn fit_rejects_more_unknowns_than_constraints() {
        let truth = truth_barrel();
        let center = test_center();
        let hor = synthetic_set(Direction::Horizontal, &truth, &center, 5, 50.0);
        let ver = synthetic_set(Direction::Vertical, &truth, &center, 5, 50.0);

        let result = fit_backward(&hor, &ver, &center, 200);
        assert!(matches!(result, Err(CalibError::DegenerateFit { .. })));
    }

    #[test]
    fn fit_rejects_an_empty_model() {
        let truth = truth_barrel();
        let center = test_center();
        let hor = synthetic_set(Direction::Horizontal, &truth, &center, 5, 50.0);
        let ver = synthetic_set(Direction::Vertical, &truth, &center, 5, 50.0);

        let result = fit_backward(&hor, &ver, &center, 0);
        assert!(matches!(result, Err(CalibError::InvalidGeometry(_))));
    }
}
