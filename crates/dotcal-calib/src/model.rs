use crate::center::DistortionCenter;

/// Mapping direction of a polynomial radial distortion model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// The factor is evaluated at the undistorted radius and maps it back
    /// into the distorted image.
    Backward,
    /// The factor is evaluated at the distorted radius and maps it into the
    /// undistorted image.
    Forward,
}

/// Polynomial radial distortion model about a distortion center.
///
/// The radius mapping is `r' = r · (c0 + c1·r + c2·r² + …)` where the
/// direction of the mapping depends on [`ModelKind`].
///
/// # Examples
///
/// ```
/// use dotcal_calib::model::{DistortionModel, ModelKind};
///
/// let model = DistortionModel {
///     kind: ModelKind::Backward,
///     coeffs: vec![1.0, 0.0, -4e-9],
/// };
///
/// // barrel distortion pulls radii inward
/// assert!(model.map_radius(500.0) < 500.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DistortionModel {
    /// Mapping direction of the model.
    pub kind: ModelKind,
    /// Polynomial coefficients, lowest order first.
    pub coeffs: Vec<f64>,
}

impl DistortionModel {
    /// Scale factor `c0 + c1·r + c2·r² + …` at radius `r`.
    pub fn factor(&self, r: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * r + c)
    }

    fn factor_derivative(&self, r: f64) -> f64 {
        let mut acc = 0.0;
        for (i, &c) in self.coeffs.iter().enumerate().skip(1).rev() {
            acc = acc * r + i as f64 * c;
        }
        acc
    }

    /// Mapped radius `r · factor(r)`.
    pub fn map_radius(&self, r: f64) -> f64 {
        r * self.factor(r)
    }

    /// Solve `r · factor(r) = r_mapped` for `r` with Newton's method.
    ///
    /// Seeded at `r_mapped`, capped at 20 iterations, tolerance 1e-10 px.
    pub fn invert_radius(&self, r_mapped: f64) -> f64 {
        const MAX_ITERS: usize = 20;
        const TOL: f64 = 1e-10;

        let mut r = r_mapped;
        for _ in 0..MAX_ITERS {
            let fact = self.factor(r);
            let slope = fact + r * self.factor_derivative(r);
            if !slope.is_finite() || slope.abs() < 1e-12 {
                break;
            }
            let step = (r * fact - r_mapped) / slope;
            r -= step;
            if step.abs() < TOL {
                break;
            }
        }
        r
    }

    /// Apply the natural radius mapping to a point about a center.
    pub fn warp_point(&self, x: f64, y: f64, center: &DistortionCenter) -> (f64, f64) {
        let (dx, dy) = (x - center.x, y - center.y);
        let fact = self.factor(dx.hypot(dy));
        (center.x + fact * dx, center.y + fact * dy)
    }

    /// Apply the inverse radius mapping to a point about a center.
    pub fn unwarp_point(&self, x: f64, y: f64, center: &DistortionCenter) -> (f64, f64) {
        let (dx, dy) = (x - center.x, y - center.y);
        let r = dx.hypot(dy);
        if r < f64::EPSILON {
            return (x, y);
        }
        let scale = self.invert_radius(r) / r;
        (center.x + scale * dx, center.y + scale * dy)
    }

    /// Check that the radius mapping increases strictly over `(0, max_radius]`.
    ///
    /// Sampled at 1024 uniform radii. Advisory only; a non-monotonic model is
    /// usable but inaccurate near the folds.
    pub fn is_monotonic(&self, max_radius: f64) -> bool {
        const SAMPLES: usize = 1024;

        if !(max_radius > 0.0) {
            return false;
        }
        let mut prev = 0.0;
        for i in 1..=SAMPLES {
            let r = max_radius * i as f64 / SAMPLES as f64;
            let mapped = self.map_radius(r);
            if !(mapped.is_finite() && mapped > prev) {
                return false;
            }
            prev = mapped;
        }
        true
    }
}
