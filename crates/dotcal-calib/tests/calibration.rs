use dotcal_calib::center::DistortionCenter;
use dotcal_calib::fit::fit_backward_from_forward;
use dotcal_calib::model::{DistortionModel, ModelKind};
use dotcal_calib::unwarp::{unwarp_image_backward, unwarp_image_forward};
use dotcal_calib::{calibrate, CalibConfig};
use dotcal_image::{Image, ImageSize};
use dotcal_imgproc::interpolation::InterpolationMode;

/// Render a dot grid displaced by the natural map of a backward model.
///
/// Dots are dark antialiased disks on a bright background, like a
/// radiograph of a dot calibration target.
fn render_target(
    size: usize,
    grid: usize,
    pitch: f64,
    dot_radius: f64,
    truth: &DistortionModel,
    center: &DistortionCenter,
) -> Image<f32, 1> {
    let background = 0.9f32;
    let ink = 0.05f32;
    let image_size = ImageSize {
        width: size,
        height: size,
    };
    let mut image = Image::from_size_val(image_size, background).unwrap();

    let offset = 25.0;
    for row in 0..grid {
        for col in 0..grid {
            let ix = offset + pitch * col as f64;
            let iy = offset + pitch * row as f64;
            let (cx, cy) = truth.warp_point(ix, iy, center);

            let x_lo = (cx - dot_radius - 1.0).floor().max(0.0) as usize;
            let x_hi = (cx + dot_radius + 1.0).ceil().min((size - 1) as f64) as usize;
            let y_lo = (cy - dot_radius - 1.0).floor().max(0.0) as usize;
            let y_hi = (cy + dot_radius + 1.0).ceil().min((size - 1) as f64) as usize;
            for y in y_lo..=y_hi {
                for x in x_lo..=x_hi {
                    let dist = (x as f64 - cx).hypot(y as f64 - cy);
                    let coverage = (dot_radius + 0.5 - dist).clamp(0.0, 1.0) as f32;
                    if coverage > 0.0 {
                        let value = background - (background - ink) * coverage;
                        image.set_pixel(x, y, 0, value).unwrap();
                    }
                }
            }
        }
    }
    image
}

fn barrel_truth() -> DistortionModel {
    DistortionModel {
        kind: ModelKind::Backward,
        coeffs: vec![1.0, 0.0, -4e-9, 0.0, -2e-15],
    }
}

fn small_truth() -> DistortionModel {
    DistortionModel {
        kind: ModelKind::Backward,
        coeffs: vec![1.0, 0.0, -4e-8, 0.0, -2e-13],
    }
}

#[test]
fn full_pipeline_recovers_a_barrel_model() {
    let truth = barrel_truth();
    let center = DistortionCenter {
        x: 1000.0,
        y: 1000.0,
    };
    let image = render_target(2000, 40, 50.0, 12.0, &truth, &center);

    let config = CalibConfig {
        normalize_background: false,
        ..Default::default()
    };
    let calibration = calibrate(&image, &config).unwrap();

    assert!(
        (calibration.center.x - center.x).abs() < 1.0,
        "center x off by {}",
        (calibration.center.x - center.x).abs()
    );
    assert!(
        (calibration.center.y - center.y).abs() < 1.0,
        "center y off by {}",
        (calibration.center.y - center.y).abs()
    );

    assert_eq!(calibration.model.kind, ModelKind::Backward);
    assert_eq!(calibration.hor_lines.lines.len(), 40);
    assert_eq!(calibration.ver_lines.lines.len(), 40);
    assert_eq!(calibration.hor_lines.dot_count(), 1600);
    assert_eq!(calibration.ver_lines.dot_count(), 1600);

    let worst_before = calibration
        .residual_before
        .iter()
        .map(|r| r.max_abs)
        .fold(0.0, f64::max);
    assert!(
        worst_before > 1.0,
        "expected visible curvature, worst residual {worst_before}"
    );
    assert!(calibration.significant_distortion);

    // the fitted radius map agrees with the truth across the frame
    for i in 1..=14 {
        let r = 100.0 * i as f64;
        let diff = (calibration.model.map_radius(r) - truth.map_radius(r)).abs();
        assert!(diff < 0.3, "radius {r}: displacement differs by {diff}");
    }
    assert!(calibration.model.is_monotonic(1414.0));

    let mean_after = calibration
        .residual_after
        .iter()
        .map(|r| r.mean_abs)
        .sum::<f64>()
        / calibration.residual_after.len() as f64;
    assert!(
        mean_after < 0.2,
        "mean residual after correction {mean_after}"
    );
}

#[test]
fn forward_and_backward_models_agree() {
    let truth = small_truth();
    let center = DistortionCenter { x: 300.0, y: 300.0 };
    let image = render_target(600, 12, 50.0, 12.0, &truth, &center);

    let config = CalibConfig {
        normalize_background: false,
        ..Default::default()
    };
    let calibration = calibrate(&image, &config).unwrap();

    let (forward, backward) = fit_backward_from_forward(
        &calibration.hor_lines,
        &calibration.ver_lines,
        &calibration.center,
        config.num_coef,
    )
    .unwrap();
    assert_eq!(forward.kind, ModelKind::Forward);
    assert_eq!(backward.kind, ModelKind::Backward);

    // correcting a radius with the forward model and re-distorting it with
    // the backward model is a round trip
    for r in [100.0, 200.0, 300.0, 400.0] {
        let ru = forward.map_radius(r);
        let rd = backward.map_radius(ru);
        assert!((rd - r).abs() < 0.15, "radius {r} round trips to {rd}");
    }
}

#[test]
fn corrected_image_restores_the_ideal_grid() {
    let truth = small_truth();
    let center = DistortionCenter { x: 300.0, y: 300.0 };
    let image = render_target(600, 12, 50.0, 12.0, &truth, &center);

    let config = CalibConfig {
        normalize_background: false,
        ..Default::default()
    };
    let calibration = calibrate(&image, &config).unwrap();

    let mut corrected = Image::from_size_val(image.size(), 0.0f32).unwrap();
    unwarp_image_backward(
        &image,
        &mut corrected,
        &calibration.model,
        &calibration.center,
        InterpolationMode::Bilinear,
    )
    .unwrap();

    // ink lands back on the ideal grid nodes, background stays bright
    for (col, row) in [(0, 0), (11, 11), (0, 11), (6, 3)] {
        let x = 25 + 50 * col;
        let y = 25 + 50 * row;
        let value = *corrected.get_pixel(x, y, 0).unwrap();
        assert!(value < 0.5, "expected ink at ({x}, {y}), got {value}");
    }
    let gap = *corrected.get_pixel(50, 50, 0).unwrap();
    assert!(gap > 0.7, "expected background between dots, got {gap}");

    let (forward, _) = fit_backward_from_forward(
        &calibration.hor_lines,
        &calibration.ver_lines,
        &calibration.center,
        config.num_coef,
    )
    .unwrap();
    let mut scattered = Image::from_size_val(image.size(), 0.0f32).unwrap();
    let report =
        unwarp_image_forward(&image, &mut scattered, &forward, &calibration.center).unwrap();
    assert!(
        report.coverage() > 0.99,
        "forward scatter covered {:.4} of the frame",
        report.coverage()
    );
}

#[test]
fn repeated_runs_are_identical() {
    let truth = small_truth();
    let center = DistortionCenter { x: 300.0, y: 300.0 };
    let image = render_target(600, 12, 50.0, 12.0, &truth, &center);

    let config = CalibConfig {
        normalize_background: false,
        ..Default::default()
    };
    let first = calibrate(&image, &config).unwrap();
    let second = calibrate(&image, &config).unwrap();

    assert_eq!(first.hor_lines, second.hor_lines);
    assert_eq!(first.ver_lines, second.ver_lines);
    assert_eq!(first.center, second.center);
    assert_eq!(first.model, second.model);
}
