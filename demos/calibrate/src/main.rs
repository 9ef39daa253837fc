use argh::FromArgs;
use std::path::PathBuf;

use dotcal::calib::residual::LineResidual;
use dotcal::calib::unwarp::unwarp_image_backward;
use dotcal::calib::{calibrate, CalibConfig};
use dotcal::image::Image;
use dotcal::imgproc::interpolation::InterpolationMode;
use dotcal::io::{metadata, png};

#[derive(FromArgs)]
/// Calibrate radial distortion from a dot-target image and write the
/// corrected image together with the model coefficients.
struct Args {
    /// path to a grayscale PNG of the dot target
    #[argh(option, short = 'i')]
    image_path: PathBuf,

    /// directory for the corrected image and metadata
    #[argh(option, short = 'o')]
    output_dir: PathBuf,

    /// number of polynomial coefficients to fit
    #[argh(option, default = "5")]
    num_coef: usize,

    /// refine the distortion center with the symmetry search
    #[argh(switch)]
    refine_center: bool,
}

fn mean_residual(residuals: &[LineResidual]) -> f64 {
    if residuals.is_empty() {
        return 0.0;
    }
    residuals.iter().map(|r| r.mean_abs).sum::<f64>() / residuals.len() as f64
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    // read the dot-target image
    let image = png::read_image_png_as_f32(&args.image_path)?;
    println!(
        "loaded {} ({} x {})",
        args.image_path.display(),
        image.cols(),
        image.rows()
    );

    // fit the distortion model
    let config = CalibConfig {
        num_coef: args.num_coef,
        refine_center: args.refine_center,
        ..Default::default()
    };
    let calibration = calibrate(&image, &config)?;

    println!(
        "grid: {} horizontal and {} vertical lines, {:.1} px dot spacing",
        calibration.hor_lines.lines.len(),
        calibration.ver_lines.lines.len(),
        calibration.stats.dot_dist,
    );
    println!(
        "distortion center: ({:.2}, {:.2})",
        calibration.center.x, calibration.center.y
    );
    for (i, coef) in calibration.model.coeffs.iter().enumerate() {
        println!("factor{i} = {coef:e}");
    }
    println!(
        "mean line residual: {:.3} px before, {:.3} px after correction",
        mean_residual(&calibration.residual_before),
        mean_residual(&calibration.residual_after),
    );
    if !calibration.significant_distortion {
        println!("residuals are already below the distortion threshold; correction may be unnecessary");
    }

    // correct the image with the fitted backward model
    let mut corrected = Image::from_size_val(image.size(), 0.0f32)?;
    unwarp_image_backward(
        &image,
        &mut corrected,
        &calibration.model,
        &calibration.center,
        InterpolationMode::Bilinear,
    )?;

    // write the corrected image next to the model coefficients
    std::fs::create_dir_all(&args.output_dir)?;

    let corrected_u8 = Image::new(
        corrected.size(),
        corrected
            .into_vec()
            .into_iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect(),
    )?;
    let corrected_path = args.output_dir.join("corrected.png");
    png::write_image_png_mono8(&corrected_path, &corrected_u8)?;
    println!("wrote {}", corrected_path.display());

    let metadata_path = args.output_dir.join("coefficients.txt");
    metadata::save_metadata(&metadata_path, &calibration.center, &calibration.model)?;
    println!("wrote {}", metadata_path.display());

    Ok(())
}
