use dotcal_image::Image;

/// Sample an image at a fractional coordinate with bilinear weighting.
///
/// The sample blends the four pixels around `(u, v)` by their distance to the
/// coordinate. Coordinates outside the image are clamped to the border.
///
/// # Arguments
///
/// * `image` - The image to sample from.
/// * `u` - The x coordinate of the sample.
/// * `v` - The y coordinate of the sample.
///
/// # Returns
///
/// The blended pixel values.
pub(crate) fn bilinear_interpolation<const C: usize>(
    image: &Image<f32, C>,
    u: f32,
    v: f32,
) -> [f32; C] {
    let cols = image.cols();
    let rows = image.rows();

    let u = u.clamp(0.0, (cols - 1) as f32);
    let v = v.clamp(0.0, (rows - 1) as f32);

    let x0 = u.trunc() as usize;
    let y0 = v.trunc() as usize;
    let x1 = (x0 + 1).min(cols - 1);
    let y1 = (y0 + 1).min(rows - 1);

    let tx = u.fract();
    let ty = v.fract();

    let data = image.as_slice();
    let at = |y: usize, x: usize| {
        let base = (y * cols + x) * C;
        &data[base..base + C]
    };

    let top_left = at(y0, x0);
    let top_right = at(y0, x1);
    let bottom_left = at(y1, x0);
    let bottom_right = at(y1, x1);

    let mut pixel = [0.0; C];
    for (k, value) in pixel.iter_mut().enumerate() {
        let top = top_left[k] + (top_right[k] - top_left[k]) * tx;
        let bottom = bottom_left[k] + (bottom_right[k] - bottom_left[k]) * tx;
        *value = top + (bottom - top) * ty;
    }

    pixel
}
