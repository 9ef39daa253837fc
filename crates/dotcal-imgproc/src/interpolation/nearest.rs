use dotcal_image::Image;

/// Sample an image at the pixel nearest to a fractional coordinate.
///
/// Coordinates outside the image are clamped to the border.
///
/// # Arguments
///
/// * `image` - The image to sample from.
/// * `u` - The x coordinate of the sample.
/// * `v` - The y coordinate of the sample.
///
/// # Returns
///
/// The values of the nearest pixel.
pub(crate) fn nearest_neighbor_interpolation<const C: usize>(
    image: &Image<f32, C>,
    u: f32,
    v: f32,
) -> [f32; C] {
    let cols = image.cols();
    let rows = image.rows();

    let x = u.round().clamp(0.0, (cols - 1) as f32) as usize;
    let y = v.round().clamp(0.0, (rows - 1) as f32) as usize;

    let base = (y * cols + x) * C;

    let mut pixel = [0.0; C];
    pixel.copy_from_slice(&image.as_slice()[base..base + C]);

    pixel
}

#[cfg(test)]
mod tests {
    use dotcal_image::{Image, ImageError, ImageSize};

    #[test]
    fn test_nearest() -> Result<(), ImageError> {
        let image = Image::<f32, 1>::new(
            ImageSize {
                width: 2,
                height: 2,
            },
            vec![0.0, 1.0, 2.0, 3.0],
        )?;

        assert_eq!(super::nearest_neighbor_interpolation(&image, 0.4, 0.4), [0.0]);
        assert_eq!(super::nearest_neighbor_interpolation(&image, 0.6, 0.6), [3.0]);
        assert_eq!(super::nearest_neighbor_interpolation(&image, 9.0, 0.0), [1.0]);

        Ok(())
    }
}
