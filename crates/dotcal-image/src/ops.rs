use crate::{Image, ImageError};

/// Cast the values of an image into another type, scaling each one.
///
/// Every value is converted to `U` first and then multiplied by `scale`, so
/// an integer image scales into unit-range floats with a `1.0 / max` factor.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `dst` - The destination image of the same size.
/// * `scale` - The factor applied after the cast.
///
/// Example:
///
/// ```
/// use dotcal_image::{Image, ImageSize};
/// use dotcal_image::ops::cast_and_scale;
///
/// let image = Image::<u8, 1>::new(
///     ImageSize {
///         width: 3,
///         height: 1,
///     },
///     vec![0, 3, 5],
/// ).unwrap();
///
/// let mut doubled = Image::from_size_val(image.size(), 0.0f32).unwrap();
///
/// cast_and_scale(&image, &mut doubled, 2.0).unwrap();
/// assert_eq!(doubled.as_slice(), [0.0, 6.0, 10.0]);
/// ```
pub fn cast_and_scale<T, U, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<U, C>,
    scale: U,
) -> Result<(), ImageError>
where
    T: Copy + num_traits::NumCast,
    U: Copy + num_traits::NumCast + std::ops::Mul<U, Output = U>,
{
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.width(),
            src.height(),
            dst.width(),
            dst.height(),
        ));
    }

    for (out, &value) in dst.as_slice_mut().iter_mut().zip(src.as_slice()) {
        let converted = U::from(value)
            .ok_or_else(|| ImageError::CastError(std::any::type_name::<U>().to_string()))?;
        *out = converted * scale;
    }

    Ok(())
}
