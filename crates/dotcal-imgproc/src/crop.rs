use dotcal_image::{Image, ImageError, ImageSize};
use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
};

/// Copy a rectangular region of an image into a smaller one.
///
/// The region size is taken from `dst` and must fit inside `src`.
///
/// # Arguments
///
/// * `src` - The source image.
/// * `dst` - The destination image, sized to the region.
/// * `x` - The column of the top-left corner of the region.
/// * `y` - The row of the top-left corner of the region.
///
/// # Examples
///
/// ```rust
/// use dotcal_image::{Image, ImageSize};
/// use dotcal_imgproc::crop::crop_image;
///
/// let image = Image::<_, 1>::new(ImageSize { width: 3, height: 4 }, vec![
///     0u8, 1, 2,
///     3u8, 4, 5,
///     6u8, 7, 8,
///     9u8, 10, 11,
/// ]).unwrap();
///
/// let mut region = Image::<_, 1>::from_size_val(ImageSize { width: 2, height: 2 }, 0u8).unwrap();
///
/// crop_image(&image, &mut region, 0, 1).unwrap();
///
/// assert_eq!(region.as_slice(), &[3u8, 4, 6, 7]);
/// ```
pub fn crop_image<T, const C: usize>(
    src: &Image<T, C>,
    dst: &mut Image<T, C>,
    x: usize,
    y: usize,
) -> Result<(), ImageError>
where
    T: Copy + Send + Sync,
{
    if x + dst.cols() > src.cols() || y + dst.rows() > src.rows() {
        return Err(ImageError::InvalidImageSize(
            dst.cols(),
            dst.rows(),
            src.cols(),
            src.rows(),
        ));
    }

    let row_len = dst.cols() * C;
    let src_stride = src.cols() * C;
    let src_slice = src.as_slice();

    dst.as_slice_mut()
        .par_chunks_exact_mut(row_len)
        .enumerate()
        .for_each(|(row, dst_row)| {
            let start = (y + row) * src_stride + x * C;
            dst_row.copy_from_slice(&src_slice[start..start + row_len]);
        });

    Ok(())
}

/// Compute a region of interest centered in an image.
///
/// The region covers `ratio` of each extent, clamped to at least one pixel.
///
/// # Arguments
///
/// * `size` - The size of the source image.
/// * `ratio` - The fraction of each extent to keep, in `(0, 1]`.
///
/// # Returns
///
/// The top-left corner and the size of the region.
pub fn centered_roi(size: ImageSize, ratio: f64) -> (usize, usize, ImageSize) {
    let roi_width = ((size.width as f64 * ratio).round() as usize)
        .clamp(1, size.width);
    let roi_height = ((size.height as f64 * ratio).round() as usize)
        .clamp(1, size.height);

    let x = (size.width - roi_width) / 2;
    let y = (size.height - roi_height) / 2;

    (
        x,
        y,
        ImageSize {
            width: roi_width,
            height: roi_height,
        },
    )
}
