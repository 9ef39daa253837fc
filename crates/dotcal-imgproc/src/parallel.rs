use rayon::prelude::*;

use dotcal_image::Image;

/// Run `f` over every pixel of `src` and `dst`, rows in parallel.
///
/// The callback receives the channel values of one source pixel and the
/// matching destination pixel.
pub fn par_iter_rows<T1, const C1: usize, T2, const C2: usize>(
    src: &Image<T1, C1>,
    dst: &mut Image<T2, C2>,
    f: impl Fn(&[T1], &mut [T2]) + Send + Sync,
) where
    T1: Clone + Send + Sync,
    T2: Clone + Send + Sync,
{
    let cols = src.cols();
    src.as_slice()
        .par_chunks_exact(C1 * cols)
        .zip(dst.as_slice_mut().par_chunks_exact_mut(C2 * cols))
        .for_each(|(src_row, dst_row)| {
            let pixels = src_row.chunks_exact(C1).zip(dst_row.chunks_exact_mut(C2));
            for (src_pixel, dst_pixel) in pixels {
                f(src_pixel, dst_pixel);
            }
        });
}

/// Run `f` over every channel value of `src` and `dst`, rows in parallel.
pub fn par_iter_rows_val<T1, const C1: usize, T2, const C2: usize>(
    src: &Image<T1, C1>,
    dst: &mut Image<T2, C2>,
    f: impl Fn(&T1, &mut T2) + Send + Sync,
) where
    T1: Clone + Send + Sync,
    T2: Clone + Send + Sync,
{
    let cols = src.cols();
    src.as_slice()
        .par_chunks_exact(C1 * cols)
        .zip(dst.as_slice_mut().par_chunks_exact_mut(C2 * cols))
        .for_each(|(src_row, dst_row)| {
            for (src_value, dst_value) in src_row.iter().zip(dst_row.iter_mut()) {
                f(src_value, dst_value);
            }
        });
}

/// Run `f` over every destination pixel and its sampling coordinates, rows in
/// parallel.
pub fn par_iter_rows_resample<const C: usize>(
    dst: &mut Image<f32, C>,
    map_x: &Image<f32, 1>,
    map_y: &Image<f32, 1>,
    f: impl Fn(&f32, &f32, &mut [f32]) + Send + Sync,
) {
    let cols = dst.cols();
    dst.as_slice_mut()
        .par_chunks_exact_mut(C * cols)
        .zip(map_x.as_slice().par_chunks_exact(cols))
        .zip(map_y.as_slice().par_chunks_exact(cols))
        .for_each(|((dst_row, map_x_row), map_y_row)| {
            let samples = dst_row
                .chunks_exact_mut(C)
                .zip(map_x_row.iter().zip(map_y_row.iter()));
            for (dst_pixel, (x, y)) in samples {
                f(x, y, dst_pixel);
            }
        });
}
