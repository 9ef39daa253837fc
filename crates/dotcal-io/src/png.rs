use std::{fs::File, path::Path};

use dotcal_image::{Image, ImageSize};
use png::{BitDepth, ColorType, Decoder, Encoder};

use crate::error::IoError;

/// Read an 8-bit grayscale PNG into an image.
///
/// # Errors
///
/// Fails when the file is missing, is not a PNG, or does not hold 8-bit
/// grayscale samples.
pub fn read_image_png_mono8(file_path: impl AsRef<Path>) -> Result<Image<u8, 1>, IoError> {
    let (buf, size, color, depth) = read_png_impl(file_path)?;
    if color != ColorType::Grayscale || depth != BitDepth::Eight {
        return Err(IoError::PngDecodeError(format!(
            "expected an 8-bit grayscale image, got {color:?} at {depth:?}"
        )));
    }
    Ok(Image::new(size, buf)?)
}

/// Read a 16-bit grayscale PNG into an image.
///
/// # Errors
///
/// Fails when the file is missing, is not a PNG, or does not hold 16-bit
/// grayscale samples.
pub fn read_image_png_mono16(file_path: impl AsRef<Path>) -> Result<Image<u16, 1>, IoError> {
    let (buf, size, color, depth) = read_png_impl(file_path)?;
    if color != ColorType::Grayscale || depth != BitDepth::Sixteen {
        return Err(IoError::PngDecodeError(format!(
            "expected a 16-bit grayscale image, got {color:?} at {depth:?}"
        )));
    }
    Ok(Image::new(size, unpack_be_u16(&buf))?)
}

/// Read a grayscale PNG of either bit depth and scale it into `[0, 1]`.
///
/// # Returns
///
/// A grayscale image with a single `f32` channel, black at 0 and white at 1.
pub fn read_image_png_as_f32(file_path: impl AsRef<Path>) -> Result<Image<f32, 1>, IoError> {
    let (buf, size, color, depth) = read_png_impl(file_path)?;
    if color != ColorType::Grayscale {
        return Err(IoError::PngDecodeError(format!(
            "expected a grayscale image, got {color:?}"
        )));
    }
    let data = match depth {
        BitDepth::Eight => buf.iter().map(|&v| v as f32 / 255.0).collect(),
        BitDepth::Sixteen => unpack_be_u16(&buf)
            .iter()
            .map(|&v| v as f32 / 65535.0)
            .collect(),
        _ => {
            return Err(IoError::PngDecodeError(format!(
                "unsupported bit depth {depth:?}"
            )))
        }
    };
    Ok(Image::new(size, data)?)
}

/// Write an 8-bit grayscale image as a PNG file.
///
/// # Arguments
///
/// * `file_path` - The destination path.
/// * `image` - The image to encode.
pub fn write_image_png_mono8(
    file_path: impl AsRef<Path>,
    image: &Image<u8, 1>,
) -> Result<(), IoError> {
    write_png_impl(file_path, image.as_slice(), image.size(), BitDepth::Eight)
}

/// Write a 16-bit grayscale image as a PNG file.
///
/// # Arguments
///
/// * `file_path` - The destination path.
/// * `image` - The image to encode.
pub fn write_image_png_mono16(
    file_path: impl AsRef<Path>,
    image: &Image<u16, 1>,
) -> Result<(), IoError> {
    let packed = pack_be_u16(image.as_slice());
    write_png_impl(file_path, &packed, image.size(), BitDepth::Sixteen)
}

// decode a png into its raw frame buffer together with size and format
fn read_png_impl(
    file_path: impl AsRef<Path>,
) -> Result<(Vec<u8>, ImageSize, ColorType, BitDepth), IoError> {
    let file_path = file_path.as_ref();
    if !file_path.exists() {
        return Err(IoError::FileDoesNotExist(file_path.to_path_buf()));
    }

    match file_path.extension() {
        Some(extension) if extension == "png" => {}
        _ => return Err(IoError::InvalidFileExtension(file_path.to_path_buf())),
    }

    let mut reader = Decoder::new(File::open(file_path)?)
        .read_info()
        .map_err(|e| IoError::PngDecodeError(e.to_string()))?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| IoError::PngDecodeError(e.to_string()))?;
    buf.truncate(info.buffer_size());

    let size = ImageSize {
        width: info.width as usize,
        height: info.height as usize,
    };

    Ok((buf, size, info.color_type, info.bit_depth))
}

fn write_png_impl(
    file_path: impl AsRef<Path>,
    image_data: &[u8],
    image_size: ImageSize,
    depth: BitDepth,
) -> Result<(), IoError> {
    let file = File::create(file_path)?;

    let mut encoder = Encoder::new(file, image_size.width as u32, image_size.height as u32);
    encoder.set_color(ColorType::Grayscale);
    encoder.set_depth(depth);

    encoder
        .write_header()
        .map_err(|e| IoError::PngEncodingError(e.to_string()))?
        .write_image_data(image_data)
        .map_err(|e| IoError::PngEncodingError(e.to_string()))?;

    Ok(())
}

// 16-bit PNG samples are big-endian on the wire
fn unpack_be_u16(buf: &[u8]) -> Vec<u16> {
    buf.chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

fn pack_be_u16(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_be_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IoError;
    use dotcal_image::{Image, ImageSize};

    fn gradient_mono8(width: usize, height: usize) -> Image<u8, 1> {
        let data = (0..width * height).map(|i| (i % 256) as u8).collect();
        Image::new(ImageSize { width, height }, data).unwrap()
    }

    #[test]
    fn write_read_png_mono8() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("gradient.png");

        let image = gradient_mono8(33, 20);
        write_image_png_mono8(&file_path, &image)?;

        let image_back = read_image_png_mono8(&file_path)?;
        assert!(file_path.exists(), "File does not exist: {:?}", file_path);

        assert_eq!(image_back.size(), image.size());
        assert_eq!(image_back.as_slice(), image.as_slice());

        Ok(())
    }

    #[test]
    fn write_read_png_mono16() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("radiograph.png");

        let data = (0..16 * 8).map(|i| (i * 300) as u16).collect();
        let image = Image::<u16, 1>::new([16, 8].into(), data)?;
        write_image_png_mono16(&file_path, &image)?;

        let image_back = read_image_png_mono16(&file_path)?;
        assert_eq!(image_back.size(), image.size());
        assert_eq!(image_back.as_slice(), image.as_slice());

        Ok(())
    }

    #[test]
    fn read_mono8_as_f32_scales_to_unit_range() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("levels.png");

        let image = Image::<u8, 1>::new([3, 1].into(), vec![0, 51, 255])?;
        write_image_png_mono8(&file_path, &image)?;

        let image_f32 = read_image_png_as_f32(&file_path)?;
        assert_eq!(image_f32.as_slice(), [0.0, 0.2, 1.0]);

        Ok(())
    }

    #[test]
    fn read_mono16_as_f32_scales_to_unit_range() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("levels16.png");

        let image = Image::<u16, 1>::new([2, 1].into(), vec![0, 65535])?;
        write_image_png_mono16(&file_path, &image)?;

        let image_f32 = read_image_png_as_f32(&file_path)?;
        assert_eq!(image_f32.as_slice(), [0.0, 1.0]);

        Ok(())
    }

    #[test]
    fn read_rejects_a_missing_file() {
        let result = read_image_png_mono8("missing.png");
        assert!(matches!(result, Err(IoError::FileDoesNotExist(_))));
    }

    #[test]
    fn read_rejects_a_foreign_extension() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("image.tif");
        std::fs::write(&file_path, b"not a png")?;

        let result = read_image_png_mono8(&file_path);
        assert!(matches!(result, Err(IoError::InvalidFileExtension(_))));

        Ok(())
    }

    #[test]
    fn read_rejects_a_depth_mismatch() -> Result<(), IoError> {
        let tmp_dir = tempfile::tempdir()?;
        let file_path = tmp_dir.path().join("radiograph.png");

        let image = Image::<u16, 1>::new([4, 4].into(), vec![1000u16; 16])?;
        write_image_png_mono16(&file_path, &image)?;

        let result = read_image_png_mono8(&file_path);
        assert!(matches!(result, Err(IoError::PngDecodeError(_))));

        Ok(())
    }
}
