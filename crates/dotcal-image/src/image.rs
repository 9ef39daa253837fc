use crate::error::ImageError;

/// Image size in pixels.
///
/// # Examples
///
/// ```
/// use dotcal_image::ImageSize;
///
/// let size = ImageSize {
///   width: 640,
///   height: 480,
/// };
///
/// assert_eq!(size.width, 640);
/// assert_eq!(size.height, 480);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSize {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
}

impl ImageSize {
    /// The number of pixels covered by this size.
    pub fn pixels(&self) -> usize {
        self.width * self.height
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<[usize; 2]> for ImageSize {
    fn from(size: [usize; 2]) -> Self {
        ImageSize {
            width: size[0],
            height: size[1],
        }
    }
}

/// A pixel image with a compile-time channel count.
///
/// The pixel data lives in a flat `Vec<T>`, row-major with interleaved
/// channels, so the buffer layout is (H, W, C).
#[derive(Clone, Debug, PartialEq)]
pub struct Image<T, const CHANNELS: usize> {
    size: ImageSize,
    data: Vec<T>,
}

impl<T, const CHANNELS: usize> Image<T, CHANNELS> {
    /// Create an image from its size and pixel data.
    ///
    /// # Errors
    ///
    /// Returns an error when the data length does not match
    /// `width * height * CHANNELS`.
    ///
    /// # Examples
    ///
    /// ```
    /// use dotcal_image::{Image, ImageSize};
    ///
    /// let image = Image::<f32, 1>::new(
    ///     ImageSize {
    ///         width: 4,
    ///         height: 3,
    ///     },
    ///     vec![0.0; 12],
    /// ).unwrap();
    ///
    /// assert_eq!(image.cols(), 4);
    /// assert_eq!(image.rows(), 3);
    /// assert_eq!(image.num_channels(), 1);
    /// ```
    pub fn new(size: ImageSize, data: Vec<T>) -> Result<Self, ImageError> {
        let expected = size.pixels() * CHANNELS;
        if data.len() != expected {
            return Err(ImageError::InvalidChannelShape(data.len(), expected));
        }

        Ok(Self { size, data })
    }

    /// Create an image filled with a single value.
    ///
    /// # Examples
    ///
    /// ```
    /// use dotcal_image::{Image, ImageSize};
    ///
    /// let image = Image::<u8, 1>::from_size_val(
    ///     ImageSize {
    ///         width: 2,
    ///         height: 2,
    ///     },
    ///     128,
    /// ).unwrap();
    ///
    /// assert_eq!(image.as_slice(), [128, 128, 128, 128]);
    /// ```
    pub fn from_size_val(size: ImageSize, val: T) -> Result<Self, ImageError>
    where
        T: Clone,
    {
        let data = vec![val; size.pixels() * CHANNELS];
        Image::new(size, data)
    }

    /// The size of the image in pixels.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// The number of columns of the image.
    pub fn cols(&self) -> usize {
        self.size.width
    }

    /// The number of rows of the image.
    pub fn rows(&self) -> usize {
        self.size.height
    }

    /// The width of the image in pixels.
    pub fn width(&self) -> usize {
        self.size.width
    }

    /// The height of the image in pixels.
    pub fn height(&self) -> usize {
        self.size.height
    }

    /// The number of channels in the image.
    pub fn num_channels(&self) -> usize {
        CHANNELS
    }

    /// The pixel data as a flat slice.
    pub fn as_slice(&self) -> &[T] {
        self.data.as_slice()
    }

    /// The pixel data as a mutable flat slice.
    pub fn as_slice_mut(&mut self) -> &mut [T] {
        self.data.as_mut_slice()
    }

    /// Consume the image and return the pixel data.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    fn pixel_index(&self, x: usize, y: usize, ch: usize) -> Result<usize, ImageError> {
        if x >= self.width() || y >= self.height() {
            return Err(ImageError::PixelIndexOutOfBounds(
                x,
                y,
                self.width(),
                self.height(),
            ));
        }

        if ch >= CHANNELS {
            return Err(ImageError::ChannelIndexOutOfBounds(ch, CHANNELS));
        }

        Ok((y * self.width() + x) * CHANNELS + ch)
    }

    /// Read the pixel value at the given coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error when the coordinates or the channel index fall
    /// outside the image.
    pub fn get_pixel(&self, x: usize, y: usize, ch: usize) -> Result<&T, ImageError> {
        let index = self.pixel_index(x, y, ch)?;
        Ok(&self.data[index])
    }

    /// Write the pixel value at the given coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error when the coordinates or the channel index fall
    /// outside the image.
    pub fn set_pixel(&mut self, x: usize, y: usize, ch: usize, val: T) -> Result<(), ImageError> {
        let index = self.pixel_index(x, y, ch)?;
        self.data[index] = val;

        Ok(())
    }

    /// Convert the pixel data to another type.
    ///
    /// # Errors
    ///
    /// Returns an error when a value cannot be represented in the target
    /// type.
    ///
    /// # Examples
    ///
    /// ```
    /// use dotcal_image::{Image, ImageSize};
    ///
    /// let image = Image::<u8, 1>::new(
    ///     ImageSize {
    ///         width: 2,
    ///         height: 1,
    ///     },
    ///     vec![0, 255],
    /// ).unwrap();
    ///
    /// let floats = image.cast::<f32>().unwrap();
    /// assert_eq!(floats.as_slice(), [0.0, 255.0]);
    /// ```
    pub fn cast<U>(&self) -> Result<Image<U, CHANNELS>, ImageError>
    where
        U: num_traits::NumCast,
        T: num_traits::NumCast + Copy,
    {
        let data = self
            .data
            .iter()
            .map(|&value| {
                U::from(value)
                    .ok_or_else(|| ImageError::CastError(std::any::type_name::<U>().to_string()))
            })
            .collect::<Result<Vec<U>, _>>()?;

        Image::new(self.size, data)
    }
}
