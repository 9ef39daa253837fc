/// An error type for the image module.
#[derive(thiserror::Error, Debug)]
pub enum ImageError {
    /// Error when the data length does not match the image shape.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when two images are expected to have the same size.
    #[error("Image size ({0}x{1}) does not match the expected size ({2}x{3})")]
    InvalidImageSize(usize, usize, usize, usize),

    /// Error when a pixel coordinate falls outside the image.
    #[error("Pixel index ({0}, {1}) out of bounds for image of size ({2}x{3})")]
    PixelIndexOutOfBounds(usize, usize, usize, usize),

    /// Error when a channel index falls outside the image channels.
    #[error("Channel index ({0}) out of bounds ({1})")]
    ChannelIndexOutOfBounds(usize, usize),

    /// Error when the pixel data cannot be cast to the requested type.
    #[error("Cannot cast the pixel data to type {0}")]
    CastError(String),

    /// Error when the number of histogram bins is invalid.
    #[error("Invalid number of histogram bins ({0})")]
    InvalidHistogramBins(usize),

    /// Error when a filter kernel is empty.
    #[error("Invalid kernel length ({0}, {1})")]
    InvalidKernelLength(usize, usize),
}
