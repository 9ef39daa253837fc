/// An error type for the io module.
#[derive(thiserror::Error, Debug)]
pub enum IoError {
    /// The file to read does not exist.
    #[error("No such file: {0}")]
    FileDoesNotExist(std::path::PathBuf),

    /// The file extension does not match the expected format.
    #[error("Unexpected file extension: {0}")]
    InvalidFileExtension(std::path::PathBuf),

    /// The underlying filesystem operation failed.
    #[error("Failed to access the file. {0}")]
    FileError(#[from] std::io::Error),

    /// The decoded data does not form a valid image.
    #[error("Failed to create the image. {0}")]
    ImageCreationError(#[from] dotcal_image::ImageError),

    /// PNG encoding failed.
    #[error("Failed to encode the png image. {0}")]
    PngEncodingError(String),

    /// PNG decoding failed.
    #[error("Failed to decode the png image. {0}")]
    PngDecodeError(String),

    /// A calibration metadata file could not be parsed.
    #[error("Failed to parse the metadata file. {0}")]
    MetadataParseError(String),
}
