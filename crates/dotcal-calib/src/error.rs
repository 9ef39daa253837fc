use dotcal_image::ImageError;

/// An error type for the calibration pipeline.
#[derive(thiserror::Error, Debug)]
pub enum CalibError {
    /// Error when too few dots survive to continue the pipeline.
    #[error("Only {0} dots detected, at least {1} required")]
    InsufficientDots(usize, usize),

    /// Error when a least-squares system is underdetermined or singular.
    #[error("Degenerate fit: {constraints} constraints for {unknowns} unknowns")]
    DegenerateFit {
        /// Number of usable constraints collected.
        constraints: usize,
        /// Number of unknowns the fit solves for.
        unknowns: usize,
    },

    /// Error when the grid geometry does not support the requested operation.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Error from an underlying image operation.
    #[error(transparent)]
    Image(#[from] ImageError),
}
