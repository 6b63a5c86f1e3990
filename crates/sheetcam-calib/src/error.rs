use sheetcam_core::{ProfileError, RectifyError};

/// Errors returned by a calibration run.
#[derive(thiserror::Error, Debug)]
pub enum CalibError {
    #[error("invalid calibration input: {0}")]
    InputError(String),
    #[error("sheet outline not found in image")]
    GeometryNotFound,
    #[error("no reference lines supplied to the distortion solver")]
    SolverInputEmpty,
    #[error("homography estimation failed (degenerate corners)")]
    HomographyFailed,
    #[error("no grid combination produced finite undistorted points")]
    NoConvergentCombination,
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Rectify(#[from] RectifyError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
