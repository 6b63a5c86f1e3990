use sheetcam_core::{ProfileError, RectifyError};

/// Failures of a frame source. Read failures are transient for the capture
/// loop; only a failed `open` stops it.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("cannot open source: {0}")]
    Open(String),
    #[error("frame decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Failures of a persistence sink.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Setup failures of a capture run.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("failed to open frame source")]
    Open(#[source] SourceError),
    #[error("invalid capture configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Rectify(#[from] RectifyError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
