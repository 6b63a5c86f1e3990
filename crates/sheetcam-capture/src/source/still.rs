use std::path::{Path, PathBuf};

use sheetcam_core::Frame;

use super::FrameSource;
use crate::error::SourceError;

/// Re-reads one image file on every poll. Replacing the file on disk
/// replaces the frame.
#[derive(Debug, Clone)]
pub struct StillImageSource {
    path: PathBuf,
    opened: bool,
}

impl StillImageSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            opened: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for StillImageSource {
    fn open(&mut self) -> Result<(), SourceError> {
        if !self.path.is_file() {
            return Err(SourceError::Open(format!(
                "{} is not a file",
                self.path.display()
            )));
        }
        self.opened = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, SourceError> {
        if !self.opened {
            return Err(SourceError::SourceUnavailable("source not opened".into()));
        }
        let img = image::open(&self.path).map_err(|e| {
            SourceError::SourceUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        Ok(Frame::new(img.to_rgb8()))
    }

    fn release(&mut self) {
        self.opened = false;
    }

    fn describe(&self) -> String {
        format!("still image {}", self.path.display())
    }
}
