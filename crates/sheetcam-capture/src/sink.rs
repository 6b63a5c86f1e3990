//! Persistence of accepted frames.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use sheetcam_core::Frame;

use crate::error::SinkError;

pub const LATEST_FRAME_FILE: &str = "latest_frame.jpg";
pub const LATEST_RECTIFIED_FILE: &str = "latest_rectified.jpg";
pub const RECTIFIED_DIR: &str = "rectified";

/// Where an accepted frame ended up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub raw: PathBuf,
    pub rectified: Option<PathBuf>,
}

/// Receives every accepted frame. Errors are logged by the loop and never
/// stop it.
pub trait FrameSink {
    fn on_accept(
        &mut self,
        raw: &Frame,
        rectified: Option<&RgbImage>,
    ) -> Result<ArtifactRef, SinkError>;
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn on_accept(
        &mut self,
        raw: &Frame,
        rectified: Option<&RgbImage>,
    ) -> Result<ArtifactRef, SinkError> {
        (**self).on_accept(raw, rectified)
    }
}

/// Writes JPEGs into a directory:
///
/// ```text
/// <dir>/<prefix>_<unix-millis>.jpg
/// <dir>/latest_frame.jpg
/// <dir>/rectified/<prefix>_<unix-millis>_rectified.jpg
/// <dir>/rectified/latest_rectified.jpg
/// ```
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    prefix: String,
}

impl DirectorySink {
    pub fn new(dir: impl AsRef<Path>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stem_for(&self, frame: &Frame) -> String {
        let millis = frame
            .captured_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let base = format!("{}_{millis}", self.prefix);
        // two frames inside one millisecond must not overwrite each other
        let mut stem = base.clone();
        let mut n = 1;
        while self.dir.join(format!("{stem}.jpg")).exists() {
            stem = format!("{base}_{n}");
            n += 1;
        }
        stem
    }
}

impl FrameSink for DirectorySink {
    fn on_accept(
        &mut self,
        raw: &Frame,
        rectified: Option<&RgbImage>,
    ) -> Result<ArtifactRef, SinkError> {
        fs::create_dir_all(&self.dir)?;
        let stem = self.stem_for(raw);

        let raw_path = self.dir.join(format!("{stem}.jpg"));
        raw.image.save(&raw_path)?;
        fs::copy(&raw_path, self.dir.join(LATEST_FRAME_FILE))?;

        let rectified_path = match rectified {
            Some(img) => {
                let rect_dir = self.dir.join(RECTIFIED_DIR);
                fs::create_dir_all(&rect_dir)?;
                let path = rect_dir.join(format!("{stem}_rectified.jpg"));
                img.save(&path)?;
                fs::copy(&path, rect_dir.join(LATEST_RECTIFIED_FILE))?;
                Some(path)
            }
            None => None,
        };

        Ok(ArtifactRef {
            raw: raw_path,
            rectified: rectified_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::time::{Duration, SystemTime};

    fn frame_at(millis: u64) -> Frame {
        Frame::with_timestamp(
            RgbImage::from_pixel(16, 8, Rgb([40, 80, 120])),
            UNIX_EPOCH + Duration::from_millis(millis),
        )
    }

    #[test]
    fn writes_raw_rectified_and_latest_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path(), "cam1");
        let rect = RgbImage::from_pixel(4, 8, Rgb([1, 1, 1]));

        let out = sink.on_accept(&frame_at(1_700_000_000_123), Some(&rect)).unwrap();
        assert_eq!(out.raw, dir.path().join("cam1_1700000000123.jpg"));
        assert_eq!(
            out.rectified.as_deref(),
            Some(
                dir.path()
                    .join("rectified/cam1_1700000000123_rectified.jpg")
                    .as_path()
            )
        );
        assert!(dir.path().join(LATEST_FRAME_FILE).is_file());
        assert!(dir.path().join("rectified").join(LATEST_RECTIFIED_FILE).is_file());

        let reread = image::open(out.rectified.unwrap()).unwrap();
        assert_eq!((reread.width(), reread.height()), (4, 8));
    }

    #[test]
    fn same_millisecond_gets_a_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path(), "cam");
        let a = sink.on_accept(&frame_at(5), None).unwrap();
        let b = sink.on_accept(&frame_at(5), None).unwrap();
        assert_ne!(a.raw, b.raw);
        assert!(a.rectified.is_none());
        assert!(!dir.path().join(RECTIFIED_DIR).exists());
    }

    #[test]
    fn unwritable_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let mut sink = DirectorySink::new(blocker.join("sub"), "cam");
        let frame = Frame::with_timestamp(RgbImage::new(2, 2), SystemTime::now());
        assert!(sink.on_accept(&frame, None).is_err());
    }
}
