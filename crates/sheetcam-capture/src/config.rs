use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sheetcam_core::{CalibrationArtifact, Rectifier};

use crate::change::ChangeDetectorConfig;
use crate::error::CaptureError;
use crate::source::{FrameSource, StillImageSource};

fn default_timeout_secs() -> f64 {
    5.0
}

/// Which frame source a capture run polls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Device {
        index: u32,
    },
    Snapshot {
        url: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: f64,
    },
    Still {
        path: PathBuf,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Device { index: 0 }
    }
}

impl SourceConfig {
    /// Build the concrete source. Kinds whose cargo feature is off are a
    /// configuration error.
    pub fn build(&self) -> Result<Box<dyn FrameSource>, CaptureError> {
        match self {
            SourceConfig::Still { path } => Ok(Box::new(StillImageSource::new(path))),
            #[cfg(feature = "snapshot")]
            SourceConfig::Snapshot { url, timeout_secs } => {
                let timeout = secs_to_duration(*timeout_secs, "timeout_secs")?;
                Ok(Box::new(crate::source::SnapshotSource::new(
                    url.clone(),
                    timeout,
                )))
            }
            #[cfg(not(feature = "snapshot"))]
            SourceConfig::Snapshot { .. } => Err(CaptureError::Config(
                "snapshot sources need the `snapshot` feature".into(),
            )),
            #[cfg(feature = "device")]
            SourceConfig::Device { index } => {
                Ok(Box::new(crate::source::DeviceSource::new(*index)))
            }
            #[cfg(not(feature = "device"))]
            SourceConfig::Device { .. } => Err(CaptureError::Config(
                "capture devices need the `device` feature".into(),
            )),
        }
    }
}

/// One camera's capture run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: SourceConfig,
    /// Calibration artifact; frames are stored unrectified when absent.
    pub profile_path: Option<PathBuf>,
    pub output_dir: PathBuf,
    /// File name prefix for stored frames.
    pub name: String,
    pub poll_interval_secs: f64,
    pub change: ChangeDetectorConfig,
    /// Stop after this many accepted frames; 0 runs until cancelled.
    pub max_frames: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            profile_path: None,
            output_dir: PathBuf::from("captures"),
            name: "camera".to_string(),
            poll_interval_secs: 1.0,
            change: ChangeDetectorConfig::default(),
            max_frames: 0,
        }
    }
}

impl CaptureConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let raw = fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CaptureError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        secs_to_duration(self.poll_interval_secs, "poll_interval_secs")?;
        if self.change.compare_width == 0 || self.change.compare_height == 0 {
            return Err(CaptureError::Config(
                "change.compare_width and compare_height must be positive".into(),
            ));
        }
        if !self.change.threshold.is_finite() || self.change.threshold < 0.0 {
            return Err(CaptureError::Config(format!(
                "change.threshold must be a non-negative number, got {}",
                self.change.threshold
            )));
        }
        if self.name.is_empty() {
            return Err(CaptureError::Config("name must not be empty".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Result<Duration, CaptureError> {
        secs_to_duration(self.poll_interval_secs, "poll_interval_secs")
    }

    /// Load the calibration artifact, if configured, into a [`Rectifier`].
    pub fn build_rectifier(&self) -> Result<Option<Rectifier>, CaptureError> {
        let Some(path) = &self.profile_path else {
            return Ok(None);
        };
        let artifact = CalibrationArtifact::load_json(path)?;
        let rectifier = Rectifier::new(artifact.to_profile()?)?;
        log::info!(
            "loaded profile {} ({:?})",
            path.display(),
            rectifier.mode()
        );
        Ok(Some(rectifier))
    }
}

fn secs_to_duration(secs: f64, field: &str) -> Result<Duration, CaptureError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| CaptureError::Config(format!("{field} must be a non-negative number, got {secs}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: CaptureConfig = serde_json::from_str(
            r#"{"source": {"kind": "snapshot", "url": "http://cam/last.jpg"}, "max_frames": 3}"#,
        )
        .unwrap();
        assert_eq!(
            cfg.source,
            SourceConfig::Snapshot {
                url: "http://cam/last.jpg".into(),
                timeout_secs: 5.0
            }
        );
        assert_eq!(cfg.max_frames, 3);
        assert_eq!(cfg.poll_interval_secs, 1.0);
        assert_eq!(cfg.change, ChangeDetectorConfig::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn json_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.json");
        let cfg = CaptureConfig {
            source: SourceConfig::Still {
                path: dir.path().join("frame.png"),
            },
            max_frames: 10,
            ..CaptureConfig::default()
        };
        cfg.write_json(&path).unwrap();
        assert_eq!(CaptureConfig::load_json(&path).unwrap(), cfg);
    }

    #[test]
    fn rejects_negative_interval() {
        let cfg = CaptureConfig {
            poll_interval_secs: -1.0,
            ..CaptureConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(CaptureError::Config(_))));
    }

    #[test]
    fn no_profile_means_no_rectifier() {
        assert!(CaptureConfig::default().build_rectifier().unwrap().is_none());
    }

    #[test]
    fn still_source_builds() {
        let cfg = SourceConfig::Still {
            path: "frame.png".into(),
        };
        let src = cfg.build().unwrap();
        assert!(src.describe().contains("frame.png"));
    }
}
