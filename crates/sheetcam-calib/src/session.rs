//! Calibration sessions: one run over one photo, persisted as a directory of
//! artifacts plus a report awaiting review.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sheetcam_core::{CalibrationArtifact, CropRect};

use crate::error::CalibError;
use crate::pipeline::{
    auto_calibrate, load_image, normalize_lines, run_calibration, CalibrationOptions,
    CalibrationResult, LineSet,
};
use crate::reference::AutoFeatures;

pub const PROFILE_FILE: &str = "profile.json";
pub const LINES_FILE: &str = "lines.json";
pub const REPORT_FILE: &str = "report.json";
pub const UNDISTORTED_PREVIEW_FILE: &str = "undistorted_preview.png";
pub const RECTIFIED_PREVIEW_FILE: &str = "rectified_preview.png";

/// Review state of a session. Only a pending session can be decided.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl SessionStatus {
    pub fn accept(self) -> Result<Self, CalibError> {
        self.decide(SessionStatus::Accepted)
    }

    pub fn reject(self) -> Result<Self, CalibError> {
        self.decide(SessionStatus::Rejected)
    }

    fn decide(self, to: SessionStatus) -> Result<Self, CalibError> {
        match self {
            SessionStatus::Pending => Ok(to),
            other => Err(CalibError::InputError(format!(
                "session already {other:?}, cannot move to {to:?}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// `[f_factor, k1, k2]`.
    pub best_combo: (f64, f64, f64),
    pub line_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_features: Option<AutoFeatures>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub status: SessionStatus,
    pub fit_error: f64,
    pub crop_rect: CropRect,
    pub metadata: SessionMetadata,
    #[serde(default)]
    pub source_image: Option<PathBuf>,
}

impl SessionReport {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// A finished calibration run and the directory holding its artifacts.
#[derive(Clone, Debug)]
pub struct CalibrationSession {
    pub dir: PathBuf,
    pub report: SessionReport,
    pub artifact: CalibrationArtifact,
}

impl CalibrationSession {
    /// Run a calibration on `image_path` and write the session into `dir`.
    ///
    /// Without `lines` the sheet markings are found automatically and the
    /// detected features are recorded in the report metadata.
    pub fn run(
        image_path: impl AsRef<Path>,
        lines: Option<&LineSet>,
        options: &CalibrationOptions,
        dir: impl AsRef<Path>,
    ) -> Result<Self, CalibError> {
        let image_path = image_path.as_ref();
        let dir = dir.as_ref().to_path_buf();
        let image = load_image(image_path)?;

        let (set, auto_features) = match lines {
            Some(set) => (set.clone(), None),
            None => {
                let auto = auto_calibrate(&image, options)?;
                (LineSet::from_lines(&auto.lines), Some(auto.features))
            }
        };
        let cleaned = normalize_lines(&set)?;
        let result = run_calibration(&image, &cleaned, options)?;

        let report = SessionReport {
            status: SessionStatus::Pending,
            fit_error: result.fit_error(),
            crop_rect: result.crop_rect,
            metadata: SessionMetadata {
                best_combo: result.best_combo(),
                line_count: cleaned.len(),
                auto_features,
            },
            source_image: Some(image_path.to_path_buf()),
        };
        let session = Self {
            dir,
            report,
            artifact: result.artifact(),
        };
        session.write_artifacts(&LineSet::from_lines(&cleaned), &result)?;
        log::info!(
            "calibration session written to {} (fit error {:.4})",
            session.dir.display(),
            session.report.fit_error
        );
        Ok(session)
    }

    /// Load a session previously written by [`CalibrationSession::run`].
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CalibError> {
        let dir = dir.as_ref().to_path_buf();
        let report = SessionReport::load_json(dir.join(REPORT_FILE))?;
        let artifact = CalibrationArtifact::load_json(dir.join(PROFILE_FILE))?;
        Ok(Self {
            dir,
            report,
            artifact,
        })
    }

    pub fn profile_path(&self) -> PathBuf {
        self.dir.join(PROFILE_FILE)
    }

    pub fn accept(&mut self) -> Result<(), CalibError> {
        self.report.status = self.report.status.accept()?;
        self.report.write_json(self.dir.join(REPORT_FILE))
    }

    pub fn reject(&mut self) -> Result<(), CalibError> {
        self.report.status = self.report.status.reject()?;
        self.report.write_json(self.dir.join(REPORT_FILE))
    }

    fn write_artifacts(&self, lines: &LineSet, result: &CalibrationResult) -> Result<(), CalibError> {
        fs::create_dir_all(&self.dir)?;
        self.artifact.write_json(self.dir.join(PROFILE_FILE))?;
        lines.write_json(self.dir.join(LINES_FILE))?;
        result
            .undistorted
            .save(self.dir.join(UNDISTORTED_PREVIEW_FILE))?;
        result.cropped.save(self.dir.join(RECTIFIED_PREVIEW_FILE))?;
        self.report.write_json(self.dir.join(REPORT_FILE))
    }
}
