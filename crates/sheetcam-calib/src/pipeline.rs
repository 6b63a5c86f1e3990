//! Single-photo calibration: solve the lens, derive the optimal camera matrix
//! and the crop window, and render previews.

use std::fs;
use std::path::Path;

use image::RgbImage;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use sheetcam_core::{
    CalibrationArtifact, CameraIntrinsics, CropRect, RectificationProfile, Rectifier,
    UndistortConfig,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::crop::{
    canonical_homography, crop_from_lines, legacy_endpoint_crop, optimal_camera_matrix, CropMode,
    CropParams,
};
use crate::detect::{detect_sheet_outline, DetectorParams};
use crate::error::CalibError;
use crate::reference::{
    project_reference_geometry, summarize_features, AutoFeatures, SheetDimensions,
};
use crate::solver::{solve_distortion, DistortionSolution, SolverGrid};

/// Ordered image points along one straight real-world feature.
pub type ReferenceLine = Vec<Point2<f64>>;

/// Line file contents: `{"lines": [[[x, y], ...], ...]}`.
///
/// Points are kept as loose number lists so hand-edited files with stray
/// entries still load; [`normalize_lines`] cleans them up.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LineSet {
    pub lines: Vec<Vec<Vec<f64>>>,
}

impl LineSet {
    pub fn from_lines(lines: &[ReferenceLine]) -> Self {
        Self {
            lines: lines
                .iter()
                .map(|l| l.iter().map(|p| vec![p.x, p.y]).collect())
                .collect(),
        }
    }

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

/// Round points to integer pixels, dropping points with fewer than two
/// finite coordinates and lines left empty.
pub fn normalize_lines(set: &LineSet) -> Result<Vec<ReferenceLine>, CalibError> {
    let lines: Vec<ReferenceLine> = set
        .lines
        .iter()
        .map(|line| {
            line.iter()
                .filter(|p| p.len() >= 2 && p[0].is_finite() && p[1].is_finite())
                .map(|p| Point2::new(p[0].round_ties_even(), p[1].round_ties_even()))
                .collect::<ReferenceLine>()
        })
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return Err(CalibError::InputError("no calibration lines supplied".into()));
    }
    Ok(lines)
}

/// Tunables of a calibration run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    pub grid: SolverGrid,
    pub undistort: UndistortConfig,
    pub detector: DetectorParams,
    pub sheet: SheetDimensions,
    pub crop: CropParams,
}

impl CalibrationOptions {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Everything a calibration run produces.
#[derive(Clone, Debug)]
pub struct CalibrationResult {
    pub solution: DistortionSolution,
    pub optimal: CameraIntrinsics,
    pub crop_rect: CropRect,
    /// Full frame corrected with the optimal camera matrix.
    pub undistorted: RgbImage,
    /// `undistorted` sliced to `crop_rect`.
    pub cropped: RgbImage,
}

impl CalibrationResult {
    pub fn fit_error(&self) -> f64 {
        self.solution.residual
    }

    pub fn best_combo(&self) -> (f64, f64, f64) {
        self.solution.best_combo()
    }

    pub fn artifact(&self) -> CalibrationArtifact {
        CalibrationArtifact::new(self.solution.lens, self.optimal, self.crop_rect)
    }
}

/// Reference lines generated from the detected sheet outline.
#[derive(Clone, Debug)]
pub struct AutoCalibration {
    pub lines: Vec<ReferenceLine>,
    pub features: AutoFeatures,
}

pub fn load_image(path: impl AsRef<Path>) -> Result<RgbImage, CalibError> {
    let path = path.as_ref();
    image::open(path).map(|img| img.to_rgb8()).map_err(|e| {
        CalibError::InputError(format!(
            "unable to read calibration image {}: {e}",
            path.display()
        ))
    })
}

/// Detect the sheet, fit the canonical homography and project the sheet
/// markings as reference lines.
pub fn auto_calibrate(
    image: &RgbImage,
    options: &CalibrationOptions,
) -> Result<AutoCalibration, CalibError> {
    let gray = image::imageops::grayscale(image);
    let outline = detect_sheet_outline(&gray, &options.detector)?;
    let h = canonical_homography(&outline.corners, &options.sheet)?;
    let overlay = project_reference_geometry(&h, &options.sheet);
    let features = summarize_features(&outline.corners, &overlay);
    let lines = overlay.reference_lines();
    log::info!(
        "auto calibration: outline via {:?}, {} reference lines",
        outline.method,
        lines.len()
    );
    Ok(AutoCalibration { lines, features })
}

/// Solve the lens from `lines`, then derive the optimal matrix, crop window
/// and previews for `image`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(image, lines, options), fields(lines = lines.len()))
)]
pub fn run_calibration(
    image: &RgbImage,
    lines: &[ReferenceLine],
    options: &CalibrationOptions,
) -> Result<CalibrationResult, CalibError> {
    let lines: Vec<&ReferenceLine> = lines.iter().filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return Err(CalibError::InputError("no calibration lines supplied".into()));
    }
    let size = image.dimensions();

    let solution = solve_distortion(&lines, size, &options.grid, options.undistort)?;
    let optimal = optimal_camera_matrix(&solution.lens, size, options.undistort)?;

    let undistorter =
        Rectifier::new(RectificationProfile::passthrough().with_lens(solution.lens, optimal))?;
    let undistorted = undistorter.rectify(image)?;

    let corrected_size = undistorted.dimensions();
    let crop_rect = match options.crop.mode {
        CropMode::Hull => crop_from_lines(
            &lines,
            &solution.lens,
            &optimal,
            corrected_size,
            options.crop,
            options.undistort,
        )?,
        CropMode::Endpoints => legacy_endpoint_crop(
            &lines,
            &solution.lens,
            &optimal,
            corrected_size,
            options.crop,
            options.undistort,
        )?,
    };
    let cropped = image::imageops::crop_imm(
        &undistorted,
        crop_rect.x,
        crop_rect.y,
        crop_rect.width,
        crop_rect.height,
    )
    .to_image();

    log::info!(
        "calibration: fit error {:.4}, crop {:?}",
        solution.residual,
        <[u32; 4]>::from(crop_rect)
    );
    Ok(CalibrationResult {
        solution,
        optimal,
        crop_rect,
        undistorted,
        cropped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_rounds_and_drops_malformed_points() {
        let set: LineSet = serde_json::from_str(
            r#"{"lines": [[[1.4, 2.6], [3], [5.5, 6.0, 9.0]], [], [[7.0, 8.0]]]}"#,
        )
        .unwrap();
        let lines = normalize_lines(&set).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], vec![Point2::new(1.0, 3.0), Point2::new(6.0, 6.0)]);
        assert_eq!(lines[1], vec![Point2::new(7.0, 8.0)]);
    }

    #[test]
    fn all_empty_lines_is_an_input_error() {
        let set = LineSet {
            lines: vec![vec![], vec![vec![1.0]]],
        };
        assert!(matches!(normalize_lines(&set), Err(CalibError::InputError(_))));
    }

    #[test]
    fn run_without_lines_fails() {
        let img = RgbImage::new(64, 48);
        let err = run_calibration(&img, &[Vec::new()], &CalibrationOptions::default()).unwrap_err();
        assert!(matches!(err, CalibError::InputError(_)));
    }

    #[test]
    fn options_fill_defaults() {
        let o: CalibrationOptions = serde_json::from_str(r#"{"crop": {"margin": 3}}"#).unwrap();
        assert_eq!(o.crop.margin, 3);
        assert_eq!(o.crop.mode, CropMode::Hull);
        assert_eq!(o.grid, SolverGrid::default());
        assert_eq!(o.detector.canny_high, 75.0);
    }

    #[test]
    fn missing_image_is_an_input_error() {
        assert!(matches!(
            load_image("/definitely/not/here.png"),
            Err(CalibError::InputError(_))
        ));
    }
}
