//! End-to-end helpers: what the CLI subcommands do, callable from code.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use image::RgbImage;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use sheetcam_calib::{
    canonical_homography, detect_sheet_outline, project_reference_geometry, summarize_features,
    warp_homography_from_corners, AutoFeatures, CalibError, DetectorParams, ReferenceOverlay,
    SheetDimensions, SheetOutline,
};
use sheetcam_capture::{CaptureConfig, CaptureError, CaptureLoop, CaptureSummary};
use sheetcam_core::{CalibrationArtifact, Homography};

/// Everything the detector found in one photo.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub image_size: (u32, u32),
    pub outline: SheetOutline,
    /// Sheet feet to image pixels.
    pub homography: Homography,
    pub overlay: ReferenceOverlay,
    pub features: AutoFeatures,
}

/// Find the sheet outline and project the reference markings onto it.
pub fn detect_sheet(
    image: &RgbImage,
    params: &DetectorParams,
    dims: &SheetDimensions,
) -> Result<DetectionReport, CalibError> {
    let gray = image::imageops::grayscale(image);
    let outline = detect_sheet_outline(&gray, params)?;
    let homography = canonical_homography(&outline.corners, dims)?;
    let overlay = project_reference_geometry(&homography, dims);
    let features = summarize_features(&outline.corners, &overlay);
    log::info!(
        "sheet outline via {:?}: {} lines, {} house circles",
        outline.method,
        overlay.lines.len(),
        overlay.house_circles.len()
    );
    Ok(DetectionReport {
        image_size: image.dimensions(),
        outline,
        homography,
        overlay,
        features,
    })
}

/// Add a four-corner perspective warp to the profile at `profile_path` and
/// rewrite it.
///
/// `corners` are top-left, top-right, bottom-right, bottom-left in the
/// undistorted, cropped frame the warp is applied to.
pub fn set_profile_warp(
    profile_path: impl AsRef<Path>,
    corners: &[Point2<f64>; 4],
    output_size: (u32, u32),
) -> Result<CalibrationArtifact, CalibError> {
    let path = profile_path.as_ref();
    let mut artifact = CalibrationArtifact::load_json(path)?;
    let h = warp_homography_from_corners(corners, output_size.0, output_size.1)?;
    artifact.homography = Some(h);
    artifact.output_size = Some(output_size);
    // fails on a singular warp before anything is written
    artifact.to_profile()?;
    artifact.write_json(path)?;
    log::info!(
        "profile {} now warps to {}x{}",
        path.display(),
        output_size.0,
        output_size.1
    );
    Ok(artifact)
}

/// Build a capture loop from `cfg`, share `stop` with it, and run it.
pub fn run_capture(
    cfg: &CaptureConfig,
    stop: Arc<AtomicBool>,
) -> Result<CaptureSummary, CaptureError> {
    let mut capture = CaptureLoop::from_config(cfg)?.with_stop_flag(stop);
    capture.run()
}
