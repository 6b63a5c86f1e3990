//! Estimating a rectification profile from one photo of the sheet.
//!
//! - [`line_fit_residual`] scores how straight a point set is.
//! - [`solve_distortion`] grid-searches radial distortion against that score.
//! - [`detect_sheet_corners`] finds the sheet outline when no lines are given,
//!   and [`project_reference_geometry`] turns it into reference markings.
//! - [`crop_from_lines`], [`canonical_homography`] and
//!   [`warp_homography_from_corners`] build the crop and perspective parts.
//! - [`run_calibration`] and [`CalibrationSession`] tie it together.

mod crop;
mod detect;
mod error;
mod pipeline;
mod reference;
mod residual;
mod session;
mod solver;

pub use crop::{
    canonical_homography, crop_from_lines, legacy_endpoint_crop, optimal_camera_matrix,
    warp_homography_from_corners, CropMode, CropParams, DEFAULT_WARP_SIZE,
};
pub use detect::{
    detect_sheet_corners, detect_sheet_outline, order_corners, DetectorParams, OutlineMethod,
    SheetOutline,
};
pub use error::CalibError;
pub use pipeline::{
    auto_calibrate, load_image, normalize_lines, run_calibration, AutoCalibration,
    CalibrationOptions, CalibrationResult, LineSet, ReferenceLine,
};
pub use reference::{
    project_reference_geometry, summarize_features, AutoFeatures, FarNear, HouseCircle,
    LineEndpoints, ProjectedLine, ReferenceOverlay, SheetDimensions,
};
pub use residual::{line_fit_residual, total_residual};
pub use session::{
    CalibrationSession, SessionMetadata, SessionReport, SessionStatus, LINES_FILE, PROFILE_FILE,
    RECTIFIED_PREVIEW_FILE, REPORT_FILE, UNDISTORTED_PREVIEW_FILE,
};
pub use solver::{
    evaluate_lens, lens_for_combo, solve_distortion, DistortionSolution, SolverGrid,
};
