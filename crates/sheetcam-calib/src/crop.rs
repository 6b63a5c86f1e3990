//! Perspective and crop builders.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use sheetcam_core::{
    bounding_box, convex_hull, homography_from_4pt, CameraIntrinsics, CropRect, Homography,
    LensModel, UndistortConfig,
};

use crate::error::CalibError;
use crate::reference::SheetDimensions;

/// Default output size of the four-corner warp.
pub const DEFAULT_WARP_SIZE: (u32, u32) = (800, 1600);

/// How the crop window is derived from the reference lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropMode {
    /// Bounding box of the convex hull of every undistorted point.
    #[default]
    Hull,
    /// Only line endpoints, see [`legacy_endpoint_crop`].
    Endpoints,
}

/// Crop window tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropParams {
    pub mode: CropMode,
    /// Pixels moved inwards from every side of the window.
    pub margin: i64,
}

impl Default for CropParams {
    fn default() -> Self {
        Self {
            mode: CropMode::Hull,
            margin: 0,
        }
    }
}

impl CropParams {
    /// Endpoint crop with its usual 4 px inset.
    pub fn legacy() -> Self {
        Self {
            mode: CropMode::Endpoints,
            margin: 4,
        }
    }
}

/// Homography mapping the canonical sheet rectangle (feet) onto the four
/// ordered image corners.
pub fn canonical_homography(
    corners: &[Point2<f64>; 4],
    dims: &SheetDimensions,
) -> Result<Homography, CalibError> {
    homography_from_4pt(&dims.canonical_corners(), corners).ok_or(CalibError::HomographyFailed)
}

/// Homography mapping four picked corners (top-left, top-right,
/// bottom-right, bottom-left) to the corners of a `width x height` output.
pub fn warp_homography_from_corners(
    corners: &[Point2<f64>; 4],
    width: u32,
    height: u32,
) -> Result<Homography, CalibError> {
    if width == 0 || height == 0 {
        return Err(CalibError::InputError(format!(
            "warp output size must be non-zero (got {width}x{height})"
        )));
    }
    let (w, h) = ((width - 1) as f64, (height - 1) as f64);
    let dst = [
        Point2::new(0.0, 0.0),
        Point2::new(w, 0.0),
        Point2::new(w, h),
        Point2::new(0.0, h),
    ];
    homography_from_4pt(corners, &dst).ok_or(CalibError::HomographyFailed)
}

/// New camera matrix keeping the whole source field of view.
pub fn optimal_camera_matrix(
    lens: &LensModel,
    image_size: (u32, u32),
    cfg: UndistortConfig,
) -> Result<CameraIntrinsics, CalibError> {
    lens.optimal_intrinsics(image_size.0, image_size.1, 1.0, cfg)
        .ok_or_else(|| CalibError::InputError("optimal camera matrix is undefined for this lens".into()))
}

/// Crop window around all reference points after distortion correction.
///
/// Points are undistorted into the `optimal` pixel frame, the convex hull's
/// bounding rectangle is shrunk by `params.margin` and clamped to the
/// `corrected_size` image.
pub fn crop_from_lines<L: AsRef<[Point2<f64>]>>(
    lines: &[L],
    lens: &LensModel,
    optimal: &CameraIntrinsics,
    corrected_size: (u32, u32),
    params: CropParams,
    cfg: UndistortConfig,
) -> Result<CropRect, CalibError> {
    let mut corrected = Vec::new();
    for line in lines {
        let pts = lens
            .undistort_pixels(line.as_ref(), optimal, cfg)
            .ok_or_else(|| CalibError::InputError("reference point failed to undistort".into()))?;
        corrected.extend(pts);
    }
    if corrected.is_empty() {
        return Err(CalibError::InputError(
            "no points available to compute crop rectangle".into(),
        ));
    }

    let hull = convex_hull(&corrected);
    let (x, y, w, h) = bounding_box(&hull)
        .ok_or_else(|| CalibError::InputError("crop points are not finite".into()))?;
    let m = params.margin;
    let rect = CropRect::clamped(
        x.saturating_add(m),
        y.saturating_add(m),
        w.saturating_sub(m.saturating_mul(2)),
        h.saturating_sub(m.saturating_mul(2)),
        corrected_size.0,
        corrected_size.1,
    );
    log::debug!(
        "crop from {} points (hull {}): {rect:?}",
        corrected.len(),
        hull.len()
    );
    Ok(rect)
}

/// Crop between the outermost lines using only line endpoints.
///
/// Horizontal limits are the overlap of every line's x extent; vertical
/// limits are the mean y of the topmost and bottommost lines. Requires at
/// least two lines with two or more points.
pub fn legacy_endpoint_crop<L: AsRef<[Point2<f64>]>>(
    lines: &[L],
    lens: &LensModel,
    optimal: &CameraIntrinsics,
    corrected_size: (u32, u32),
    params: CropParams,
    cfg: UndistortConfig,
) -> Result<CropRect, CalibError> {
    if lines.len() < 2 {
        return Err(CalibError::InputError("need at least 2 lines".into()));
    }

    // (y_mean, x_left, x_right) per line
    let mut spans: Vec<(f64, f64, f64)> = Vec::with_capacity(lines.len());
    for line in lines {
        let pts = line.as_ref();
        let (Some(first), Some(last)) = (pts.first(), pts.last()) else {
            continue;
        };
        if pts.len() < 2 {
            continue;
        }
        let und = lens
            .undistort_pixels(&[*first, *last], optimal, cfg)
            .ok_or_else(|| CalibError::InputError("line endpoint failed to undistort".into()))?;
        let (a, b) = (und[0], und[1]);
        spans.push((0.5 * (a.y + b.y), a.x.min(b.x), a.x.max(b.x)));
    }
    if spans.len() < 2 {
        return Err(CalibError::InputError(
            "not enough valid lines after processing".into(),
        ));
    }

    let m = params.margin as f64;
    let x_left = spans.iter().map(|s| s.1).fold(f64::MIN, f64::max) + m;
    let x_right = spans.iter().map(|s| s.2).fold(f64::MAX, f64::min) - m;
    spans.sort_by(|a, b| a.0.total_cmp(&b.0));
    let y_top = spans[0].0 + m;
    let y_bot = spans[spans.len() - 1].0 - m;

    let (w, h) = (corrected_size.0 as f64, corrected_size.1 as f64);
    let clamp = |v: f64, hi: f64| v.clamp(0.0, (hi - 1.0).max(0.0)) as u32;
    let (x0, x1) = (clamp(x_left, w), clamp(x_right, w));
    let (y0, y1) = (clamp(y_top, h), clamp(y_bot, h));
    if x1 <= x0 || y1 <= y0 {
        return Err(CalibError::InputError(format!(
            "invalid crop box: ({x0},{y0})-({x1},{y1})"
        )));
    }
    CropRect::new(x0, y0, x1 - x0, y1 - y0).map_err(|e| CalibError::InputError(e.to_string()))
}
