//! Sheet outline detection.
//!
//! Grayscale, Gaussian blur, Canny edges, outer contours. The largest contour
//! is simplified to a polygon; a quadrilateral is taken as is, anything else
//! falls back to the contour's minimum-area rectangle.

use std::fs;
use std::path::Path;

use image::{GrayImage, RgbImage};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::geometry::{approximate_polygon_dp, arc_length, contour_area, min_area_rect};
use imageproc::point::Point;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::CalibError;

/// Parameters of the outline detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Gaussian sigma; 1.1 is the sigma of a 5x5 kernel.
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Polygon simplification tolerance as a fraction of the contour perimeter.
    pub approx_epsilon_frac: f64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            canny_low: 25.0,
            canny_high: 75.0,
            approx_epsilon_frac: 0.02,
        }
    }
}

impl DetectorParams {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// How the outline corners were obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlineMethod {
    Polygon,
    MinAreaRect,
}

/// Detected sheet outline, corners ordered top-left, top-right,
/// bottom-right, bottom-left.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SheetOutline {
    pub corners: [Point2<f64>; 4],
    pub method: OutlineMethod,
    pub contour_area: f64,
    pub contour_count: usize,
}

/// Order four points as top-left, top-right, bottom-right, bottom-left.
///
/// Top-left has the smallest `x + y`, bottom-right the largest. Top-right has
/// the smallest `y - x`, bottom-left the largest. Ties keep the earlier point.
pub fn order_corners(points: [Point2<f64>; 4]) -> [Point2<f64>; 4] {
    let pick = |key: &dyn Fn(&Point2<f64>) -> f64, want_max: bool| {
        let mut best = points[0];
        let mut best_key = key(&best);
        for p in &points[1..] {
            let k = key(p);
            if (want_max && k > best_key) || (!want_max && k < best_key) {
                best = *p;
                best_key = k;
            }
        }
        best
    };
    let sum = |p: &Point2<f64>| p.x + p.y;
    let diff = |p: &Point2<f64>| p.y - p.x;
    [
        pick(&sum, false),
        pick(&diff, false),
        pick(&sum, true),
        pick(&diff, true),
    ]
}

/// Detect the sheet outline in an RGB photo and return its ordered corners.
pub fn detect_sheet_corners(
    image: &RgbImage,
    params: &DetectorParams,
) -> Result<[Point2<f64>; 4], CalibError> {
    let gray = image::imageops::grayscale(image);
    Ok(detect_sheet_outline(&gray, params)?.corners)
}

#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(gray, params), fields(width = gray.width(), height = gray.height()))
)]
pub fn detect_sheet_outline(
    gray: &GrayImage,
    params: &DetectorParams,
) -> Result<SheetOutline, CalibError> {
    let blurred = if params.blur_sigma > 0.0 {
        imageproc::filter::gaussian_blur_f32(gray, params.blur_sigma)
    } else {
        gray.clone()
    };
    let edges = imageproc::edges::canny(&blurred, params.canny_low, params.canny_high);

    let contours: Vec<Contour<i32>> = find_contours::<i32>(&edges)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .collect();
    let contour_count = contours.len();

    let (largest, area) = contours
        .iter()
        .map(|c| (c, contour_area(&c.points)))
        .fold(None, |best: Option<(&Contour<i32>, f64)>, (c, a)| match best {
            Some((_, ba)) if ba >= a => best,
            _ => Some((c, a)),
        })
        .ok_or(CalibError::GeometryNotFound)?;
    log::debug!(
        "{contour_count} outer contours, largest has {} points and area {area:.1}",
        largest.points.len()
    );

    let epsilon = params.approx_epsilon_frac * arc_length(&largest.points, true);
    let approx = if epsilon > 0.0 && largest.points.len() >= 2 {
        approximate_polygon_dp(&largest.points, epsilon, true)
    } else {
        largest.points.clone()
    };

    let (raw, method) = if let [a, b, c, d] = approx.as_slice() {
        (to_f64([*a, *b, *c, *d]), OutlineMethod::Polygon)
    } else {
        log::debug!(
            "outline simplified to {} vertices, using minimum-area rectangle",
            approx.len()
        );
        (min_area_corners(&largest.points), OutlineMethod::MinAreaRect)
    };

    Ok(SheetOutline {
        corners: order_corners(raw),
        method,
        contour_area: area,
        contour_count,
    })
}

fn to_f64(points: [Point<i32>; 4]) -> [Point2<f64>; 4] {
    points.map(|p| Point2::new(p.x as f64, p.y as f64))
}

fn min_area_corners(points: &[Point<i32>]) -> [Point2<f64>; 4] {
    let rect = if points.len() >= 3 {
        min_area_rect(points)
    } else {
        let (x0, x1) = (points.iter().map(|p| p.x).min(), points.iter().map(|p| p.x).max());
        let (y0, y1) = (points.iter().map(|p| p.y).min(), points.iter().map(|p| p.y).max());
        let (x0, x1, y0, y1) = (
            x0.unwrap_or(0),
            x1.unwrap_or(0),
            y0.unwrap_or(0),
            y1.unwrap_or(0),
        );
        [
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ]
    };
    to_f64(rect)
}
