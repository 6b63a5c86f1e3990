//! Canonical sheet markings projected into the image.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use sheetcam_core::Homography;

/// Physical sheet layout in feet, measured from the far end.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetDimensions {
    pub width: f64,
    pub length: f64,
    pub back_line: f64,
    pub tee_line: f64,
    pub hog_line: f64,
    /// House rings as `(name, radius)`, outermost first.
    pub house_rings: Vec<(String, f64)>,
    pub center_line_samples: usize,
    pub cross_line_samples: usize,
}

impl Default for SheetDimensions {
    /// World Curling sheet.
    fn default() -> Self {
        Self {
            width: 14.5,
            length: 146.0,
            back_line: 10.0,
            tee_line: 16.0,
            hog_line: 37.0,
            house_rings: vec![
                ("12ft".into(), 6.0),
                ("8ft".into(), 4.0),
                ("4ft".into(), 2.0),
                ("button".into(), 0.5),
            ],
            center_line_samples: 200,
            cross_line_samples: 160,
        }
    }
}

impl SheetDimensions {
    /// Canonical rectangle corners: top-left, top-right, bottom-right,
    /// bottom-left.
    pub fn canonical_corners(&self) -> [Point2<f64>; 4] {
        [
            Point2::new(0.0, 0.0),
            Point2::new(self.width, 0.0),
            Point2::new(self.width, self.length),
            Point2::new(0.0, self.length),
        ]
    }
}

/// One projected marking line, integer pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectedLine {
    pub name: String,
    pub points: Vec<[i64; 2]>,
}

impl ProjectedLine {
    pub fn to_points(&self) -> Vec<Point2<f64>> {
        self.points
            .iter()
            .map(|p| Point2::new(p[0] as f64, p[1] as f64))
            .collect()
    }

    fn endpoints(&self) -> Option<LineEndpoints> {
        Some(LineEndpoints {
            start: *self.points.first()?,
            end: *self.points.last()?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineEndpoints {
    pub start: [i64; 2],
    pub end: [i64; 2],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarNear {
    pub far: Option<LineEndpoints>,
    pub near: Option<LineEndpoints>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseCircle {
    /// `"far"` or `"near"`.
    pub end: String,
    pub name: String,
    pub center: [i64; 2],
    pub radius_px: i64,
}

/// Reference markings in pixel space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceOverlay {
    /// `center_line`, `hog_far`, `hog_near`, `tee_far`, `tee_near`,
    /// `back_far`, `back_near`, in that order.
    pub lines: Vec<ProjectedLine>,
    pub house_circles: Vec<HouseCircle>,
}

impl ReferenceOverlay {
    pub fn line(&self, name: &str) -> Option<&ProjectedLine> {
        self.lines.iter().find(|l| l.name == name)
    }

    /// The lines as reference lines for the distortion search.
    pub fn reference_lines(&self) -> Vec<Vec<Point2<f64>>> {
        self.lines
            .iter()
            .map(ProjectedLine::to_points)
            .filter(|l| !l.is_empty())
            .collect()
    }
}

/// Summary attached to auto-calibrated runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutoFeatures {
    pub sheet_corners: [[i64; 2]; 4],
    pub center_line: Option<LineEndpoints>,
    pub hog_lines: FarNear,
    pub tee_lines: FarNear,
    pub back_lines: FarNear,
    pub house_circles: Vec<HouseCircle>,
}

fn round_px(p: Point2<f64>) -> [i64; 2] {
    [p.x.round_ties_even() as i64, p.y.round_ties_even() as i64]
}

fn project(h: &Homography, x: f64, y: f64) -> Option<[i64; 2]> {
    h.apply(Point2::new(x, y))
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .map(round_px)
}

/// `n` evenly spaced values from `a` to `b` inclusive.
fn linspace(a: f64, b: f64, n: usize) -> impl Iterator<Item = f64> {
    let step = if n > 1 { (b - a) / (n - 1) as f64 } else { 0.0 };
    (0..n).map(move |i| a + step * i as f64)
}

/// Project the sheet markings with `h_img_from_sheet` (sheet feet to pixels).
pub fn project_reference_geometry(
    h_img_from_sheet: &Homography,
    dims: &SheetDimensions,
) -> ReferenceOverlay {
    let vertical = |name: &str, x_ft: f64| ProjectedLine {
        name: name.to_string(),
        points: linspace(0.0, dims.length, dims.center_line_samples)
            .filter_map(|y| project(h_img_from_sheet, x_ft, y))
            .collect(),
    };
    let horizontal = |name: &str, y_ft: f64| ProjectedLine {
        name: name.to_string(),
        points: linspace(0.0, dims.width, dims.cross_line_samples)
            .filter_map(|x| project(h_img_from_sheet, x, y_ft))
            .collect(),
    };

    let lines = vec![
        vertical("center_line", dims.width / 2.0),
        horizontal("hog_far", dims.hog_line),
        horizontal("hog_near", dims.length - dims.hog_line),
        horizontal("tee_far", dims.tee_line),
        horizontal("tee_near", dims.length - dims.tee_line),
        horizontal("back_far", dims.back_line),
        horizontal("back_near", dims.length - dims.back_line),
    ];

    let mut house_circles = Vec::with_capacity(2 * dims.house_rings.len());
    for (end, center_y) in [("far", dims.tee_line), ("near", dims.length - dims.tee_line)] {
        let Some(center) = project(h_img_from_sheet, dims.width / 2.0, center_y) else {
            continue;
        };
        for (name, radius) in &dims.house_rings {
            let Some(edge) = project(h_img_from_sheet, dims.width / 2.0 + radius, center_y) else {
                continue;
            };
            let r = ((center[0] - edge[0]) as f64).hypot((center[1] - edge[1]) as f64);
            house_circles.push(HouseCircle {
                end: end.to_string(),
                name: name.clone(),
                center,
                radius_px: r.round_ties_even() as i64,
            });
        }
    }

    ReferenceOverlay {
        lines,
        house_circles,
    }
}

/// Feature summary for an auto-calibrated run.
pub fn summarize_features(corners: &[Point2<f64>; 4], overlay: &ReferenceOverlay) -> AutoFeatures {
    let ends = |name: &str| overlay.line(name).and_then(ProjectedLine::endpoints);
    let pair = |prefix: &str| FarNear {
        far: ends(&format!("{prefix}_far")),
        near: ends(&format!("{prefix}_near")),
    };
    AutoFeatures {
        sheet_corners: (*corners).map(round_px),
        center_line: ends("center_line"),
        hog_lines: pair("hog"),
        tee_lines: pair("tee"),
        back_lines: pair("back"),
        house_circles: overlay.house_circles.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 10 px per foot, sheet origin at (50, 20).
    fn scale_h() -> Homography {
        Homography::from_array([[10.0, 0.0, 50.0], [0.0, 10.0, 20.0], [0.0, 0.0, 1.0]])
    }

    #[test]
    fn projects_seven_lines_and_eight_rings() {
        let dims = SheetDimensions::default();
        let overlay = project_reference_geometry(&scale_h(), &dims);
        let names: Vec<&str> = overlay.lines.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "center_line",
                "hog_far",
                "hog_near",
                "tee_far",
                "tee_near",
                "back_far",
                "back_near"
            ]
        );
        assert_eq!(overlay.line("center_line").unwrap().points.len(), 200);
        assert_eq!(overlay.line("tee_far").unwrap().points.len(), 160);
        assert_eq!(overlay.house_circles.len(), 8);
    }

    #[test]
    fn lines_land_at_their_offsets() {
        let overlay = project_reference_geometry(&scale_h(), &SheetDimensions::default());
        let center = overlay.line("center_line").unwrap();
        assert_eq!(center.points[0], [122, 20]);
        assert_eq!(*center.points.last().unwrap(), [122, 1480]);

        let hog_near = overlay.line("hog_near").unwrap();
        assert!(hog_near.points.iter().all(|p| p[1] == 20 + 1090));
        assert_eq!(hog_near.points[0][0], 50);
        assert_eq!(hog_near.points.last().unwrap()[0], 195);
    }

    #[test]
    fn ring_radii_follow_scale() {
        let overlay = project_reference_geometry(&scale_h(), &SheetDimensions::default());
        let near_12: &HouseCircle = overlay
            .house_circles
            .iter()
            .find(|c| c.end == "near" && c.name == "12ft")
            .unwrap();
        // 122.5 rounds half to even
        assert_eq!(near_12.center, [122, 1320]);
        assert_eq!(near_12.radius_px, 60);
        let button = overlay
            .house_circles
            .iter()
            .find(|c| c.end == "far" && c.name == "button")
            .unwrap();
        assert_eq!(button.radius_px, 6);
    }

    #[test]
    fn summary_uses_line_endpoints() {
        let dims = SheetDimensions::default();
        let corners = dims.canonical_corners().map(|p| Point2::new(p.x * 10.0 + 50.0, p.y * 10.0 + 20.0));
        let overlay = project_reference_geometry(&scale_h(), &dims);
        let f = summarize_features(&corners, &overlay);
        assert_eq!(f.sheet_corners[2], [195, 1480]);
        assert_eq!(f.tee_lines.far.unwrap().start, [50, 180]);
        assert_eq!(f.house_circles.len(), 8);
        let json = serde_json::to_value(&f).unwrap();
        assert!(json["back_lines"]["near"]["end"].is_array());
    }
}
