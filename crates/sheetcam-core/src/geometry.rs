use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Axis-aligned integer window `(x, y, width, height)`.
///
/// Serialized as `[x, y, w, h]`. Width and height are always at least 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[u32; 4]", into = "[u32; 4]")]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("crop rectangle must have non-zero size (got {width}x{height})")]
pub struct EmptyCropRect {
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Result<Self, EmptyCropRect> {
        if width == 0 || height == 0 {
            return Err(EmptyCropRect { width, height });
        }
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    #[inline]
    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    #[inline]
    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// `true` when the window lies entirely inside a `width x height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width as u64 && self.bottom() <= height as u64
    }

    /// Clamp a signed box into a `width x height` image, keeping at least one
    /// pixel in each direction.
    pub fn clamped(x: i64, y: i64, w: i64, h: i64, width: u32, height: u32) -> Self {
        let (img_w, img_h) = (width.max(1) as i64, height.max(1) as i64);
        let x = x.clamp(0, img_w - 1);
        let y = y.clamp(0, img_h - 1);
        let w = w.min(img_w - x).max(1);
        let h = h.min(img_h - y).max(1);
        Self {
            x: x as u32,
            y: y as u32,
            width: w as u32,
            height: h as u32,
        }
    }
}

impl TryFrom<[u32; 4]> for CropRect {
    type Error = EmptyCropRect;

    fn try_from(v: [u32; 4]) -> Result<Self, Self::Error> {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<CropRect> for [u32; 4] {
    fn from(r: CropRect) -> Self {
        [r.x, r.y, r.width, r.height]
    }
}

/// Integer bounding box of a point set, as `(x, y, w, h)`.
///
/// Uses the raster convention for real-valued points: the box spans from
/// `floor(min)` to `floor(max)` inclusive.
pub fn bounding_box(points: &[Point2<f64>]) -> Option<(i64, i64, i64, i64)> {
    let first = points.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    if ![x0, y0, x1, y1].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (xi, yi) = (x0.floor() as i64, y0.floor() as i64);
    Some((xi, yi, x1.floor() as i64 - xi + 1, y1.floor() as i64 - yi + 1))
}

#[inline]
fn cross(o: Point2<f64>, a: Point2<f64>, b: Point2<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull (Andrew's monotone chain), counter-clockwise in a y-up frame,
/// without repeated end point. Collinear boundary points are dropped.
pub fn convex_hull(points: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let mut pts: Vec<Point2<f64>> = points
        .iter()
        .copied()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .collect();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut hull: Vec<Point2<f64>> = Vec::with_capacity(pts.len() * 2);
    for &p in &pts {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hull_drops_interior_points() {
        let pts = vec![
            Point2::new(0.0, 0.0),
            Point2::new(4.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(4.0, 3.0),
            Point2::new(1.0, 2.0),
            Point2::new(0.0, 3.0),
        ];
        let hull = convex_hull(&pts);
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&Point2::new(2.0, 1.0)));
    }

    #[test]
    fn bounding_box_is_inclusive_of_floor_of_max() {
        let pts = [Point2::new(10.2, 5.0), Point2::new(20.0, 9.7)];
        assert_eq!(bounding_box(&pts), Some((10, 5, 11, 5)));
        assert_eq!(bounding_box(&[]), None);
    }

    #[test]
    fn clamped_rect_stays_inside_image() {
        let r = CropRect::clamped(-5, 470, 700, 40, 640, 480);
        assert_eq!(r, CropRect::new(0, 470, 640, 10).unwrap());
        assert!(r.fits_within(640, 480));

        let r = CropRect::clamped(900, 900, 10, 10, 640, 480);
        assert_eq!((r.x, r.y, r.width, r.height), (639, 479, 1, 1));
    }

    #[test]
    fn serializes_as_four_integers() {
        let r = CropRect::new(1, 2, 3, 4).unwrap();
        assert_eq!(serde_json::to_string(&r).unwrap(), "[1,2,3,4]");
        assert!(serde_json::from_str::<CropRect>("[1,2,0,4]").is_err());
    }
}
