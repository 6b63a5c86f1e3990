//! Pinhole intrinsics, Brown-Conrady distortion and undistortion helpers.
//!
//! Pixel coordinates follow the usual raster convention: pixel centres sit on
//! integer coordinates, `x` grows to the right and `y` grows downwards.

use image::RgbImage;
use nalgebra::{Matrix3, Point2};
use serde::{Deserialize, Serialize};

use crate::raster::sample_bilinear_rgb;

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Square pixels with the principal point at the image centre.
    pub fn centered(f: f64, width: u32, height: u32) -> Self {
        Self {
            fx: f,
            fy: f,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Read intrinsics back from a 3x3 matrix. Skew is ignored.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Self {
        Self {
            fx: rows[0][0],
            fy: rows[1][1],
            cx: rows[0][2],
            cy: rows[1][2],
        }
    }

    pub fn to_rows(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, 0.0, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    #[inline]
    pub fn pixel_to_normalized(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }

    #[inline]
    pub fn normalized_to_pixel(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new(self.fx * p.x + self.cx, self.fy * p.y + self.cy)
    }
}

/// Brown-Conrady coefficients in the conventional `(k1, k2, p1, p2, k3)` order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    /// Radial-only model with tangential and higher-order terms at zero.
    pub fn radial(k1: f64, k2: f64) -> Self {
        Self {
            k1,
            k2,
            ..Self::default()
        }
    }

    pub fn from_coeffs(c: [f64; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }

    pub fn to_coeffs(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn is_zero(&self) -> bool {
        self.to_coeffs().iter().all(|c| *c == 0.0)
    }

    pub fn distort_normalized(&self, p: Point2<f64>) -> Point2<f64> {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r4 * r2;
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        Point2::new(x * radial + dx, y * radial + dy)
    }
}

/// Fixed-point iteration settings for inverting the distortion model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UndistortConfig {
    pub max_iters: usize,
    pub eps: f64,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        Self {
            max_iters: 20,
            eps: 1e-12,
        }
    }
}

/// Intrinsics plus distortion of one physical camera.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LensModel {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
}

impl LensModel {
    pub fn new(intrinsics: CameraIntrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Undistort normalized coordinates. `None` when the iteration leaves the
    /// finite range.
    pub fn undistort_normalized(&self, xd: Point2<f64>, cfg: UndistortConfig) -> Option<Point2<f64>> {
        let d = &self.distortion;
        let (mut x, mut y) = (xd.x, xd.y);
        for _ in 0..cfg.max_iters.max(1) {
            let r2 = x * x + y * y;
            let r4 = r2 * r2;
            let radial = 1.0 + d.k1 * r2 + d.k2 * r4 + d.k3 * r4 * r2;
            if !radial.is_finite() || radial.abs() < 1e-12 {
                return None;
            }
            let dx_tan = 2.0 * d.p1 * x * y + d.p2 * (r2 + 2.0 * x * x);
            let dy_tan = d.p1 * (r2 + 2.0 * y * y) + 2.0 * d.p2 * x * y;
            let x_next = (xd.x - dx_tan) / radial;
            let y_next = (xd.y - dy_tan) / radial;
            if !x_next.is_finite() || !y_next.is_finite() {
                return None;
            }
            let step = (x_next - x).hypot(y_next - y);
            x = x_next;
            y = y_next;
            if step <= cfg.eps {
                break;
            }
        }
        Some(Point2::new(x, y))
    }

    /// Undistort a raw pixel and re-project it with `target` intrinsics.
    ///
    /// Passing `self.intrinsics` keeps the result in the source pixel frame;
    /// passing an optimal matrix puts it in the corrected image frame.
    pub fn undistort_pixel(
        &self,
        p: Point2<f64>,
        target: &CameraIntrinsics,
        cfg: UndistortConfig,
    ) -> Option<Point2<f64>> {
        let xd = self.intrinsics.pixel_to_normalized(p);
        let xu = self.undistort_normalized(xd, cfg)?;
        let out = target.normalized_to_pixel(xu);
        (out.x.is_finite() && out.y.is_finite()).then_some(out)
    }

    /// Undistort every point; fails as a whole if any point diverges.
    pub fn undistort_pixels(
        &self,
        points: &[Point2<f64>],
        target: &CameraIntrinsics,
        cfg: UndistortConfig,
    ) -> Option<Vec<Point2<f64>>> {
        points
            .iter()
            .map(|&p| self.undistort_pixel(p, target, cfg))
            .collect()
    }

    /// Map an undistorted normalized point to the raw image.
    pub fn distort_to_pixel(&self, xu: Point2<f64>) -> Point2<f64> {
        self.intrinsics
            .normalized_to_pixel(self.distortion.distort_normalized(xu))
    }

    /// New camera matrix for undistorting a `width x height` image.
    ///
    /// `alpha = 0` keeps only valid pixels, `alpha = 1` keeps the whole source
    /// field of view (black borders allowed). The source border is sampled on
    /// a 9x9 grid, undistorted, and the inner/outer rectangles are mapped onto
    /// the output viewport.
    pub fn optimal_intrinsics(
        &self,
        width: u32,
        height: u32,
        alpha: f64,
        cfg: UndistortConfig,
    ) -> Option<CameraIntrinsics> {
        const N: usize = 9;
        let w = width as f64;
        let h = height as f64;
        let mut grid = [[Point2::origin(); N]; N];
        for (i, row) in grid.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                let p = Point2::new(
                    j as f64 * (w - 1.0) / (N - 1) as f64,
                    i as f64 * (h - 1.0) / (N - 1) as f64,
                );
                *cell = self.undistort_normalized(self.intrinsics.pixel_to_normalized(p), cfg)?;
            }
        }

        let (mut ox0, mut oy0) = (f64::MAX, f64::MAX);
        let (mut ox1, mut oy1) = (f64::MIN, f64::MIN);
        let (mut ix0, mut iy0) = (f64::MIN, f64::MIN);
        let (mut ix1, mut iy1) = (f64::MAX, f64::MAX);
        for (i, row) in grid.iter().enumerate() {
            for (j, p) in row.iter().enumerate() {
                ox0 = ox0.min(p.x);
                oy0 = oy0.min(p.y);
                ox1 = ox1.max(p.x);
                oy1 = oy1.max(p.y);
                if j == 0 {
                    ix0 = ix0.max(p.x);
                }
                if j == N - 1 {
                    ix1 = ix1.min(p.x);
                }
                if i == 0 {
                    iy0 = iy0.max(p.y);
                }
                if i == N - 1 {
                    iy1 = iy1.min(p.y);
                }
            }
        }

        let (ow, oh) = (ox1 - ox0, oy1 - oy0);
        let (iw, ih) = (ix1 - ix0, iy1 - iy0);
        if ow <= 1e-12 || oh <= 1e-12 || iw <= 1e-12 || ih <= 1e-12 {
            return None;
        }

        let fx0 = (w - 1.0) / iw;
        let fy0 = (h - 1.0) / ih;
        let fx1 = (w - 1.0) / ow;
        let fy1 = (h - 1.0) / oh;
        let lerp = |a: f64, b: f64| a * (1.0 - alpha) + b * alpha;

        let out = CameraIntrinsics {
            fx: lerp(fx0, fx1),
            fy: lerp(fy0, fy1),
            cx: lerp(-fx0 * ix0, -fx1 * ox0),
            cy: lerp(-fy0 * iy0, -fy1 * oy0),
        };
        out.is_valid().then_some(out)
    }

    /// Precompute the per-pixel source lookup for undistorting a
    /// `width x height` frame into the `target` pixel frame.
    pub fn undistort_map(&self, target: &CameraIntrinsics, width: u32, height: u32) -> UndistortMap {
        let mut coords = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let xu = target.pixel_to_normalized(Point2::new(x as f64, y as f64));
                let src = self.distort_to_pixel(xu);
                coords.push([src.x as f32, src.y as f32]);
            }
        }
        UndistortMap {
            width,
            height,
            coords,
        }
    }
}

/// Source sampling positions for every output pixel, row-major.
#[derive(Debug, Clone)]
pub struct UndistortMap {
    pub width: u32,
    pub height: u32,
    coords: Vec<[f32; 2]>,
}

impl UndistortMap {
    #[inline]
    pub fn source_of(&self, x: u32, y: u32) -> [f32; 2] {
        self.coords[y as usize * self.width as usize + x as usize]
    }

    /// Apply the map. The output has the map's size regardless of `src`.
    pub fn remap(&self, src: &RgbImage) -> RgbImage {
        let mut out = RgbImage::new(self.width, self.height);
        for (x, y, px) in out.enumerate_pixels_mut() {
            let [sx, sy] = self.source_of(x, y);
            *px = sample_bilinear_rgb(src, sx, sy);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lens(k1: f64, k2: f64) -> LensModel {
        LensModel::new(
            CameraIntrinsics::centered(640.0, 640, 480),
            Distortion::radial(k1, k2),
        )
    }

    #[test]
    fn undistort_inverts_distort() {
        let model = lens(-0.2, 0.05);
        let xu = Point2::new(0.31, -0.22);
        let raw = model.distort_to_pixel(xu);
        let back = model
            .undistort_pixel(raw, &model.intrinsics, UndistortConfig::default())
            .unwrap();
        let expected = model.intrinsics.normalized_to_pixel(xu);
        assert_relative_eq!(back.x, expected.x, epsilon = 1e-6);
        assert_relative_eq!(back.y, expected.y, epsilon = 1e-6);
    }

    #[test]
    fn optimal_matrix_is_identity_without_distortion() {
        let model = lens(0.0, 0.0);
        let k = model
            .optimal_intrinsics(640, 480, 1.0, UndistortConfig::default())
            .unwrap();
        assert_relative_eq!(k.fx, 640.0, epsilon = 1e-9);
        assert_relative_eq!(k.fy, 640.0, epsilon = 1e-9);
        assert_relative_eq!(k.cx, 320.0, epsilon = 1e-9);
        assert_relative_eq!(k.cy, 240.0, epsilon = 1e-9);
    }

    #[test]
    fn barrel_correction_keeps_full_view_at_alpha_one() {
        let model = lens(-0.2, 0.0);
        let k = model
            .optimal_intrinsics(640, 480, 1.0, UndistortConfig::default())
            .unwrap();
        // undistorting barrel pushes the border outwards, so the whole view
        // only fits with a shorter focal length
        assert!(k.fx < 640.0);
        let corner = model
            .undistort_pixel(Point2::new(0.0, 0.0), &k, UndistortConfig::default())
            .unwrap();
        assert!(corner.x >= -1e-6 && corner.y >= -1e-6);
    }

    #[test]
    fn coefficient_order_is_k1_k2_p1_p2_k3() {
        let d = Distortion::from_coeffs([0.1, 0.2, 0.3, 0.4, 0.5]);
        assert_eq!(d.k1, 0.1);
        assert_eq!(d.p2, 0.4);
        assert_eq!(d.to_coeffs(), [0.1, 0.2, 0.3, 0.4, 0.5]);
    }

    #[test]
    fn identity_map_reproduces_image() {
        let model = lens(0.0, 0.0);
        let mut img = RgbImage::new(16, 12);
        img.put_pixel(7, 5, image::Rgb([10, 20, 30]));
        let map = model.undistort_map(&model.intrinsics, 16, 12);
        assert_eq!(map.remap(&img), img);
    }
}
