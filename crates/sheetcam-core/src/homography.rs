use image::RgbImage;
use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::raster::sample_bilinear_rgb;

/// Plane-to-plane projective transform, `dst ~ H * src`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 3]; 3]", into = "[[f64; 3]; 3]")]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_fn(|r, c| rows[r][c]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        std::array::from_fn(|r| std::array::from_fn(|c| self.h[(r, c)]))
    }

    /// Map a point through the transform. Returns `None` for points on the
    /// line at infinity.
    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if w.abs() < 1e-15 {
            return None;
        }
        Some(Point2::new(v[0] / w, v[1] / w))
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

impl From<[[f64; 3]; 3]> for Homography {
    fn from(rows: [[f64; 3]; 3]) -> Self {
        Self::from_array(rows)
    }
}

impl From<Homography> for [[f64; 3]; 3] {
    fn from(h: Homography) -> Self {
        h.to_array()
    }
}

/// Translate the four points to their centroid and scale them to a mean
/// distance of sqrt(2). Returns the conditioned points and the transform.
fn condition(pts: &[Point2<f64>; 4]) -> ([Point2<f64>; 4], Matrix3<f64>) {
    let centroid = pts.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / 4.0;
    let spread = pts.iter().map(|p| (p.coords - centroid).norm()).sum::<f64>() / 4.0;
    let s = if spread > 1e-12 {
        std::f64::consts::SQRT_2 / spread
    } else {
        1.0
    };
    let t = Matrix3::new(
        s, 0.0, -s * centroid.x, //
        0.0, s, -s * centroid.y, //
        0.0, 0.0, 1.0,
    );
    (pts.map(|p| Point2::from((p.coords - centroid) * s)), t)
}

/// Compute H such that `dst ~ H * src` from exactly four correspondences.
///
/// Solves the 8x8 system with h33 = 1 on conditioned points. Corner order
/// must match between `src` and `dst`. Returns `None` for degenerate input
/// such as three collinear points.
pub fn homography_from_4pt(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Homography> {
    let (src_c, t_src) = condition(src);
    let (dst_c, t_dst) = condition(dst);

    // Each pair contributes
    //   [x y 1 0 0 0 -ux -uy] h = u
    //   [0 0 0 x y 1 -vx -vy] h = v
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (k, (p, q)) in src_c.iter().zip(dst_c.iter()).enumerate() {
        for (row, target) in [(2 * k, q.x), (2 * k + 1, q.y)] {
            let offset = if row % 2 == 0 { 0 } else { 3 };
            a[(row, offset)] = p.x;
            a[(row, offset + 1)] = p.y;
            a[(row, offset + 2)] = 1.0;
            a[(row, 6)] = -target * p.x;
            a[(row, 7)] = -target * p.y;
            b[row] = target;
        }
    }

    let sol = a.lu().solve(&b)?;
    if sol.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let h_c = Matrix3::new(
        sol[0], sol[1], sol[2], //
        sol[3], sol[4], sol[5], //
        sol[6], sol[7], 1.0,
    );

    let h = t_dst.try_inverse()? * h_c * t_src;
    let scale = h[(2, 2)];
    if scale.abs() < 1e-12 {
        return None;
    }
    let h = h / scale;
    if h.determinant().abs() < 1e-15 {
        return None;
    }
    Some(Homography::new(h))
}

/// Warp `src` into an `out_w x out_h` image. For every output pixel the
/// source position is `h_src_from_out * (x, y)`; pixel centres sit on integer
/// coordinates and samples outside the source are black.
pub fn warp_perspective_rgb(
    src: &RgbImage,
    h_src_from_out: &Homography,
    out_w: u32,
    out_h: u32,
) -> RgbImage {
    let mut out = RgbImage::new(out_w, out_h);
    for (x, y, px) in out.enumerate_pixels_mut() {
        if let Some(p) = h_src_from_out.apply(Point2::new(x as f64, y as f64)) {
            *px = sample_bilinear_rgb(src, p.x as f32, p.y as f32);
        }
    }
    out
}
