use nalgebra::{Matrix2, Point2, SymmetricEigen, Vector2};

/// RMS distance of `points` from their total-least-squares line.
///
/// The line passes through the centroid along the major axis of the point
/// covariance; the residual is measured along the minor axis. Fewer than two
/// points have no meaningful line and score 0.
pub fn line_fit_residual(points: &[Point2<f64>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len() as f64;
    let centroid = points
        .iter()
        .fold(Vector2::zeros(), |acc, p| acc + p.coords)
        / n;

    let mut cov = Matrix2::zeros();
    for p in points {
        let d = p.coords - centroid;
        cov += d * d.transpose();
    }

    let eig = SymmetricEigen::new(cov);
    let minor = if eig.eigenvalues[0] <= eig.eigenvalues[1] {
        0
    } else {
        1
    };
    let normal: Vector2<f64> = eig.eigenvectors.column(minor).into_owned();

    let sum_sq: f64 = points
        .iter()
        .map(|p| {
            let dist = (p.coords - centroid).dot(&normal);
            dist * dist
        })
        .sum();
    (sum_sq / n).sqrt()
}

/// Sum of [`line_fit_residual`] over every line.
pub fn total_residual<L: AsRef<[Point2<f64>]>>(lines: &[L]) -> f64 {
    lines.iter().map(|l| line_fit_residual(l.as_ref())).sum()
}
