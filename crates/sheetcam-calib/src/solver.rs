//! Brute-force search for radial lens distortion.
//!
//! Every `(f, k1, k2)` combination of a small fixed grid is scored by
//! undistorting the reference lines and summing their straightness residual.
//! The grid is enumerated f-major, then k1, then k2, and the first combination
//! reaching the minimum wins, so the result depends only on the inputs.

use std::fs;
use std::path::Path;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use sheetcam_core::{CameraIntrinsics, Distortion, LensModel, UndistortConfig};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::CalibError;
use crate::residual::line_fit_residual;

/// Candidate values for the distortion search.
///
/// `f_factors` scale `max(width, height)` to give the focal length in pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverGrid {
    pub f_factors: Vec<f64>,
    pub k1_values: Vec<f64>,
    pub k2_values: Vec<f64>,
}

impl Default for SolverGrid {
    fn default() -> Self {
        Self {
            f_factors: vec![0.7, 0.8, 0.9, 1.0, 1.1],
            k1_values: vec![-0.30, -0.20, -0.15, -0.10, -0.05, 0.0],
            k2_values: vec![-0.10, -0.05, 0.0, 0.05],
        }
    }
}

impl SolverGrid {
    pub fn len(&self) -> usize {
        self.f_factors.len() * self.k1_values.len() * self.k2_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(f_factor, k1, k2)` at enumeration index `idx`.
    fn combo(&self, idx: usize) -> (f64, f64, f64) {
        let per_f = self.k1_values.len() * self.k2_values.len();
        let (fi, rest) = (idx / per_f, idx % per_f);
        let (k1i, k2i) = (rest / self.k2_values.len(), rest % self.k2_values.len());
        (self.f_factors[fi], self.k1_values[k1i], self.k2_values[k2i])
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

/// Best combination found by [`solve_distortion`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistortionSolution {
    pub lens: LensModel,
    pub f_factor: f64,
    pub k1: f64,
    pub k2: f64,
    /// Summed line residual at the selected combination, in pixels.
    pub residual: f64,
    /// Number of combinations that produced finite residuals.
    pub evaluated: usize,
}

impl DistortionSolution {
    /// `(f_factor, k1, k2)` of the selected grid cell.
    pub fn best_combo(&self) -> (f64, f64, f64) {
        (self.f_factor, self.k1, self.k2)
    }
}

/// Lens model for one grid cell: square pixels, principal point at the
/// image centre, radial terms only.
pub fn lens_for_combo(image_size: (u32, u32), f_factor: f64, k1: f64, k2: f64) -> LensModel {
    let (w, h) = image_size;
    let f = f_factor * w.max(h) as f64;
    LensModel::new(
        CameraIntrinsics::centered(f, w, h),
        Distortion::radial(k1, k2),
    )
}

/// Summed residual of `lines` after undistorting them with `lens`.
///
/// The corrected points stay in the source pixel frame. `None` when any
/// point fails to undistort.
pub fn evaluate_lens<L: AsRef<[Point2<f64>]>>(
    lines: &[L],
    lens: &LensModel,
    cfg: UndistortConfig,
) -> Option<f64> {
    let mut total = 0.0;
    for line in lines {
        let corrected = lens.undistort_pixels(line.as_ref(), &lens.intrinsics, cfg)?;
        total += line_fit_residual(&corrected);
    }
    total.is_finite().then_some(total)
}

/// Grid-search `(f, k1, k2)` minimizing the summed straightness residual.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(lines, grid, cfg), fields(lines = lines.len(), combos = grid.len()))
)]
pub fn solve_distortion<L: AsRef<[Point2<f64>]> + Sync>(
    lines: &[L],
    image_size: (u32, u32),
    grid: &SolverGrid,
    cfg: UndistortConfig,
) -> Result<DistortionSolution, CalibError> {
    if lines.iter().all(|l| l.as_ref().is_empty()) {
        return Err(CalibError::SolverInputEmpty);
    }
    if grid.is_empty() {
        return Err(CalibError::InputError("solver grid has no combinations".into()));
    }
    let (w, h) = image_size;
    if w == 0 || h == 0 {
        return Err(CalibError::InputError(format!(
            "invalid image size {w}x{h}"
        )));
    }

    let score = |idx: usize| -> Option<f64> {
        let (f, k1, k2) = grid.combo(idx);
        evaluate_lens(lines, &lens_for_combo(image_size, f, k1, k2), cfg)
    };

    let (best, evaluated) = search(grid.len(), score);
    let (residual, idx) = best.ok_or(CalibError::NoConvergentCombination)?;
    let (f_factor, k1, k2) = grid.combo(idx);
    log::info!(
        "distortion search: f={f_factor} k1={k1} k2={k2} residual={residual:.4} ({evaluated}/{} combos)",
        grid.len()
    );

    Ok(DistortionSolution {
        lens: lens_for_combo(image_size, f_factor, k1, k2),
        f_factor,
        k1,
        k2,
        residual,
        evaluated,
    })
}

#[cfg(not(feature = "rayon"))]
fn search(n: usize, score: impl Fn(usize) -> Option<f64>) -> (Option<(f64, usize)>, usize) {
    let mut best: Option<(f64, usize)> = None;
    let mut evaluated = 0;
    for idx in 0..n {
        let Some(r) = score(idx) else {
            log::trace!("combo {idx} diverged, skipped");
            continue;
        };
        evaluated += 1;
        if best.is_none_or(|(b, _)| r < b) {
            log::debug!("combo {idx}: new best residual {r:.4}");
            best = Some((r, idx));
        }
    }
    (best, evaluated)
}

/// Parallel variant. Reducing on `(residual, index)` keeps the
/// first-in-enumeration winner, matching the sequential search.
#[cfg(feature = "rayon")]
fn search(
    n: usize,
    score: impl Fn(usize) -> Option<f64> + Sync,
) -> (Option<(f64, usize)>, usize) {
    use rayon::prelude::*;

    let scored: Vec<(f64, usize)> = (0..n)
        .into_par_iter()
        .filter_map(|idx| score(idx).map(|r| (r, idx)))
        .collect();
    let best = scored.iter().copied().reduce(|a, b| {
        if b.0 < a.0 || (b.0 == a.0 && b.1 < a.1) {
            b
        } else {
            a
        }
    });
    (best, scored.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn straight_lines() -> Vec<Vec<Point2<f64>>> {
        (0..3)
            .map(|j| {
                (0..20)
                    .map(|i| Point2::new(20.0 + 30.0 * i as f64, 80.0 + 150.0 * j as f64))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn default_grid_matches_documented_values() {
        let g = SolverGrid::default();
        assert_eq!(g.len(), 120);
        assert_eq!(g.combo(0), (0.7, -0.30, -0.10));
        assert_eq!(g.combo(1), (0.7, -0.30, -0.05));
        assert_eq!(g.combo(4), (0.7, -0.20, -0.10));
        assert_eq!(g.combo(119), (1.1, 0.0, 0.05));
    }

    #[test]
    fn empty_input_is_rejected() {
        let none: Vec<Vec<Point2<f64>>> = Vec::new();
        assert!(matches!(
            solve_distortion(&none, (640, 480), &SolverGrid::default(), UndistortConfig::default()),
            Err(CalibError::SolverInputEmpty)
        ));
        let empties: Vec<Vec<Point2<f64>>> = vec![Vec::new(), Vec::new()];
        assert!(matches!(
            solve_distortion(&empties, (640, 480), &SolverGrid::default(), UndistortConfig::default()),
            Err(CalibError::SolverInputEmpty)
        ));
    }

    #[test]
    fn straight_input_prefers_zero_distortion() {
        let lines = straight_lines();
        let grid = SolverGrid {
            f_factors: vec![1.0],
            k1_values: vec![-0.2, 0.0],
            k2_values: vec![0.0],
        };
        let sol = solve_distortion(&lines, (640, 480), &grid, UndistortConfig::default()).unwrap();
        assert_eq!(sol.k1, 0.0);
        assert_eq!(sol.evaluated, 2);
        assert_abs_diff_eq!(sol.residual, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn ties_keep_first_enumerated_combo() {
        // with k1 = k2 = 0 every focal length is the identity, so all of them tie
        let lines = straight_lines();
        let grid = SolverGrid {
            f_factors: vec![0.9, 0.7, 1.1],
            k1_values: vec![0.0],
            k2_values: vec![0.0],
        };
        let sol = solve_distortion(&lines, (640, 480), &grid, UndistortConfig::default()).unwrap();
        assert_eq!(sol.f_factor, 0.9);
        assert_eq!(sol.lens.intrinsics.fx, 0.9 * 640.0);
    }

    #[test]
    fn repeated_runs_agree() {
        let lines: Vec<Vec<Point2<f64>>> = vec![
            vec![
                Point2::new(30.0, 60.0),
                Point2::new(200.0, 52.0),
                Point2::new(400.0, 51.0),
                Point2::new(610.0, 61.0),
            ],
            vec![
                Point2::new(25.0, 400.0),
                Point2::new(320.0, 412.0),
                Point2::new(615.0, 399.0),
            ],
        ];
        let grid = SolverGrid::default();
        let a = solve_distortion(&lines, (640, 480), &grid, UndistortConfig::default()).unwrap();
        let b = solve_distortion(&lines, (640, 480), &grid, UndistortConfig::default()).unwrap();
        assert_eq!(a, b);
        assert!(a.evaluated > 0 && a.evaluated <= 120);
    }

    #[test]
    fn grid_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");
        let grid = SolverGrid {
            f_factors: vec![1.0],
            ..SolverGrid::default()
        };
        grid.write_json(&path).unwrap();
        assert_eq!(SolverGrid::load_json(&path).unwrap(), grid);

        let partial: SolverGrid = serde_json::from_str(r#"{"k2_values": [0.0]}"#).unwrap();
        assert_eq!(partial.f_factors.len(), 5);
        assert_eq!(partial.k2_values, vec![0.0]);
    }
}
