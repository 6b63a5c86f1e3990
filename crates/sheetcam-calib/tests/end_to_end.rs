use image::{Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use nalgebra::Point2;
use sheetcam_calib::{
    auto_calibrate, evaluate_lens, lens_for_combo, run_calibration, solve_distortion,
    CalibrationOptions, CalibrationSession, CropParams, LineSet, SessionStatus, SolverGrid,
    LINES_FILE, PROFILE_FILE, RECTIFIED_PREVIEW_FILE, REPORT_FILE, UNDISTORTED_PREVIEW_FILE,
};
use sheetcam_core::{CalibrationArtifact, CameraIntrinsics, Distortion, LensModel, UndistortConfig};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Three near-horizontal lines seen through a barrel lens with k1 = -0.12.
fn barrel_lines() -> Vec<Vec<Point2<f64>>> {
    let truth = LensModel::new(
        CameraIntrinsics::centered(640.0, 640, 480),
        Distortion::radial(-0.12, 0.0),
    );
    [(60.0, 0.02), (150.0, -0.01), (420.0, 0.015)]
        .iter()
        .map(|&(y0, slope)| {
            (0..25)
                .map(|i| {
                    let x = 20.0 + 25.0 * i as f64;
                    let ideal = Point2::new(x, y0 + slope * (x - 320.0));
                    truth.distort_to_pixel(truth.intrinsics.pixel_to_normalized(ideal))
                })
                .collect()
        })
        .collect()
}

fn rectangle_lines() -> Vec<Vec<Point2<f64>>> {
    let horizontal = |y: f64| -> Vec<Point2<f64>> {
        (0..=10).map(|i| Point2::new(100.0 + 20.0 * i as f64, y)).collect()
    };
    let vertical = |x: f64| -> Vec<Point2<f64>> {
        (0..=10).map(|i| Point2::new(x, 50.0 + 15.0 * i as f64)).collect()
    };
    vec![horizontal(50.0), horizontal(200.0), vertical(100.0), vertical(300.0)]
}

/// Light sheet-shaped quadrilateral on a dark background.
fn sheet_photo() -> RgbImage {
    let mut img = RgbImage::from_pixel(640, 480, Rgb([20, 24, 30]));
    let quad = [
        Point::new(250, 20),
        Point::new(390, 24),
        Point::new(400, 460),
        Point::new(240, 456),
    ];
    draw_polygon_mut(&mut img, &quad, Rgb([235, 235, 240]));
    img
}

#[test]
fn barrel_distortion_is_recovered_within_one_grid_step() {
    init_logging();
    let lines = barrel_lines();
    let sol = solve_distortion(
        &lines,
        (640, 480),
        &SolverGrid::default(),
        UndistortConfig::default(),
    )
    .unwrap();
    assert!(
        (sol.k1 - (-0.12)).abs() <= 0.05 + 1e-9,
        "k1 {} too far from -0.12",
        sol.k1
    );

    let baseline = evaluate_lens(
        &lines,
        &lens_for_combo((640, 480), 1.0, 0.0, 0.0),
        UndistortConfig::default(),
    )
    .unwrap();
    assert!(sol.residual < baseline, "{} !< {}", sol.residual, baseline);
}

#[test]
fn solver_is_deterministic() {
    let lines = barrel_lines();
    let grid = SolverGrid::default();
    let first = solve_distortion(&lines, (640, 480), &grid, UndistortConfig::default()).unwrap();
    for _ in 0..3 {
        let again = solve_distortion(&lines, (640, 480), &grid, UndistortConfig::default()).unwrap();
        assert_eq!(again.best_combo(), first.best_combo());
        assert_eq!(again.residual, first.residual);
    }
}

#[test]
fn undistorted_rectangle_lines_crop_to_the_rectangle() {
    init_logging();
    let img = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
    let result = run_calibration(&img, &rectangle_lines(), &CalibrationOptions::default()).unwrap();

    assert_eq!(result.solution.k1, 0.0);
    assert_eq!(result.solution.k2, 0.0);
    let r = result.crop_rect;
    assert_eq!((r.x, r.y, r.width, r.height), (100, 50, 201, 151));
    assert_eq!(result.cropped.dimensions(), (r.width, r.height));
    assert_eq!(result.undistorted.dimensions(), (640, 480));
}

#[test]
fn endpoint_crop_mode_insets_between_the_outer_lines() {
    init_logging();
    let img = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
    let lines: Vec<_> = rectangle_lines().into_iter().take(2).collect();
    let options = CalibrationOptions {
        crop: CropParams::legacy(),
        ..CalibrationOptions::default()
    };
    let r = run_calibration(&img, &lines, &options).unwrap().crop_rect;

    assert!((r.x as i64 - 104).abs() <= 2, "{r:?}");
    assert!((r.y as i64 - 54).abs() <= 2, "{r:?}");
    assert!((r.width as i64 - 192).abs() <= 2, "{r:?}");
    assert!((r.height as i64 - 142).abs() <= 2, "{r:?}");
}

#[test]
fn session_writes_artifacts_and_tracks_review_state() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("frame.png");
    RgbImage::from_pixel(640, 480, Rgb([90, 90, 90]))
        .save(&image_path)
        .unwrap();
    let session_dir = dir.path().join("session_1");

    let lines = LineSet::from_lines(&rectangle_lines());
    let mut session = CalibrationSession::run(
        &image_path,
        Some(&lines),
        &CalibrationOptions::default(),
        &session_dir,
    )
    .unwrap();

    for name in [
        PROFILE_FILE,
        LINES_FILE,
        REPORT_FILE,
        UNDISTORTED_PREVIEW_FILE,
        RECTIFIED_PREVIEW_FILE,
    ] {
        assert!(session_dir.join(name).is_file(), "{name} missing");
    }
    assert_eq!(session.report.status, SessionStatus::Pending);
    assert_eq!(session.report.metadata.line_count, 4);
    assert!(session.report.metadata.auto_features.is_none());

    let artifact = CalibrationArtifact::load_json(session.profile_path()).unwrap();
    assert_eq!(artifact.crop_rect, session.report.crop_rect);
    assert!(artifact.to_profile().is_ok());

    session.accept().unwrap();
    assert!(session.reject().is_err());
    let reopened = CalibrationSession::open(&session_dir).unwrap();
    assert_eq!(reopened.report.status, SessionStatus::Accepted);
}

#[test]
fn auto_calibration_projects_sheet_markings() {
    init_logging();
    let img = sheet_photo();
    let auto = auto_calibrate(&img, &CalibrationOptions::default()).unwrap();
    assert_eq!(auto.lines.len(), 7);
    assert_eq!(auto.features.house_circles.len(), 8);

    let corners = auto.features.sheet_corners;
    // top-left then bottom-right by coordinate sum
    assert!(corners[0][0] + corners[0][1] < corners[2][0] + corners[2][1]);
    // every projected point stays near the drawn sheet
    for line in &auto.lines {
        for p in line {
            assert!((230.0..=410.0).contains(&p.x) && (10.0..=470.0).contains(&p.y), "{p:?}");
        }
    }
}

#[test]
fn session_without_lines_runs_auto_calibration() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("sheet.png");
    sheet_photo().save(&image_path).unwrap();

    let session = CalibrationSession::run(
        &image_path,
        None,
        &CalibrationOptions::default(),
        dir.path().join("auto"),
    )
    .unwrap();
    assert_eq!(session.report.metadata.line_count, 7);
    assert!(session.report.metadata.auto_features.is_some());
    assert!(session.report.crop_rect.fits_within(640, 480));

    let saved = LineSet::load_json(dir.path().join("auto").join(LINES_FILE)).unwrap();
    assert_eq!(saved.lines.len(), 7);
}
