//! `sheetcam` CLI: detect, calibrate, review, set-warp and capture.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use nalgebra::Point2;
use sheetcam::calib::{
    load_image, CalibrationOptions, CalibrationSession, CropMode, DetectorParams, LineSet,
    SheetDimensions, SolverGrid, DEFAULT_WARP_SIZE,
};
use sheetcam::capture::{CaptureConfig, SourceConfig};
use sheetcam::workflow::{detect_sheet, run_capture, set_profile_warp};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "sheetcam")]
#[command(about = "Calibrate overhead curling sheet cameras and capture rectified frames")]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Emit logs as JSON lines (needs the `tracing` feature).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the sheet outline and project its markings.
    Detect(DetectArgs),

    /// Estimate a rectification profile from one photo.
    Calibrate(CalibrateArgs),

    /// Accept or reject a pending calibration session.
    Review(ReviewArgs),

    /// Add a four-corner perspective warp to an existing profile.
    SetWarp(SetWarpArgs),

    /// Poll a camera and store frames that changed.
    Capture(CaptureArgs),
}

#[derive(Debug, Args)]
struct DetectArgs {
    /// Photo of the sheet.
    #[arg(long)]
    image: PathBuf,

    /// Write the report here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Detector parameters (JSON).
    #[arg(long)]
    params: Option<PathBuf>,

    /// Sheet dimensions in feet (JSON).
    #[arg(long)]
    sheet: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct CalibrateArgs {
    /// Photo of the sheet.
    #[arg(long)]
    image: PathBuf,

    /// Session directory for the profile, report and previews.
    #[arg(long)]
    session_dir: PathBuf,

    /// Reference lines as `{"lines": [[[x, y], ...], ...]}`. Omit to detect
    /// the sheet and use its markings.
    #[arg(long)]
    lines: Option<PathBuf>,

    /// Full calibration options (JSON).
    #[arg(long)]
    options: Option<PathBuf>,

    /// Search grid override (JSON), applied on top of `--options`.
    #[arg(long)]
    grid: Option<PathBuf>,

    /// How the crop window is derived from the lines.
    #[arg(long, value_enum)]
    crop_mode: Option<CropModeArg>,

    /// Crop inset in pixels.
    #[arg(long)]
    margin: Option<i64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CropModeArg {
    /// Convex hull of all undistorted points.
    Hull,
    /// Endpoints of each line only.
    Endpoints,
}

impl CropModeArg {
    fn to_core(self) -> CropMode {
        match self {
            Self::Hull => CropMode::Hull,
            Self::Endpoints => CropMode::Endpoints,
        }
    }
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("decision").required(true).args(["accept", "reject"])))]
struct ReviewArgs {
    #[arg(long)]
    session_dir: PathBuf,

    #[arg(long)]
    accept: bool,

    #[arg(long)]
    reject: bool,
}

#[derive(Debug, Args)]
struct SetWarpArgs {
    /// Profile to update in place.
    #[arg(long)]
    profile: PathBuf,

    /// Corners TL, TR, BR, BL as `x1,y1,x2,y2,x3,y3,x4,y4`, in the corrected
    /// and cropped frame.
    #[arg(long, value_delimiter = ',', num_args = 8, allow_hyphen_values = true)]
    corners: Vec<f64>,

    #[arg(long, default_value_t = DEFAULT_WARP_SIZE.0)]
    width: u32,

    #[arg(long, default_value_t = DEFAULT_WARP_SIZE.1)]
    height: u32,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("source").args(["still", "url", "device"])))]
struct CaptureArgs {
    /// Capture configuration (JSON). Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay one image file.
    #[arg(long)]
    still: Option<PathBuf>,

    /// HTTP snapshot endpoint.
    #[arg(long)]
    url: Option<String>,

    /// Local capture device index.
    #[arg(long)]
    device: Option<u32>,

    /// Calibration profile for rectification.
    #[arg(long)]
    profile: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// File name prefix for stored frames.
    #[arg(long)]
    name: Option<String>,

    /// Seconds between polls.
    #[arg(long)]
    interval: Option<f64>,

    /// Mean absolute difference needed to store a frame.
    #[arg(long)]
    threshold: Option<f64>,

    /// Stop after this many stored frames (0 = never).
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet, cli.log_json)?;

    match cli.command {
        Commands::Detect(args) => run_detect(&args),
        Commands::Calibrate(args) => run_calibrate(&args),
        Commands::Review(args) => run_review(&args),
        Commands::SetWarp(args) => run_set_warp(&args),
        Commands::Capture(args) => run_capture_cmd(&args),
    }
}

#[cfg(feature = "tracing")]
fn init_logging(verbose: u8, quiet: bool, json: bool) -> CliResult<()> {
    sheetcam::core::init_tracing(json, sheetcam::core::level_from_verbosity(verbose, quiet));
    // bridge `log` records if the subscriber did not
    let _ = tracing_log::LogTracer::init();
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(verbose: u8, quiet: bool, json: bool) -> CliResult<()> {
    if json {
        eprintln!("--log-json needs the `tracing` feature; using plain logs");
    }
    sheetcam::core::init_with_level(sheetcam::core::level_from_verbosity(verbose, quiet))?;
    Ok(())
}

// ── detect ──────────────────────────────────────────────────────────────

fn run_detect(args: &DetectArgs) -> CliResult<()> {
    let params = match &args.params {
        Some(p) => DetectorParams::load_json(p)?,
        None => DetectorParams::default(),
    };
    let dims = match &args.sheet {
        Some(p) => serde_json::from_str::<SheetDimensions>(&std::fs::read_to_string(p)?)?,
        None => SheetDimensions::default(),
    };
    let image = load_image(&args.image)?;
    let report = detect_sheet(&image, &params, &dims)?;
    let json = serde_json::to_string_pretty(&report)?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, json)?;
            log::info!("wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

// ── calibrate ───────────────────────────────────────────────────────────

fn run_calibrate(args: &CalibrateArgs) -> CliResult<()> {
    let mut options = match &args.options {
        Some(p) => CalibrationOptions::load_json(p)?,
        None => CalibrationOptions::default(),
    };
    if let Some(p) = &args.grid {
        options.grid = SolverGrid::load_json(p)?;
    }
    if let Some(mode) = args.crop_mode {
        options.crop.mode = mode.to_core();
    }
    if let Some(m) = args.margin {
        options.crop.margin = m;
    }
    let lines = args.lines.as_ref().map(LineSet::load_json).transpose()?;

    let session =
        CalibrationSession::run(&args.image, lines.as_ref(), &options, &args.session_dir)?;
    let (f, k1, k2) = session.report.metadata.best_combo;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "session_dir": session.dir,
            "profile": session.profile_path(),
            "status": session.report.status,
            "fit_error": session.report.fit_error,
            "best_combo": { "f_factor": f, "k1": k1, "k2": k2 },
            "crop_rect": session.report.crop_rect,
        }))?
    );
    Ok(())
}

// ── review ──────────────────────────────────────────────────────────────

fn run_review(args: &ReviewArgs) -> CliResult<()> {
    let mut session = CalibrationSession::open(&args.session_dir)?;
    if args.accept {
        session.accept()?;
    } else {
        session.reject()?;
    }
    println!("{}", serde_json::to_string(&session.report.status)?);
    Ok(())
}

// ── set-warp ────────────────────────────────────────────────────────────

fn parse_corners(values: &[f64]) -> CliResult<[Point2<f64>; 4]> {
    if values.len() != 8 {
        return Err(format!("expected 8 corner values, got {}", values.len()).into());
    }
    Ok([
        Point2::new(values[0], values[1]),
        Point2::new(values[2], values[3]),
        Point2::new(values[4], values[5]),
        Point2::new(values[6], values[7]),
    ])
}

fn run_set_warp(args: &SetWarpArgs) -> CliResult<()> {
    let corners = parse_corners(&args.corners)?;
    let artifact = set_profile_warp(&args.profile, &corners, (args.width, args.height))?;
    println!("{}", serde_json::to_string_pretty(&artifact)?);
    Ok(())
}

// ── capture ─────────────────────────────────────────────────────────────

impl CaptureArgs {
    fn to_config(&self) -> CliResult<CaptureConfig> {
        let mut cfg = match &self.config {
            Some(p) => CaptureConfig::load_json(p)?,
            None => CaptureConfig::default(),
        };
        if let Some(path) = &self.still {
            cfg.source = SourceConfig::Still { path: path.clone() };
        }
        if let Some(url) = &self.url {
            let timeout_secs = match &cfg.source {
                SourceConfig::Snapshot { timeout_secs, .. } => *timeout_secs,
                _ => 5.0,
            };
            cfg.source = SourceConfig::Snapshot {
                url: url.clone(),
                timeout_secs,
            };
        }
        if let Some(index) = self.device {
            cfg.source = SourceConfig::Device { index };
        }
        if let Some(p) = &self.profile {
            cfg.profile_path = Some(p.clone());
        }
        if let Some(dir) = &self.output_dir {
            cfg.output_dir = dir.clone();
        }
        if let Some(name) = &self.name {
            cfg.name = name.clone();
        }
        if let Some(secs) = self.interval {
            cfg.poll_interval_secs = secs;
        }
        if let Some(t) = self.threshold {
            cfg.change.threshold = t;
        }
        if let Some(n) = self.max_frames {
            cfg.max_frames = n;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn run_capture_cmd(args: &CaptureArgs) -> CliResult<()> {
    let cfg = args.to_config()?;
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    // SIGINT/SIGTERM end the loop through its normal exit so the source is released
    ctrlc::set_handler(move || {
        if !flag.swap(true, Ordering::SeqCst) {
            log::info!("stop requested, finishing the current poll");
        }
    })?;
    let summary = run_capture(&cfg, stop)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
