//! Facade crate for the `sheetcam-*` workspace.
//!
//! This crate provides:
//! - re-exports of the geometry core, the calibration crate and the capture
//!   crate under short module names
//! - the end-to-end helpers in [`workflow`] used by the `sheetcam` binary
//!
//! ## Quickstart
//!
//! ```no_run
//! use sheetcam::calib::{CalibrationOptions, CalibrationSession};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // No lines given: the sheet outline is detected and its markings are used.
//! let session = CalibrationSession::run(
//!     "sheet_b.jpg",
//!     None,
//!     &CalibrationOptions::default(),
//!     "sessions/sheet_b",
//! )?;
//! println!("fit error {:.3}", session.report.fit_error);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `sheetcam::core`: intrinsics, distortion, homographies, crop windows,
//!   rectification profiles and the [`Rectifier`].
//! - `sheetcam::calib`: line residuals, the distortion grid search, the
//!   sheet detector, reference markings and calibration sessions.
//! - `sheetcam::capture`: frame sources, sinks, change detection and the
//!   capture loop.

pub use sheetcam_calib as calib;
pub use sheetcam_capture as capture;
pub use sheetcam_core as core;

pub use sheetcam_calib::{CalibError, CalibrationOptions, CalibrationSession};
pub use sheetcam_capture::{CaptureConfig, CaptureLoop, CaptureSummary};
pub use sheetcam_core::{CalibrationArtifact, RectificationProfile, Rectifier};

pub mod workflow;
