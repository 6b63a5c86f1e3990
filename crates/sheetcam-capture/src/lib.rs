//! Change-triggered capture of rectified frames.
//!
//! One [`CaptureLoop`] per camera polls a [`FrameSource`], rectifies each
//! frame with an optional [`sheetcam_core::Rectifier`], compares it with the
//! last accepted frame through a [`ChangeDetector`], and hands accepted
//! frames to a [`FrameSink`].
//!
//! ```no_run
//! use sheetcam_capture::{CaptureConfig, CaptureLoop, SourceConfig};
//!
//! let cfg = CaptureConfig {
//!     source: SourceConfig::Still { path: "frame.jpg".into() },
//!     max_frames: 1,
//!     ..CaptureConfig::default()
//! };
//! let summary = CaptureLoop::from_config(&cfg)?.run()?;
//! println!("{summary:?}");
//! # Ok::<(), sheetcam_capture::CaptureError>(())
//! ```

mod capture_loop;
mod change;
mod config;
mod error;
mod sink;
pub mod source;

pub use capture_loop::{CaptureLoop, CaptureSummary, StopReason};
pub use change::{ChangeDecision, ChangeDetector, ChangeDetectorConfig};
pub use config::{CaptureConfig, SourceConfig};
pub use error::{CaptureError, SinkError, SourceError};
pub use sink::{
    ArtifactRef, DirectorySink, FrameSink, LATEST_FRAME_FILE, LATEST_RECTIFIED_FILE,
    RECTIFIED_DIR,
};
pub use source::{FrameSource, SourceGuard, StillImageSource};

#[cfg(feature = "device")]
pub use source::DeviceSource;
#[cfg(feature = "snapshot")]
pub use source::SnapshotSource;
