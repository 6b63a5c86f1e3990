//! The per-camera poll loop: read, rectify, compare, persist, sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use sheetcam_core::{Frame, Rectifier};

use crate::change::{ChangeDecision, ChangeDetector, ChangeDetectorConfig};
use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::sink::{DirectorySink, FrameSink};
use crate::source::{FrameSource, SourceGuard};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The stop flag was raised.
    Stopped,
    /// `max_frames` accepted frames were reached.
    MaxFrames,
}

/// Counters for one [`CaptureLoop::run`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSummary {
    pub polls: u64,
    pub read_failures: u64,
    /// Frames dropped because rectification failed (stale crop etc).
    pub crop_failures: u64,
    pub accepted: u64,
    pub sink_failures: u64,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PollOutcome {
    ReadFailed,
    RectifyFailed,
    Skipped,
    Accepted { sink_ok: bool },
}

/// Owns one source, its change detector and its sink.
pub struct CaptureLoop<S, K> {
    source: S,
    sink: K,
    rectifier: Option<Rectifier>,
    detector: ChangeDetector,
    poll_interval: Duration,
    max_frames: u64,
    stop: Arc<AtomicBool>,
}

impl<S: FrameSource, K: FrameSink> CaptureLoop<S, K> {
    pub fn new(source: S, sink: K) -> Self {
        Self {
            source,
            sink,
            rectifier: None,
            detector: ChangeDetector::new(ChangeDetectorConfig::default()),
            poll_interval: Duration::from_secs(1),
            max_frames: 0,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_rectifier(mut self, rectifier: Option<Rectifier>) -> Self {
        self.rectifier = rectifier;
        self
    }

    pub fn with_change_config(mut self, config: ChangeDetectorConfig) -> Self {
        self.detector = ChangeDetector::new(config);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// 0 disables the limit.
    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Share an existing stop flag (e.g. one set from a Ctrl-C handler).
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Poll until stopped or `max_frames` is reached.
    ///
    /// Only a failing `open` is an error. Read, rectify and sink failures
    /// are logged, counted, and the loop carries on. The source is released
    /// on every exit path.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "info", skip_all))]
    pub fn run(&mut self) -> Result<CaptureSummary, CaptureError> {
        let Self {
            source,
            sink,
            rectifier,
            detector,
            poll_interval,
            max_frames,
            stop,
        } = self;

        let mut source = SourceGuard::open(source).map_err(CaptureError::Open)?;
        let mut summary = CaptureSummary {
            polls: 0,
            read_failures: 0,
            crop_failures: 0,
            accepted: 0,
            sink_failures: 0,
            stop_reason: StopReason::Stopped,
        };

        loop {
            if stop.load(Ordering::Relaxed) {
                summary.stop_reason = StopReason::Stopped;
                break;
            }

            summary.polls += 1;
            match poll_once(&mut *source, rectifier.as_ref(), detector, sink) {
                PollOutcome::ReadFailed => summary.read_failures += 1,
                PollOutcome::RectifyFailed => summary.crop_failures += 1,
                PollOutcome::Skipped => {}
                PollOutcome::Accepted { sink_ok } => {
                    summary.accepted += 1;
                    if !sink_ok {
                        summary.sink_failures += 1;
                    }
                }
            }

            if *max_frames > 0 && summary.accepted >= *max_frames {
                summary.stop_reason = StopReason::MaxFrames;
                break;
            }
            sleep_unless_stopped(*poll_interval, stop);
        }

        log::info!(
            "capture stopped ({:?}) after {} polls: {} accepted, {} read failures, {} crop failures, {} sink failures",
            summary.stop_reason,
            summary.polls,
            summary.accepted,
            summary.read_failures,
            summary.crop_failures,
            summary.sink_failures
        );
        Ok(summary)
    }
}

impl CaptureLoop<Box<dyn FrameSource>, DirectorySink> {
    /// Wire a loop from a [`CaptureConfig`]: source, optional profile,
    /// change detector and a [`DirectorySink`] under `output_dir`.
    pub fn from_config(cfg: &CaptureConfig) -> Result<Self, CaptureError> {
        cfg.validate()?;
        let source = cfg.source.build()?;
        let rectifier = cfg.build_rectifier()?;
        let sink = DirectorySink::new(&cfg.output_dir, cfg.name.clone());
        Ok(CaptureLoop::new(source, sink)
            .with_rectifier(rectifier)
            .with_change_config(cfg.change)
            .with_poll_interval(cfg.poll_interval()?)
            .with_max_frames(cfg.max_frames))
    }
}

#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
fn poll_once<S, K>(
    source: &mut S,
    rectifier: Option<&Rectifier>,
    detector: &mut ChangeDetector,
    sink: &mut K,
) -> PollOutcome
where
    S: FrameSource + ?Sized,
    K: FrameSink,
{
    let frame: Frame = match source.read() {
        Ok(f) => f,
        Err(e) => {
            log::warn!("{}: {e}", source.describe());
            return PollOutcome::ReadFailed;
        }
    };

    let rectified: Option<RgbImage> = match rectifier {
        Some(r) => match r.rectify(&frame.image) {
            Ok(img) => Some(img),
            Err(e) => {
                log::warn!("dropping frame: {e}");
                return PollOutcome::RectifyFailed;
            }
        },
        None => None,
    };

    let compared = rectified.as_ref().unwrap_or(&frame.image);
    let started = Instant::now();
    let decision = detector.evaluate(compared);
    log::debug!("change check took {:?}: {decision:?}", started.elapsed());

    if !decision.is_accept() {
        return PollOutcome::Skipped;
    }
    match decision {
        ChangeDecision::First => log::info!("accepted first frame"),
        _ => log::info!(
            "accepted frame, mean diff {:.2}",
            decision.mean_diff().unwrap_or_default()
        ),
    }

    match sink.on_accept(&frame, rectified.as_ref()) {
        Ok(artifact) => {
            log::debug!("stored {}", artifact.raw.display());
            PollOutcome::Accepted { sink_ok: true }
        }
        Err(e) => {
            log::warn!("failed to store accepted frame: {e}");
            PollOutcome::Accepted { sink_ok: false }
        }
    }
}

fn sleep_unless_stopped(interval: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + interval;
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_returns_early_when_stopped() {
        let stop = AtomicBool::new(true);
        let started = Instant::now();
        sleep_unless_stopped(Duration::from_secs(10), &stop);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn zero_interval_does_not_sleep() {
        let stop = AtomicBool::new(false);
        let started = Instant::now();
        sleep_unless_stopped(Duration::ZERO, &stop);
        assert!(started.elapsed() < Duration::from_millis(50));
    }
}
