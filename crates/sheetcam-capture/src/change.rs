use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

/// Change detector settings. Frames are compared as small grayscale
/// thumbnails of `compare_width x compare_height`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeDetectorConfig {
    pub compare_width: u32,
    pub compare_height: u32,
    /// Minimum mean absolute difference (0..255) to accept a frame.
    pub threshold: f64,
}

impl Default for ChangeDetectorConfig {
    fn default() -> Self {
        Self {
            compare_width: 320,
            compare_height: 180,
            threshold: 5.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChangeDecision {
    /// Nothing to compare against yet.
    First,
    Changed { mean_diff: f64 },
    Unchanged { mean_diff: f64 },
}

impl ChangeDecision {
    pub fn is_accept(&self) -> bool {
        !matches!(self, ChangeDecision::Unchanged { .. })
    }

    pub fn mean_diff(&self) -> Option<f64> {
        match *self {
            ChangeDecision::First => None,
            ChangeDecision::Changed { mean_diff } | ChangeDecision::Unchanged { mean_diff } => {
                Some(mean_diff)
            }
        }
    }
}

/// Keeps the thumbnail of the last accepted frame.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    config: ChangeDetectorConfig,
    reference: Option<GrayImage>,
}

impl ChangeDetector {
    pub fn new(config: ChangeDetectorConfig) -> Self {
        Self {
            config,
            reference: None,
        }
    }

    pub fn config(&self) -> &ChangeDetectorConfig {
        &self.config
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    pub fn reset(&mut self) {
        self.reference = None;
    }

    fn thumbnail(&self, frame: &RgbImage) -> GrayImage {
        let w = self.config.compare_width.max(1);
        let h = self.config.compare_height.max(1);
        let small = imageops::resize(frame, w, h, FilterType::Triangle);
        imageops::grayscale(&small)
    }

    /// Compare `frame` with the stored reference. Accepted frames replace
    /// the reference.
    pub fn evaluate(&mut self, frame: &RgbImage) -> ChangeDecision {
        let thumb = self.thumbnail(frame);
        let Some(reference) = &self.reference else {
            self.reference = Some(thumb);
            return ChangeDecision::First;
        };

        let mean_diff = mean_abs_diff(reference, &thumb);
        if mean_diff >= self.config.threshold {
            self.reference = Some(thumb);
            ChangeDecision::Changed { mean_diff }
        } else {
            ChangeDecision::Unchanged { mean_diff }
        }
    }
}

fn mean_abs_diff(a: &GrayImage, b: &GrayImage) -> f64 {
    let n = a.as_raw().len().min(b.as_raw().len());
    if n == 0 {
        return 0.0;
    }
    let sum: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&x, &y)| x.abs_diff(y) as u64)
        .sum();
    sum as f64 / n as f64
}
