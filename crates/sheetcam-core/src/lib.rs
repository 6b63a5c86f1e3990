//! Core types for rectifying an overhead sheet camera.
//!
//! This crate is purely geometric: pinhole intrinsics and Brown-Conrady
//! distortion, four-point homographies, crop windows, and the
//! [`Rectifier`] that applies a [`RectificationProfile`] to frames. It knows
//! nothing about how lines are picked, how profiles are estimated, or where
//! frames come from.

mod camera;
mod geometry;
mod homography;
mod logger;
mod profile;
mod raster;
mod rectify;

pub use camera::{CameraIntrinsics, Distortion, LensModel, UndistortConfig, UndistortMap};
pub use geometry::{bounding_box, convex_hull, CropRect, EmptyCropRect};
pub use homography::{homography_from_4pt, warp_perspective_rgb, Homography};
pub use profile::{
    CalibrationArtifact, LensCorrection, PerspectiveWarp, ProfileError, RectificationMode,
    RectificationProfile,
};
pub use raster::{sample_bilinear_rgb, Frame};
pub use rectify::{Rectifier, RectifyError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_verbosity};

pub use nalgebra::Point2;
