//! Rectification profiles and the on-disk calibration artifact.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::camera::{CameraIntrinsics, Distortion, LensModel};
use crate::geometry::{CropRect, EmptyCropRect};
use crate::homography::Homography;

#[derive(thiserror::Error, Debug)]
pub enum ProfileError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    InvalidCropRect(#[from] EmptyCropRect),
    #[error("homography is not invertible")]
    SingularHomography,
    #[error("invalid output size {width}x{height}")]
    InvalidOutputSize { width: u32, height: u32 },
    #[error("invalid camera matrix")]
    InvalidIntrinsics,
}

/// Lens correction step: undistort with `lens`, re-project with `optimal`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LensCorrection {
    pub lens: LensModel,
    pub optimal: CameraIntrinsics,
}

/// Perspective step. `homography` maps the (corrected, cropped) frame to the
/// output; without `output_size` the output keeps the input frame size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveWarp {
    pub homography: Homography,
    #[serde(default)]
    pub output_size: Option<(u32, u32)>,
}

/// Which steps a profile performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RectificationMode {
    Passthrough,
    Undistort,
    UndistortCrop,
    UndistortWarp,
    UndistortCropWarp,
    /// Perspective only, no lens correction.
    WarpOnly,
    CropOnly,
    CropWarp,
}

/// Everything needed to rectify frames from one camera.
///
/// Each step is optional; the rectifier runs undistort, crop and warp in that
/// order for whichever fields are populated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RectificationProfile {
    #[serde(default)]
    pub lens: Option<LensCorrection>,
    #[serde(default)]
    pub crop: Option<CropRect>,
    #[serde(default)]
    pub warp: Option<PerspectiveWarp>,
}

impl RectificationProfile {
    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn warp_only(homography: Homography, output_size: Option<(u32, u32)>) -> Self {
        Self {
            warp: Some(PerspectiveWarp {
                homography,
                output_size,
            }),
            ..Self::default()
        }
    }

    pub fn with_lens(mut self, lens: LensModel, optimal: CameraIntrinsics) -> Self {
        self.lens = Some(LensCorrection { lens, optimal });
        self
    }

    pub fn with_crop(mut self, crop: CropRect) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_warp(mut self, homography: Homography, output_size: Option<(u32, u32)>) -> Self {
        self.warp = Some(PerspectiveWarp {
            homography,
            output_size,
        });
        self
    }

    pub fn mode(&self) -> RectificationMode {
        use RectificationMode::*;
        match (self.lens.is_some(), self.crop.is_some(), self.warp.is_some()) {
            (false, false, false) => Passthrough,
            (true, false, false) => Undistort,
            (true, true, false) => UndistortCrop,
            (true, false, true) => UndistortWarp,
            (true, true, true) => UndistortCropWarp,
            (false, false, true) => WarpOnly,
            (false, true, false) => CropOnly,
            (false, true, true) => CropWarp,
        }
    }
}

/// Serialized calibration output.
///
/// `camera_matrix`, `dist_coeffs`, `new_camera_matrix` and `crop_rect` are
/// always present; `homography` and `output_size` only when a perspective
/// warp has been configured.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationArtifact {
    pub camera_matrix: [[f64; 3]; 3],
    pub dist_coeffs: [f64; 5],
    pub new_camera_matrix: [[f64; 3]; 3],
    pub crop_rect: CropRect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homography: Option<Homography>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_size: Option<(u32, u32)>,
}

impl CalibrationArtifact {
    pub fn new(lens: LensModel, optimal: CameraIntrinsics, crop_rect: CropRect) -> Self {
        Self {
            camera_matrix: lens.intrinsics.to_rows(),
            dist_coeffs: lens.distortion.to_coeffs(),
            new_camera_matrix: optimal.to_rows(),
            crop_rect,
            homography: None,
            output_size: None,
        }
    }

    pub fn lens(&self) -> LensModel {
        LensModel::new(
            CameraIntrinsics::from_rows(self.camera_matrix),
            Distortion::from_coeffs(self.dist_coeffs),
        )
    }

    pub fn optimal(&self) -> CameraIntrinsics {
        CameraIntrinsics::from_rows(self.new_camera_matrix)
    }

    /// Validate and build the profile used for rectifying frames.
    pub fn to_profile(&self) -> Result<RectificationProfile, ProfileError> {
        let lens = self.lens();
        let optimal = self.optimal();
        if !lens.intrinsics.is_valid() || !optimal.is_valid() {
            return Err(ProfileError::InvalidIntrinsics);
        }
        let mut profile = RectificationProfile::passthrough()
            .with_lens(lens, optimal)
            .with_crop(self.crop_rect);
        if let Some(h) = self.homography {
            if h.inverse().is_none() {
                return Err(ProfileError::SingularHomography);
            }
            if let Some((width, height)) = self.output_size {
                if width == 0 || height == 0 {
                    return Err(ProfileError::InvalidOutputSize { width, height });
                }
            }
            profile = profile.with_warp(h, self.output_size);
        }
        Ok(profile)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write pretty JSON through a temporary file in the destination
    /// directory, then rename it into place.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ProfileError> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(self)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| ProfileError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> CalibrationArtifact {
        let lens = LensModel::new(
            CameraIntrinsics::centered(576.0, 640, 480),
            Distortion::radial(-0.1, 0.0),
        );
        let optimal = CameraIntrinsics {
            fx: 540.0,
            fy: 541.0,
            cx: 318.0,
            cy: 241.0,
        };
        CalibrationArtifact::new(lens, optimal, CropRect::new(10, 20, 600, 400).unwrap())
    }

    #[test]
    fn mode_follows_populated_fields() {
        let a = artifact();
        let p = a.to_profile().unwrap();
        assert_eq!(p.mode(), RectificationMode::UndistortCrop);
        assert_eq!(
            RectificationProfile::passthrough().mode(),
            RectificationMode::Passthrough
        );
        assert_eq!(
            RectificationProfile::warp_only(Homography::identity(), None).mode(),
            RectificationMode::WarpOnly
        );
        assert_eq!(
            p.with_warp(Homography::identity(), Some((800, 1600))).mode(),
            RectificationMode::UndistortCropWarp
        );
    }

    #[test]
    fn json_schema_field_names() {
        let mut a = artifact();
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["crop_rect"], serde_json::json!([10, 20, 600, 400]));
        assert_eq!(v["dist_coeffs"].as_array().unwrap().len(), 5);
        assert!(v.get("homography").is_none());

        a.homography = Some(Homography::identity());
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["homography"][2][2], serde_json::json!(1.0));
    }

    #[test]
    fn singular_homography_is_rejected() {
        let mut a = artifact();
        a.homography = Some(Homography::from_array([[0.0; 3]; 3]));
        assert!(matches!(
            a.to_profile(),
            Err(ProfileError::SingularHomography)
        ));
    }

    #[test]
    fn write_then_load_preserves_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("profile.json");
        let a = artifact();
        a.write_json(&path).unwrap();
        let loaded = CalibrationArtifact::load_json(&path).unwrap();
        assert_eq!(loaded, a);
        assert_eq!(loaded.lens().distortion.k1, -0.1);
    }
}
