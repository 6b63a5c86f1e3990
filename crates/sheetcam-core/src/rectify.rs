use std::sync::{Arc, Mutex, PoisonError};

use image::RgbImage;

use crate::camera::UndistortMap;
use crate::geometry::CropRect;
use crate::homography::{warp_perspective_rgb, Homography};
use crate::profile::{RectificationMode, RectificationProfile};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RectifyError {
    #[error("crop {crop:?} does not fit the corrected {width}x{height} frame")]
    CropOutOfBounds {
        crop: CropRect,
        width: u32,
        height: u32,
    },
    #[error("profile homography is not invertible")]
    SingularHomography,
    #[error("invalid warp output size {width}x{height}")]
    InvalidOutputSize { width: u32, height: u32 },
}

/// Applies a [`RectificationProfile`] to frames.
///
/// The undistortion lookup table depends only on the profile and the frame
/// size. It is built on first use, reused while frames keep that size and
/// rebuilt once when the size changes.
#[derive(Debug)]
pub struct Rectifier {
    profile: RectificationProfile,
    h_src_from_out: Option<Homography>,
    map: Mutex<Option<Arc<UndistortMap>>>,
}

impl Rectifier {
    pub fn new(profile: RectificationProfile) -> Result<Self, RectifyError> {
        let h_src_from_out = match &profile.warp {
            Some(w) => {
                if let Some((width, height)) = w.output_size {
                    if width == 0 || height == 0 {
                        return Err(RectifyError::InvalidOutputSize { width, height });
                    }
                }
                Some(
                    w.homography
                        .inverse()
                        .ok_or(RectifyError::SingularHomography)?,
                )
            }
            None => None,
        };
        Ok(Self {
            profile,
            h_src_from_out,
            map: Mutex::new(None),
        })
    }

    #[inline]
    pub fn profile(&self) -> &RectificationProfile {
        &self.profile
    }

    #[inline]
    pub fn mode(&self) -> RectificationMode {
        self.profile.mode()
    }

    fn undistort(&self, frame: &RgbImage) -> Option<RgbImage> {
        let lc = self.profile.lens.as_ref()?;
        let (w, h) = frame.dimensions();
        let map = {
            let mut slot = self.map.lock().unwrap_or_else(PoisonError::into_inner);
            let cached = slot
                .as_ref()
                .filter(|m| m.width == w && m.height == h)
                .cloned();
            match cached {
                Some(m) => m,
                None => {
                    if let Some(old) = slot.as_ref() {
                        log::debug!(
                            "frame size changed {}x{} -> {w}x{h}; rebuilding undistort map",
                            old.width,
                            old.height
                        );
                    }
                    let fresh = Arc::new(lc.lens.undistort_map(&lc.optimal, w, h));
                    *slot = Some(Arc::clone(&fresh));
                    fresh
                }
            }
        };
        Some(map.remap(frame))
    }

    #[cfg(test)]
    fn cached_map_size(&self) -> Option<(u32, u32)> {
        let slot = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().map(|m| (m.width, m.height))
    }

    /// Undistort, crop and warp one frame, skipping the steps the profile
    /// does not define.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(width = frame.width(), height = frame.height()))
    )]
    pub fn rectify(&self, frame: &RgbImage) -> Result<RgbImage, RectifyError> {
        let mut current = match self.undistort(frame) {
            Some(img) => img,
            None => frame.clone(),
        };

        if let Some(crop) = self.profile.crop {
            let (width, height) = current.dimensions();
            if !crop.fits_within(width, height) {
                return Err(RectifyError::CropOutOfBounds {
                    crop,
                    width,
                    height,
                });
            }
            current =
                image::imageops::crop_imm(&current, crop.x, crop.y, crop.width, crop.height)
                    .to_image();
        }

        if let (Some(warp), Some(h)) = (&self.profile.warp, &self.h_src_from_out) {
            let (out_w, out_h) = warp.output_size.unwrap_or(current.dimensions());
            current = warp_perspective_rgb(&current, h, out_w, out_h);
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraIntrinsics, Distortion, LensModel};
    use image::Rgb;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 99]))
    }

    #[test]
    fn passthrough_returns_input() {
        let r = Rectifier::new(RectificationProfile::passthrough()).unwrap();
        let img = gradient(20, 10);
        assert_eq!(r.rectify(&img).unwrap(), img);
    }

    #[test]
    fn crop_slices_the_window() {
        let crop = CropRect::new(3, 2, 5, 4).unwrap();
        let r = Rectifier::new(RectificationProfile::passthrough().with_crop(crop)).unwrap();
        let img = gradient(20, 10);
        let out = r.rectify(&img).unwrap();
        assert_eq!(out.dimensions(), (5, 4));
        assert_eq!(out.get_pixel(0, 0), img.get_pixel(3, 2));
        assert_eq!(out.get_pixel(4, 3), img.get_pixel(7, 5));
    }

    #[test]
    fn oversized_crop_fails_only_that_frame() {
        let crop = CropRect::new(10, 0, 15, 5).unwrap();
        let r = Rectifier::new(RectificationProfile::passthrough().with_crop(crop)).unwrap();
        let err = r.rectify(&gradient(20, 10)).unwrap_err();
        assert!(matches!(err, RectifyError::CropOutOfBounds { width: 20, .. }));
        assert!(r.rectify(&gradient(40, 10)).is_ok());
    }

    #[test]
    fn warp_without_output_size_keeps_frame_size() {
        let h = Homography::from_array([[1.0, 0.0, -1.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
        let r = Rectifier::new(RectificationProfile::warp_only(h, None)).unwrap();
        let img = gradient(12, 6);
        let out = r.rectify(&img).unwrap();
        assert_eq!(out.dimensions(), (12, 6));
        // dst = src shifted one pixel left
        assert_eq!(out.get_pixel(0, 3), img.get_pixel(1, 3));
    }

    #[test]
    fn singular_warp_is_rejected_up_front() {
        let p = RectificationProfile::warp_only(Homography::from_array([[0.0; 3]; 3]), None);
        assert_eq!(
            Rectifier::new(p).unwrap_err(),
            RectifyError::SingularHomography
        );
    }

    #[test]
    fn zero_distortion_lens_is_identity() {
        let lens = LensModel::new(CameraIntrinsics::centered(30.0, 20, 10), Distortion::default());
        let p = RectificationProfile::passthrough().with_lens(lens, lens.intrinsics);
        let r = Rectifier::new(p).unwrap();
        let img = gradient(20, 10);
        assert_eq!(r.rectify(&img).unwrap(), img);
        // second call reuses the cached map
        assert_eq!(r.rectify(&img).unwrap(), img);
    }

    #[test]
    fn undistort_map_follows_the_frame_size() {
        let lens = LensModel::new(
            CameraIntrinsics::centered(30.0, 20, 10),
            Distortion::radial(-0.05, 0.0),
        );
        let r = Rectifier::new(RectificationProfile::passthrough().with_lens(lens, lens.intrinsics))
            .unwrap();
        assert_eq!(r.cached_map_size(), None);

        r.rectify(&gradient(20, 10)).unwrap();
        assert_eq!(r.cached_map_size(), Some((20, 10)));

        let out = r.rectify(&gradient(32, 16)).unwrap();
        assert_eq!(out.dimensions(), (32, 16));
        assert_eq!(r.cached_map_size(), Some((32, 16)));

        // stays on the new size instead of rebuilding per frame
        r.rectify(&gradient(32, 16)).unwrap();
        assert_eq!(r.cached_map_size(), Some((32, 16)));
    }
}
