use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use sheetcam_core::Frame;

use super::FrameSource;
use crate::error::SourceError;

/// Local capture device by index.
pub struct DeviceSource {
    index: u32,
    camera: Option<Camera>,
}

impl DeviceSource {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            camera: None,
        }
    }
}

impl FrameSource for DeviceSource {
    fn open(&mut self) -> Result<(), SourceError> {
        let format =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(CameraIndex::Index(self.index), format)
            .map_err(|e| SourceError::Open(format!("device {}: {e}", self.index)))?;
        camera
            .open_stream()
            .map_err(|e| SourceError::Open(format!("device {}: {e}", self.index)))?;
        self.camera = Some(camera);
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, SourceError> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| SourceError::SourceUnavailable("device not opened".into()))?;
        let buffer = camera
            .frame()
            .map_err(|e| SourceError::SourceUnavailable(format!("device {}: {e}", self.index)))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| SourceError::SourceUnavailable(format!("device {}: {e}", self.index)))?;
        let (w, h) = (decoded.width(), decoded.height());
        // rebuild through raw bytes so nokhwa's image version does not leak
        let image = RgbImage::from_raw(w, h, decoded.into_raw()).ok_or_else(|| {
            SourceError::SourceUnavailable(format!("device {}: short frame buffer", self.index))
        })?;
        Ok(Frame::new(image))
    }

    fn release(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop_stream() {
                log::warn!("device {}: stop_stream failed: {e}", self.index);
            }
        }
    }

    fn describe(&self) -> String {
        format!("capture device {}", self.index)
    }
}
