//! Frame sources.
//!
//! A source is owned by exactly one capture loop and goes through
//! `open -> read* -> release`. [`SourceGuard`] ties `release` to scope exit.

use std::ops::{Deref, DerefMut};

use sheetcam_core::Frame;

use crate::error::SourceError;

#[cfg(feature = "device")]
mod device;
#[cfg(feature = "snapshot")]
mod snapshot;
mod still;

#[cfg(feature = "device")]
pub use device::DeviceSource;
#[cfg(feature = "snapshot")]
pub use snapshot::SnapshotSource;
pub use still::StillImageSource;

pub trait FrameSource {
    fn open(&mut self) -> Result<(), SourceError>;

    /// Grab one frame. Errors are expected to be transient.
    fn read(&mut self) -> Result<Frame, SourceError>;

    /// Free the underlying handle. Must be safe to call more than once.
    fn release(&mut self);

    /// Human-readable name for logs.
    fn describe(&self) -> String {
        "frame source".to_string()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self) -> Result<(), SourceError> {
        (**self).open()
    }

    fn read(&mut self) -> Result<Frame, SourceError> {
        (**self).read()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// An opened source that is released when dropped.
pub struct SourceGuard<'a, S: FrameSource + ?Sized> {
    source: &'a mut S,
}

impl<'a, S: FrameSource + ?Sized> SourceGuard<'a, S> {
    /// Open `source`; on failure nothing needs releasing.
    pub fn open(source: &'a mut S) -> Result<Self, SourceError> {
        source.open()?;
        log::info!("opened {}", source.describe());
        Ok(Self { source })
    }
}

impl<S: FrameSource + ?Sized> Deref for SourceGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.source
    }
}

impl<S: FrameSource + ?Sized> DerefMut for SourceGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.source
    }
}

impl<S: FrameSource + ?Sized> Drop for SourceGuard<'_, S> {
    fn drop(&mut self) {
        self.source.release();
        log::debug!("released {}", self.source.describe());
    }
}
