//! Capture entry points.
//!
//! Every call runs the whole pipeline: validate, open and configure the
//! device, map and queue buffers, stream until one frame arrives, convert
//! it, and tear everything down before returning.

use tracing::{info, instrument, warn};

use crate::buffer::BufferPool;
use crate::capture::CaptureLoop;
use crate::config::{CaptureConfig, CaptureRequest, DeviceSettings};
use crate::demosaic::{demosaic, BayerLayout, DecodedImage};
use crate::device::V4L2Backend;
use crate::encode::{encode, EncodedImage};
use crate::session::Session;
use crate::traits::{CameraError, Result, VideoBackend};

/// Still camera bound to one backend and one set of device settings.
#[derive(Debug, Clone)]
pub struct Camera<B: VideoBackend = V4L2Backend> {
    backend: B,
    settings: DeviceSettings,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    /// Camera on the real device with the hardware defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(DeviceSettings::default())
    }

    /// Camera on the real device with custom settings.
    #[must_use]
    pub const fn with_settings(settings: DeviceSettings) -> Self {
        Self::with_backend(V4L2Backend, settings)
    }
}

impl<B: VideoBackend> Camera<B> {
    /// Camera on an arbitrary backend.
    #[must_use]
    pub const fn with_backend(backend: B, settings: DeviceSettings) -> Self {
        Self { backend, settings }
    }

    /// Settings used for every capture.
    #[must_use]
    pub const fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    /// Capture one frame as RGB24.
    #[instrument(skip(self), fields(device = %self.settings.device_path.display()))]
    pub fn capture_rgb(&self, request: &CaptureRequest) -> Result<DecodedImage> {
        let config = CaptureConfig::new(request)?;
        let image = self.acquire(config)?;
        info!(width = image.width(), height = image.height(), "captured RGB frame");
        Ok(image)
    }

    /// Capture one frame as JPEG.
    #[instrument(skip(self), fields(device = %self.settings.device_path.display()))]
    pub fn capture_jpeg(&self, request: &CaptureRequest) -> Result<EncodedImage> {
        let config = CaptureConfig::new(request)?;
        let image = self.acquire(config)?;
        let encoded = encode(&image, self.settings.jpeg_quality)?;
        info!(bytes = encoded.len(), "captured JPEG frame");
        Ok(encoded)
    }

    fn acquire(&self, config: CaptureConfig) -> Result<DecodedImage> {
        let layout = BayerLayout::from_fourcc(self.settings.fourcc)
            .ok_or(CameraError::UnsupportedFormat(self.settings.fourcc))?;

        let mut session = Session::open(&self.backend, &self.settings, config)?;
        let mut pool = BufferPool::allocate(&mut session, self.settings.buffer_count)?;

        let image = {
            let mut capture = CaptureLoop::new(&mut session, &mut pool);
            capture.start()?;

            let image = {
                let frame = capture.wait_frame()?;
                demosaic(&frame.pixels(), frame.width, frame.height, layout)
            };

            if let Err(e) = capture.stop() {
                warn!(error = %e, "frame captured but stream-off failed");
            }
            image
        };

        pool.release();
        session.close();
        Ok(image)
    }
}

/// Capture one RGB24 frame from the default device.
pub fn capture_rgb(request: &CaptureRequest) -> Result<DecodedImage> {
    Camera::new().capture_rgb(request)
}

/// Capture one JPEG frame from the default device.
pub fn capture_jpeg(request: &CaptureRequest) -> Result<EncodedImage> {
    Camera::new().capture_jpeg(request)
}
