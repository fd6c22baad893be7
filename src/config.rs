//! Capture request validation and injectable device settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::controls::{ControlTable, CID_CAMERA_SELECT};
use crate::traits::{CameraError, FourCC, Fraction, Result};

/// Device node of the CSI capture interface.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/video0";
/// Sensor width in pixels.
pub const SENSOR_WIDTH: u32 = 2592;
/// Sensor height in pixels.
pub const SENSOR_HEIGHT: u32 = 1944;
/// Input routing the driver must report.
pub const EXPECTED_INPUT: &str = "CSI MEM";
/// Driver capture mode selecting full-resolution stills.
pub const CAPTURE_MODE: u32 = 4;
/// Time per frame.
pub const FRAME_INTERVAL: Fraction = Fraction::new(1, 15);
/// Bound on a single readiness wait.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(2);
/// Buffers requested from the driver.
pub const BUFFER_COUNT: u32 = 2;
/// JPEG quality.
pub const JPEG_QUALITY: u8 = 75;
/// Default exposure.
pub const DEFAULT_EXPOSURE: i64 = 3000;
/// Default gain.
pub const DEFAULT_GAIN: i64 = 30;
/// Largest accepted exposure.
pub const MAX_EXPOSURE: i64 = 65535;
/// Largest accepted gain.
pub const MAX_GAIN: i64 = 1023;

/// Which sensor the CSI port is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraSelect {
    /// Lid camera.
    #[default]
    Lid = 0,
    /// Head camera.
    Head = 1,
}

impl CameraSelect {
    /// Control value written to the camera-select control.
    #[must_use]
    pub const fn control_value(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i64> for CameraSelect {
    type Error = CameraError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 => Ok(Self::Lid),
            1 => Ok(Self::Head),
            other => Err(CameraError::InvalidCamera(other)),
        }
    }
}

/// Capture parameters as supplied by the host, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Camera selector, 0 (lid) or 1 (head).
    pub camera: i64,
    /// Exposure, 0..=65535.
    pub exposure: i64,
    /// Gain, 0..=1023.
    pub gain: i64,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self::new(0)
    }
}

impl CaptureRequest {
    /// Request for `camera` with default exposure and gain.
    #[must_use]
    pub const fn new(camera: i64) -> Self {
        Self {
            camera,
            exposure: DEFAULT_EXPOSURE,
            gain: DEFAULT_GAIN,
        }
    }

    /// Set the exposure.
    #[must_use]
    pub const fn with_exposure(mut self, exposure: i64) -> Self {
        self.exposure = exposure;
        self
    }

    /// Set the gain.
    #[must_use]
    pub const fn with_gain(mut self, gain: i64) -> Self {
        self.gain = gain;
        self
    }
}

/// A validated capture request. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    camera: CameraSelect,
    exposure: u16,
    gain: u16,
}

impl CaptureConfig {
    /// Validate `request`. Runs before any device is opened.
    pub fn new(request: &CaptureRequest) -> Result<Self> {
        let camera = CameraSelect::try_from(request.camera)?;
        let exposure = u16::try_from(request.exposure)
            .map_err(|_| CameraError::InvalidExposure(request.exposure))?;
        let gain = u16::try_from(request.gain)
            .ok()
            .filter(|gain| i64::from(*gain) <= MAX_GAIN)
            .ok_or(CameraError::InvalidGain(request.gain))?;

        Ok(Self {
            camera,
            exposure,
            gain,
        })
    }

    /// Selected sensor.
    #[must_use]
    pub const fn camera(&self) -> CameraSelect {
        self.camera
    }

    /// Exposure to apply.
    #[must_use]
    pub const fn exposure(&self) -> u16 {
        self.exposure
    }

    /// Gain to apply.
    #[must_use]
    pub const fn gain(&self) -> u16 {
        self.gain
    }
}

/// Fixed hardware constants, injectable so tests can substitute a
/// simulated device and shorter bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    /// Device node path.
    pub device_path: PathBuf,
    /// Capture width in pixels.
    pub width: u32,
    /// Capture height in pixels.
    pub height: u32,
    /// Raw pixel format.
    pub fourcc: FourCC,
    /// Time per frame.
    pub frame_interval: Fraction,
    /// Driver capture mode.
    pub capture_mode: u32,
    /// Name the active video input must report.
    pub expected_input: String,
    /// Control id of the camera selector.
    pub camera_select_cid: u32,
    /// Controls applied during setup.
    pub controls: ControlTable,
    /// Buffers requested from the driver.
    pub buffer_count: u32,
    /// Bound on a single readiness wait.
    pub wait_timeout: Duration,
    /// JPEG quality, 1..=100.
    pub jpeg_quality: u8,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from(DEFAULT_DEVICE_PATH),
            width: SENSOR_WIDTH,
            height: SENSOR_HEIGHT,
            fourcc: FourCC::SBGGR8,
            frame_interval: FRAME_INTERVAL,
            capture_mode: CAPTURE_MODE,
            expected_input: EXPECTED_INPUT.to_owned(),
            camera_select_cid: CID_CAMERA_SELECT,
            controls: ControlTable::default(),
            buffer_count: BUFFER_COUNT,
            wait_timeout: WAIT_TIMEOUT,
            jpeg_quality: JPEG_QUALITY,
        }
    }
}

impl DeviceSettings {
    /// Set the device node path.
    #[must_use]
    pub fn with_device_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.device_path = path.as_ref().to_path_buf();
        self
    }

    /// Set the capture resolution.
    #[must_use]
    pub const fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the expected input name.
    #[must_use]
    pub fn with_expected_input(mut self, name: &str) -> Self {
        name.clone_into(&mut self.expected_input);
        self
    }

    /// Replace the control table.
    #[must_use]
    pub fn with_controls(mut self, controls: ControlTable) -> Self {
        self.controls = controls;
        self
    }

    /// Set the number of buffers requested.
    #[must_use]
    pub const fn with_buffer_count(mut self, count: u32) -> Self {
        self.buffer_count = count;
        self
    }

    /// Set the readiness wait bound.
    #[must_use]
    pub const fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Set the JPEG quality.
    #[must_use]
    pub const fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ErrorKind;

    #[test]
    fn test_default_request() {
        let request = CaptureRequest::default();
        assert_eq!(request.camera, 0);
        assert_eq!(request.exposure, 3000);
        assert_eq!(request.gain, 30);
    }

    #[test]
    fn test_camera_selector_is_strict() {
        for camera in [-1, 2, 7, i64::MAX] {
            let err = CaptureConfig::new(&CaptureRequest::new(camera)).expect_err("must reject");
            assert!(matches!(err, CameraError::InvalidCamera(c) if c == camera));
            assert_eq!(err.kind(), ErrorKind::Configuration);
        }

        let config = CaptureConfig::new(&CaptureRequest::new(1)).expect("head is valid");
        assert_eq!(config.camera(), CameraSelect::Head);
    }

    #[test]
    fn test_exposure_bounds() {
        for exposure in [0, 1, 65535] {
            let config = CaptureConfig::new(&CaptureRequest::new(0).with_exposure(exposure))
                .expect("in range");
            assert_eq!(i64::from(config.exposure()), exposure);
        }
        for exposure in [-1, 65536, i64::MIN] {
            let err = CaptureConfig::new(&CaptureRequest::new(0).with_exposure(exposure))
                .expect_err("out of range");
            assert!(matches!(err, CameraError::InvalidExposure(_)));
        }
    }

    #[test]
    fn test_gain_bounds() {
        for gain in [0, 30, 1023] {
            let config =
                CaptureConfig::new(&CaptureRequest::new(0).with_gain(gain)).expect("in range");
            assert_eq!(i64::from(config.gain()), gain);
        }
        for gain in [-1, 1024, 65535, 70000] {
            let err = CaptureConfig::new(&CaptureRequest::new(0).with_gain(gain))
                .expect_err("out of range");
            assert!(matches!(err, CameraError::InvalidGain(g) if g == gain));
        }
    }

    #[test]
    fn test_default_settings_match_hardware() {
        let settings = DeviceSettings::default();
        assert_eq!(settings.device_path, PathBuf::from("/dev/video0"));
        assert_eq!((settings.width, settings.height), (2592, 1944));
        assert_eq!(settings.fourcc, FourCC::SBGGR8);
        assert_eq!(settings.frame_interval, Fraction::new(1, 15));
        assert_eq!(settings.capture_mode, 4);
        assert_eq!(settings.buffer_count, 2);
        assert_eq!(settings.wait_timeout, Duration::from_secs(2));
        assert_eq!(settings.jpeg_quality, 75);
        assert_eq!(settings.controls.entries().len(), 11);
    }
}
