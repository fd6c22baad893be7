//! Device negotiation.
//!
//! [`Session::open`] takes a device from closed to fully configured in
//! eight ordered steps. Any failure drops the handle, which closes the
//! descriptor, before the error is returned.

use tracing::{debug, trace};

use crate::config::{CaptureConfig, DeviceSettings};
use crate::traits::{
    CameraError, CropRect, Format, Operation, Result, StreamParams, VideoBackend, VideoDevice,
};

/// An open, configured capture device.
#[derive(Debug)]
pub struct Session<D: VideoDevice> {
    device: D,
    settings: DeviceSettings,
    config: CaptureConfig,
    format: Format,
}

impl<D: VideoDevice> Session<D> {
    /// Open the device named by `settings` and configure it for `config`.
    pub fn open<B>(backend: &B, settings: &DeviceSettings, config: CaptureConfig) -> Result<Self>
    where
        B: VideoBackend<Device = D>,
    {
        let path = &settings.device_path;

        let mut device = backend.open(path).map_err(|source| CameraError::Open {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "opened capture device");

        check_input(&mut device, &settings.expected_input)?;

        device
            .set_control(settings.camera_select_cid, config.camera().control_value())
            .map_err(|e| CameraError::io(Operation::CameraSelect, e))?;
        debug!(camera = ?config.camera(), "selected camera");

        let caps = device
            .capabilities()
            .map_err(|e| CameraError::io(Operation::CapabilityQuery, e))?;
        if !caps.can_capture {
            return Err(CameraError::MissingCapability {
                path: path.clone(),
                capability: "video capture",
            });
        }
        if !caps.can_stream {
            return Err(CameraError::MissingCapability {
                path: path.clone(),
                capability: "streaming",
            });
        }
        debug!(driver = %caps.driver, card = %caps.card, bus = %caps.bus_info, "capabilities ok");

        let params = StreamParams {
            frame_interval: settings.frame_interval,
            capture_mode: settings.capture_mode,
        };
        device
            .set_stream_params(&params)
            .map_err(|e| CameraError::io(Operation::SetParm, e))?;
        debug!(
            numerator = params.frame_interval.numerator,
            denominator = params.frame_interval.denominator,
            mode = params.capture_mode,
            "stream parameters set"
        );

        for (entry, value) in settings.controls.resolve(&config) {
            device
                .set_control(entry.id, value)
                .map_err(|source| CameraError::Control {
                    id: entry.id,
                    name: entry.name,
                    value,
                    source,
                })?;
            trace!(control = entry.name, id = entry.id, value, "control applied");
        }
        debug!(count = settings.controls.entries().len(), "controls applied");

        device
            .set_crop(&CropRect::full(settings.width, settings.height))
            .map_err(|e| CameraError::io(Operation::Crop, e))?;

        let requested = Format::new(settings.width, settings.height, settings.fourcc);
        let mut format = device
            .set_format(&requested)
            .map_err(|e| CameraError::io(Operation::Format, e))?;
        if format.stride == 0 {
            format.stride = requested.stride;
        }
        if !format.same_layout(&requested) || (format.stride as usize) < format.row_len() {
            return Err(CameraError::FormatMismatch {
                requested,
                actual: format,
            });
        }
        debug!(%format, stride = format.stride, size = format.size, "format negotiated");

        Ok(Self {
            device,
            settings: settings.clone(),
            config,
            format,
        })
    }

    /// The underlying device handle.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Settings the session was opened with.
    #[must_use]
    pub const fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    /// The validated request the session was configured for.
    #[must_use]
    pub const fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Format the driver settled on.
    #[must_use]
    pub const fn format(&self) -> &Format {
        &self.format
    }

    /// Close the device.
    pub fn close(self) {
        debug!(path = %self.settings.device_path.display(), "closing capture device");
    }
}

fn check_input<D: VideoDevice>(device: &mut D, expected: &str) -> Result<()> {
    let index = device
        .current_input()
        .map_err(|e| CameraError::io(Operation::InputQuery, e))?;
    let name = device
        .input_name(index)
        .map_err(|e| CameraError::io(Operation::InputQuery, e))?;

    if name != expected {
        return Err(CameraError::InputMismatch {
            expected: expected.to_owned(),
            actual: name,
        });
    }
    debug!(index, name = %name, "video input ok");
    Ok(())
}
