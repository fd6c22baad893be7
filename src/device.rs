//! V4L2 device implementation using the v4l crate.
//!
//! Opening, capability queries, format negotiation and readiness polling go
//! through `v4l`; the requests it does not wrap (input routing, raw controls,
//! cropping, capture mode, per-buffer queueing) go through [`crate::sys`].

use std::io;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use v4l::video::Capture;
use v4l::Device;

use crate::sys;
pub use crate::sys::MmapRegion;
use crate::traits::{
    BufferInfo, CropRect, DequeuedBuffer, DeviceCapabilities, Format, FourCC, MappedRegion,
    Readiness, StreamParams, VideoBackend, VideoDevice,
};

/// Backend opening real V4L2 device nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct V4L2Backend;

impl VideoBackend for V4L2Backend {
    type Device = V4L2Device;

    fn open(&self, path: &Path) -> io::Result<V4L2Device> {
        V4L2Device::open(path)
    }
}

/// V4L2 device implementation wrapping the v4l crate.
pub struct V4L2Device {
    device: Device,
    path: PathBuf,
}

impl V4L2Device {
    /// Open a V4L2 device node (read-write, non-blocking).
    pub fn open(path: &Path) -> io::Result<Self> {
        let device = Device::with_path(path)?;
        Ok(Self {
            device,
            path: path.to_path_buf(),
        })
    }

    /// Path the device was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fd(&self) -> RawFd {
        self.device.handle().fd()
    }
}

impl std::fmt::Debug for V4L2Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V4L2Device")
            .field("path", &self.path)
            .field("fd", &self.fd())
            .finish()
    }
}

impl MappedRegion for MmapRegion {
    fn bytes(&self) -> &[u8] {
        self.as_slice()
    }
}

impl VideoDevice for V4L2Device {
    type Mapping = MmapRegion;

    fn current_input(&mut self) -> io::Result<u32> {
        sys::current_input(self.fd())
    }

    fn input_name(&mut self, index: u32) -> io::Result<String> {
        sys::input_name(self.fd(), index)
    }

    fn set_control(&mut self, id: u32, value: i32) -> io::Result<()> {
        sys::set_control(self.fd(), id, value)
    }

    fn capabilities(&mut self) -> io::Result<DeviceCapabilities> {
        let caps = self.device.query_caps()?;

        Ok(DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps
                .capabilities
                .contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        })
    }

    fn set_stream_params(&mut self, params: &StreamParams) -> io::Result<()> {
        sys::set_stream_params(
            self.fd(),
            params.frame_interval.numerator,
            params.frame_interval.denominator,
            params.capture_mode,
        )
    }

    fn set_crop(&mut self, rect: &CropRect) -> io::Result<()> {
        sys::set_crop(self.fd(), rect.left, rect.top, rect.width, rect.height)
    }

    fn set_format(&mut self, format: &Format) -> io::Result<Format> {
        let mut fmt = self.device.format()?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = format.fourcc.into();

        let fmt = self.device.set_format(&fmt)?;

        Ok(Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            stride: fmt.stride,
            size: fmt.size,
        })
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        sys::request_buffers(self.fd(), count)
    }

    fn query_buffer(&mut self, index: u32) -> io::Result<BufferInfo> {
        let (length, offset) = sys::query_buffer(self.fd(), index)?;
        Ok(BufferInfo {
            index,
            length,
            offset,
        })
    }

    fn map_buffer(&mut self, info: &BufferInfo) -> io::Result<MmapRegion> {
        MmapRegion::map(self.fd(), info.length as usize, info.offset)
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        sys::queue_buffer(self.fd(), index)
    }

    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer> {
        let (index, bytes_used, sequence) = sys::dequeue_buffer(self.fd())?;
        Ok(DequeuedBuffer {
            index,
            bytes_used,
            sequence,
        })
    }

    fn stream_on(&mut self) -> io::Result<()> {
        sys::stream_on(self.fd())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        sys::stream_off(self.fd())
    }

    fn wait_readable(&mut self, timeout: Duration) -> io::Result<Readiness> {
        let millis = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        match self.device.handle().poll(libc::POLLIN, millis)? {
            0 => Ok(Readiness::TimedOut),
            _ => Ok(Readiness::Ready),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device_fails() {
        let err = V4L2Backend
            .open(Path::new("/dev/gfcam-does-not-exist"))
            .expect_err("open must fail");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
