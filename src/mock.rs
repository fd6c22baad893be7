//! Mock device implementation for testing without hardware.
//!
//! [`MockBackend`] hands out [`MockDevice`] handles that share one
//! [`MockStats`] ledger, so tests can observe open descriptors and live
//! mappings after the pipeline has dropped everything. Every negotiation
//! step can be made to fail through the builder.

use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::traits::{
    BufferInfo, CropRect, DequeuedBuffer, DeviceCapabilities, Format, MappedRegion, Readiness,
    StreamParams, VideoBackend, VideoDevice,
};

/// How the simulated descriptor answers readiness waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitScript {
    /// Ready immediately.
    Ready,
    /// Never ready; each wait sleeps for its full timeout.
    Never,
    /// Interrupted by a signal this many times, then ready.
    Interrupted(usize),
    /// Fails with a non-transient error.
    Fail,
}

/// Raw frame content written into every mapped buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPattern {
    /// BGGR mosaic of one solid colour.
    Solid(u8, u8, u8),
    /// Horizontal ramp, identical on every channel.
    Gradient,
}

/// Counters shared between a backend and every device it opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockStats {
    /// Calls to `open`, successful or not.
    pub opens: usize,
    /// Descriptors currently open.
    pub open_handles: usize,
    /// Mappings currently alive.
    pub live_mappings: usize,
    /// Mappings ever created.
    pub mappings_created: usize,
    /// Buffer count last requested.
    pub requested_buffers: u32,
    /// Buffer indices handed to the driver, in order.
    pub queued: Vec<u32>,
    /// Controls applied, in order.
    pub controls: Vec<(u32, i32)>,
    /// `stream_on` calls.
    pub stream_on: usize,
    /// `stream_off` calls.
    pub stream_off: usize,
    /// Readiness waits issued.
    pub waits: usize,
    /// Dequeue attempts.
    pub dequeues: usize,
    /// Format requested through `set_format`.
    pub format: Option<Format>,
    /// Crop requested through `set_crop`.
    pub crop: Option<CropRect>,
    /// Stream parameters requested through `set_stream_params`.
    pub stream_params: Option<StreamParams>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    input_name: String,
    capabilities: DeviceCapabilities,
    granted_buffers: Option<u32>,
    fail_open: bool,
    fail_control: Option<u32>,
    fail_stream_params: bool,
    fail_crop: bool,
    negotiated: Option<Format>,
    fail_map: Option<u32>,
    fail_queue: Option<u32>,
    fail_stream_on: bool,
    fail_stream_off: bool,
    wait: WaitScript,
    transient_dequeues: usize,
    bytes_used: Option<u32>,
    pattern: TestPattern,
}

/// Simulated V4L2 driver.
#[derive(Debug, Clone)]
pub struct MockBackend {
    config: MockConfig,
    stats: Arc<Mutex<MockStats>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// A well-behaved device reporting the expected input.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: MockConfig {
                input_name: crate::config::EXPECTED_INPUT.to_owned(),
                capabilities: DeviceCapabilities {
                    driver: "mock".to_owned(),
                    card: "Mock CSI".to_owned(),
                    bus_info: "mock:0".to_owned(),
                    can_capture: true,
                    can_stream: true,
                },
                granted_buffers: None,
                fail_open: false,
                fail_control: None,
                fail_stream_params: false,
                fail_crop: false,
                negotiated: None,
                fail_map: None,
                fail_queue: None,
                fail_stream_on: false,
                fail_stream_off: false,
                wait: WaitScript::Ready,
                transient_dequeues: 0,
                bytes_used: None,
                pattern: TestPattern::Solid(200, 100, 50),
            },
            stats: Arc::new(Mutex::new(MockStats::default())),
        }
    }

    /// Report `name` as the active input.
    #[must_use]
    pub fn with_input_name(mut self, name: &str) -> Self {
        name.clone_into(&mut self.config.input_name);
        self
    }

    /// Report these capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.config.capabilities = capabilities;
        self
    }

    /// Grant `count` buffers regardless of the request.
    #[must_use]
    pub const fn with_granted_buffers(mut self, count: u32) -> Self {
        self.config.granted_buffers = Some(count);
        self
    }

    /// Fail every open.
    #[must_use]
    pub const fn with_failing_open(mut self) -> Self {
        self.config.fail_open = true;
        self
    }

    /// Reject control `id`.
    #[must_use]
    pub const fn with_failing_control(mut self, id: u32) -> Self {
        self.config.fail_control = Some(id);
        self
    }

    /// Reject stream parameters.
    #[must_use]
    pub const fn with_failing_stream_params(mut self) -> Self {
        self.config.fail_stream_params = true;
        self
    }

    /// Reject the crop rectangle.
    #[must_use]
    pub const fn with_failing_crop(mut self) -> Self {
        self.config.fail_crop = true;
        self
    }

    /// Answer `set_format` with `format` instead of the request.
    #[must_use]
    pub const fn with_negotiated_format(mut self, format: Format) -> Self {
        self.config.negotiated = Some(format);
        self
    }

    /// Fail mapping buffer `index`.
    #[must_use]
    pub const fn with_failing_map(mut self, index: u32) -> Self {
        self.config.fail_map = Some(index);
        self
    }

    /// Fail queueing buffer `index`.
    #[must_use]
    pub const fn with_failing_queue(mut self, index: u32) -> Self {
        self.config.fail_queue = Some(index);
        self
    }

    /// Fail stream-on.
    #[must_use]
    pub const fn with_failing_stream_on(mut self) -> Self {
        self.config.fail_stream_on = true;
        self
    }

    /// Fail stream-off.
    #[must_use]
    pub const fn with_failing_stream_off(mut self) -> Self {
        self.config.fail_stream_off = true;
        self
    }

    /// Script readiness waits.
    #[must_use]
    pub const fn with_wait(mut self, wait: WaitScript) -> Self {
        self.config.wait = wait;
        self
    }

    /// Fail the first `count` dequeues transiently, alternating
    /// `EAGAIN` and `EIO`.
    #[must_use]
    pub const fn with_transient_dequeues(mut self, count: usize) -> Self {
        self.config.transient_dequeues = count;
        self
    }

    /// Report `bytes` as the payload of every dequeued buffer.
    #[must_use]
    pub const fn with_bytes_used(mut self, bytes: u32) -> Self {
        self.config.bytes_used = Some(bytes);
        self
    }

    /// Fill mapped buffers with `pattern`.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.config.pattern = pattern;
        self
    }

    /// Snapshot of the shared counters.
    #[must_use]
    pub fn stats(&self) -> MockStats {
        lock(&self.stats).clone()
    }
}

impl VideoBackend for MockBackend {
    type Device = MockDevice;

    fn open(&self, _path: &Path) -> io::Result<MockDevice> {
        let mut stats = lock(&self.stats);
        stats.opens += 1;
        if self.config.fail_open {
            return Err(io::Error::from_raw_os_error(libc::ENOENT));
        }
        stats.open_handles += 1;
        drop(stats);

        Ok(MockDevice {
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
            format: None,
            queue: VecDeque::new(),
            interrupts_left: match self.config.wait {
                WaitScript::Interrupted(n) => n,
                _ => 0,
            },
            transient_left: self.config.transient_dequeues,
            sequence: 0,
        })
    }
}

/// Open handle on the simulated driver. Dropping it closes the descriptor.
#[derive(Debug)]
pub struct MockDevice {
    config: MockConfig,
    stats: Arc<Mutex<MockStats>>,
    format: Option<Format>,
    queue: VecDeque<u32>,
    interrupts_left: usize,
    transient_left: usize,
    sequence: u32,
}

impl MockDevice {
    fn stats(&self) -> MutexGuard<'_, MockStats> {
        lock(&self.stats)
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.stats().open_handles -= 1;
    }
}

/// A simulated mapping. Dropping it decrements the live-mapping count.
#[derive(Debug)]
pub struct MockMapping {
    data: Vec<u8>,
    stats: Arc<Mutex<MockStats>>,
}

impl MappedRegion for MockMapping {
    fn bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for MockMapping {
    fn drop(&mut self) {
        lock(&self.stats).live_mappings -= 1;
    }
}

impl VideoDevice for MockDevice {
    type Mapping = MockMapping;

    fn current_input(&mut self) -> io::Result<u32> {
        Ok(0)
    }

    fn input_name(&mut self, index: u32) -> io::Result<String> {
        if index == 0 {
            Ok(self.config.input_name.clone())
        } else {
            Err(io::Error::from_raw_os_error(libc::EINVAL))
        }
    }

    fn set_control(&mut self, id: u32, value: i32) -> io::Result<()> {
        if self.config.fail_control == Some(id) {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        self.stats().controls.push((id, value));
        Ok(())
    }

    fn capabilities(&mut self) -> io::Result<DeviceCapabilities> {
        Ok(self.config.capabilities.clone())
    }

    fn set_stream_params(&mut self, params: &StreamParams) -> io::Result<()> {
        if self.config.fail_stream_params {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        self.stats().stream_params = Some(*params);
        Ok(())
    }

    fn set_crop(&mut self, rect: &CropRect) -> io::Result<()> {
        if self.config.fail_crop {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        self.stats().crop = Some(*rect);
        Ok(())
    }

    fn set_format(&mut self, format: &Format) -> io::Result<Format> {
        self.stats().format = Some(format.clone());
        let actual = self
            .config
            .negotiated
            .clone()
            .unwrap_or_else(|| format.clone());
        self.format = Some(actual.clone());
        Ok(actual)
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        self.stats().requested_buffers = count;
        Ok(self.config.granted_buffers.unwrap_or(count))
    }

    fn query_buffer(&mut self, index: u32) -> io::Result<BufferInfo> {
        let length = self.format.as_ref().map_or(0, |f| f.size);
        Ok(BufferInfo {
            index,
            length,
            offset: index * length,
        })
    }

    fn map_buffer(&mut self, info: &BufferInfo) -> io::Result<MockMapping> {
        if self.config.fail_map == Some(info.index) {
            return Err(io::Error::from_raw_os_error(libc::ENOMEM));
        }
        let data = match &self.format {
            Some(format) => {
                let packed = generate_bayer_frame(format.width, format.height, self.config.pattern);
                pad_rows(&packed, format, info.length as usize)
            }
            None => vec![0; info.length as usize],
        };

        let mut stats = self.stats();
        stats.live_mappings += 1;
        stats.mappings_created += 1;
        drop(stats);

        Ok(MockMapping {
            data,
            stats: Arc::clone(&self.stats),
        })
    }

    fn queue_buffer(&mut self, index: u32) -> io::Result<()> {
        if self.config.fail_queue == Some(index) {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        self.stats().queued.push(index);
        self.queue.push_back(index);
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer> {
        self.stats().dequeues += 1;

        if self.transient_left > 0 {
            self.transient_left -= 1;
            return Err(if self.transient_left % 2 == 0 {
                io::Error::from_raw_os_error(libc::EIO)
            } else {
                io::Error::from(io::ErrorKind::WouldBlock)
            });
        }

        let index = self
            .queue
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::WouldBlock))?;
        let bytes_used = self
            .config
            .bytes_used
            .unwrap_or_else(|| self.format.as_ref().map_or(0, |f| f.size));
        let sequence = self.sequence;
        self.sequence += 1;

        Ok(DequeuedBuffer {
            index,
            bytes_used,
            sequence,
        })
    }

    fn stream_on(&mut self) -> io::Result<()> {
        self.stats().stream_on += 1;
        if self.config.fail_stream_on {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        self.stats().stream_off += 1;
        if self.config.fail_stream_off {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        Ok(())
    }

    fn wait_readable(&mut self, timeout: Duration) -> io::Result<Readiness> {
        self.stats().waits += 1;

        match self.config.wait {
            WaitScript::Ready => Ok(Readiness::Ready),
            WaitScript::Never => {
                std::thread::sleep(timeout);
                Ok(Readiness::TimedOut)
            }
            WaitScript::Interrupted(_) => {
                if self.interrupts_left > 0 {
                    self.interrupts_left -= 1;
                    Err(io::Error::from(io::ErrorKind::Interrupted))
                } else {
                    Ok(Readiness::Ready)
                }
            }
            WaitScript::Fail => Err(io::Error::from_raw_os_error(libc::EBADF)),
        }
    }
}

fn lock(stats: &Mutex<MockStats>) -> MutexGuard<'_, MockStats> {
    stats
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Lay packed rows out at `format.stride`, leaving padding bytes as
/// [`ROW_PADDING`].
fn pad_rows(packed: &[u8], format: &Format, len: usize) -> Vec<u8> {
    let row_len = format.row_len();
    let stride = (format.stride as usize).max(row_len);
    if row_len == 0 {
        return vec![ROW_PADDING; len];
    }
    let mut data = vec![ROW_PADDING; len.max(format.frame_span())];
    for (row, src) in packed.chunks_exact(row_len).enumerate() {
        let start = row * stride;
        if let Some(dst) = data.get_mut(start..start + row_len) {
            dst.copy_from_slice(src);
        }
    }
    data
}

/// Byte written into row padding of simulated buffers.
pub const ROW_PADDING: u8 = 0;

/// Generate a BGGR mosaic of `pattern`.
pub fn generate_bayer_frame(width: u32, height: u32, pattern: TestPattern) -> Vec<u8> {
    let mut data = Vec::with_capacity(width as usize * height as usize);

    for y in 0..height {
        for x in 0..width {
            let (r, g, b) = match pattern {
                TestPattern::Solid(r, g, b) => (r, g, b),
                TestPattern::Gradient => {
                    #[allow(clippy::cast_possible_truncation)]
                    let v = ((x * 255) / width.max(2).saturating_sub(1)).min(255) as u8;
                    (v, v, v)
                }
            };
            data.push(match (y % 2, x % 2) {
                (0, 0) => b,
                (1, 1) => r,
                _ => g,
            });
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::FourCC;

    #[test]
    fn test_mock_handles_are_counted() {
        let backend = MockBackend::new();
        let device = backend.open(Path::new("/dev/mock")).expect("open should succeed");
        assert_eq!(backend.stats().open_handles, 1);

        drop(device);
        let stats = backend.stats();
        assert_eq!(stats.open_handles, 0);
        assert_eq!(stats.opens, 1);
    }

    #[test]
    fn test_mock_mappings_are_counted() {
        let backend = MockBackend::new();
        let mut device = backend.open(Path::new("/dev/mock")).expect("open should succeed");
        device
            .set_format(&Format::new(4, 4, FourCC::SBGGR8))
            .expect("set_format should succeed");

        let info = device.query_buffer(0).expect("query should succeed");
        let mapping = device.map_buffer(&info).expect("map should succeed");
        assert_eq!(mapping.bytes().len(), 16);
        assert_eq!(backend.stats().live_mappings, 1);

        drop(mapping);
        assert_eq!(backend.stats().live_mappings, 0);
    }

    #[test]
    fn test_transient_dequeues_alternate() {
        let backend = MockBackend::new().with_transient_dequeues(2);
        let mut device = backend.open(Path::new("/dev/mock")).expect("open should succeed");
        device.queue_buffer(0).expect("queue should succeed");

        let first = device.dequeue_buffer().expect_err("first is transient");
        assert_eq!(first.kind(), io::ErrorKind::WouldBlock);
        let second = device.dequeue_buffer().expect_err("second is transient");
        assert_eq!(second.raw_os_error(), Some(libc::EIO));
        assert_eq!(device.dequeue_buffer().expect("third succeeds").index, 0);
    }

    #[test]
    fn test_bayer_solid_pattern_layout() {
        let data = generate_bayer_frame(4, 2, TestPattern::Solid(10, 20, 30));
        assert_eq!(data, [30, 20, 30, 20, 20, 10, 20, 10]);
    }

    #[test]
    fn test_bayer_gradient_pattern() {
        let data = generate_bayer_frame(64, 2, TestPattern::Gradient);
        assert_eq!(data.first().copied(), Some(0));
        assert_eq!(data.get(63).copied(), Some(255));
    }
}
