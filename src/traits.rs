//! Core traits and types for the capture backend.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Pixel format representation (e.g., BA81, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// Raw Bayer, 8 bits per sample, BGGR tiling (`V4L2_PIX_FMT_SBGGR8`).
    pub const SBGGR8: Self = Self::new(b"BA81");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");

    /// Bytes occupied by one pixel in a single-plane buffer of this format.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self.0 {
            [b'R', b'G', b'B', b'3'] => 3,
            _ => 1,
        }
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Negotiated video format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// Create a new format with a tightly packed stride.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let stride = width * fourcc.bytes_per_pixel();
        let size = stride * height;
        Self {
            width,
            height,
            fourcc,
            stride,
            size,
        }
    }

    /// Whether two formats describe the same frame geometry and layout.
    ///
    /// Stride and size are driver-reported and may include padding, so only
    /// dimensions and pixel format are compared; see [`Format::row_len`].
    #[must_use]
    pub fn same_layout(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.fourcc == other.fourcc
    }

    /// Bytes of pixel data in one row, excluding padding.
    #[must_use]
    pub const fn row_len(&self) -> usize {
        self.width as usize * self.fourcc.bytes_per_pixel() as usize
    }

    /// Bytes a buffer must hold for one frame: every row at `stride`, with
    /// the last row unpadded.
    #[must_use]
    pub const fn frame_span(&self) -> usize {
        match self.height {
            0 => 0,
            h => self.stride as usize * (h as usize - 1) + self.row_len(),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.fourcc)
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// A frame period expressed as a fraction of a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    /// Numerator.
    pub numerator: u32,
    /// Denominator.
    pub denominator: u32,
}

impl Fraction {
    /// Create a new fraction.
    #[must_use]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }
}

/// Capture timing parameters applied with `VIDIOC_S_PARM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    /// Time per frame.
    pub frame_interval: Fraction,
    /// Driver-specific capture mode.
    pub capture_mode: u32,
}

/// Crop rectangle in sensor pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    /// Left edge.
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CropRect {
    /// Crop rectangle covering a full `width` x `height` sensor.
    #[must_use]
    pub const fn full(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
        }
    }
}

/// Kernel-reported placement of one memory-mapped buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// Buffer index within the request.
    pub index: u32,
    /// Length of the buffer in bytes.
    pub length: u32,
    /// Offset to pass to `mmap`.
    pub offset: u32,
}

/// A buffer returned by the driver after it was filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedBuffer {
    /// Buffer index.
    pub index: u32,
    /// Bytes of payload written by the driver (0 if not reported).
    pub bytes_used: u32,
    /// Frame sequence number.
    pub sequence: u32,
}

/// Outcome of a bounded readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The descriptor has a buffer ready to dequeue.
    Ready,
    /// Nothing happened within the bound.
    TimedOut,
}

/// Negotiation or capture step, used to label I/O failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `VIDIOC_G_INPUT` / `VIDIOC_ENUMINPUT`.
    InputQuery,
    /// Setting the camera-selector control.
    CameraSelect,
    /// `VIDIOC_QUERYCAP`.
    CapabilityQuery,
    /// `VIDIOC_S_PARM`.
    SetParm,
    /// `VIDIOC_CROPCAP` / `VIDIOC_S_CROP`.
    Crop,
    /// `VIDIOC_S_FMT`.
    Format,
    /// `VIDIOC_REQBUFS`.
    RequestBuffers,
    /// `VIDIOC_QUERYBUF`.
    QueryBuffer,
    /// Mapping a kernel buffer.
    Mmap,
    /// `VIDIOC_QBUF`.
    Enqueue,
    /// `VIDIOC_STREAMON`.
    StreamOn,
    /// Readiness wait on the device descriptor.
    Wait,
    /// `VIDIOC_DQBUF`.
    Dequeue,
    /// `VIDIOC_STREAMOFF`.
    StreamOff,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InputQuery => "input-query",
            Self::CameraSelect => "camera-select",
            Self::CapabilityQuery => "capability-query",
            Self::SetParm => "set-parm",
            Self::Crop => "crop",
            Self::Format => "format",
            Self::RequestBuffers => "request-buffers",
            Self::QueryBuffer => "query-buffer",
            Self::Mmap => "mmap",
            Self::Enqueue => "enqueue",
            Self::StreamOn => "stream-on",
            Self::Wait => "wait",
            Self::Dequeue => "dequeue",
            Self::StreamOff => "stream-off",
        };
        f.write_str(name)
    }
}

/// Coarse classification of a [`CameraError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid parameters or an incompatible device; never retried.
    Configuration,
    /// A hardware-negotiation or buffer failure.
    Io,
    /// No frame arrived within the bounded wait.
    Timeout,
    /// The frame was captured but could not be compressed.
    Encoding,
}

/// Error type for camera operations.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// Camera selector outside {0, 1}.
    #[error("camera selector must be 0 or 1, got {0}")]
    InvalidCamera(i64),
    /// Exposure outside [0, 65535].
    #[error("exposure must be between 0 and 65535, got {0}")]
    InvalidExposure(i64),
    /// Gain outside [0, 1023].
    #[error("gain must be between 0 and 1023, got {0}")]
    InvalidGain(i64),
    /// The active video input is not the expected routing.
    #[error("video input ({actual}) is not '{expected}'")]
    InputMismatch {
        /// Input name the pipeline requires.
        expected: String,
        /// Input name reported by the device.
        actual: String,
    },
    /// The device lacks a required capability.
    #[error("{} is not a {capability} device", .path.display())]
    MissingCapability {
        /// Device path.
        path: PathBuf,
        /// Human-readable capability name.
        capability: &'static str,
    },
    /// The driver adjusted the requested format.
    #[error("driver negotiated {actual} instead of {requested}")]
    FormatMismatch {
        /// Format that was requested.
        requested: Format,
        /// Format the driver settled on.
        actual: Format,
    },
    /// The configured pixel format is not an 8-bit Bayer layout.
    #[error("unsupported raw pixel format {0}")]
    UnsupportedFormat(FourCC),
    /// The device node could not be opened.
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        /// Device path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// A negotiation or capture step failed.
    #[error("{op} failed: {source}")]
    Io {
        /// The failing step.
        op: Operation,
        /// Underlying error.
        source: io::Error,
    },
    /// A control from the control table could not be applied.
    #[error("failed to set control {name} ({id:#x}) to {value}: {source}")]
    Control {
        /// Control id.
        id: u32,
        /// Control name from the table.
        name: &'static str,
        /// Value that was attempted.
        value: i32,
        /// Underlying error.
        source: io::Error,
    },
    /// The driver granted fewer buffers than the capture protocol needs.
    #[error("insufficient buffers: device granted {granted}, need at least {required}")]
    InsufficientBuffers {
        /// Buffers granted by the driver.
        granted: u32,
        /// Minimum required.
        required: u32,
    },
    /// The driver handed back a buffer index the pool does not own.
    #[error("device returned unknown buffer index {0}")]
    UnknownBuffer(u32),
    /// A filled buffer is smaller than one frame.
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    ShortFrame {
        /// Bytes required for one frame.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },
    /// No frame arrived within the bounded wait.
    #[error("select timeout: no frame within {0:?}")]
    Timeout(Duration),
    /// Compression of a captured frame failed.
    #[error("image encoding failed: {0}")]
    Encoding(String),
}

impl CameraError {
    /// Wrap an I/O error with the step that produced it.
    #[must_use]
    pub const fn io(op: Operation, source: io::Error) -> Self {
        Self::Io { op, source }
    }

    /// The kind of failure, as seen by a caller deciding whether to retry.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCamera(_)
            | Self::InvalidExposure(_)
            | Self::InvalidGain(_)
            | Self::InputMismatch { .. }
            | Self::MissingCapability { .. }
            | Self::FormatMismatch { .. }
            | Self::UnsupportedFormat(_) => ErrorKind::Configuration,
            Self::Open { .. }
            | Self::Io { .. }
            | Self::Control { .. }
            | Self::InsufficientBuffers { .. }
            | Self::UnknownBuffer(_)
            | Self::ShortFrame { .. } => ErrorKind::Io,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Encoding(_) => ErrorKind::Encoding,
        }
    }
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// A memory-mapped kernel buffer. Dropping the value unmaps it.
pub trait MappedRegion {
    /// The mapped bytes.
    fn bytes(&self) -> &[u8];
}

/// Factory for device handles, so a simulated backend can stand in for
/// the kernel driver.
pub trait VideoBackend {
    /// The open-device type produced by this backend.
    type Device: VideoDevice;

    /// Open the device node read-write and non-blocking.
    fn open(&self, path: &std::path::Path) -> io::Result<Self::Device>;
}

/// The raw operations a capture session performs on an open device.
///
/// Each method corresponds to one driver request. Dropping the device
/// closes its descriptor.
pub trait VideoDevice {
    /// Mapping type returned by [`VideoDevice::map_buffer`].
    type Mapping: MappedRegion;

    /// Index of the currently selected video input.
    fn current_input(&mut self) -> io::Result<u32>;

    /// Name of the video input at `index`.
    fn input_name(&mut self, index: u32) -> io::Result<String>;

    /// Set a single control.
    fn set_control(&mut self, id: u32, value: i32) -> io::Result<()>;

    /// Query device capabilities.
    fn capabilities(&mut self) -> io::Result<DeviceCapabilities>;

    /// Set capture timing parameters.
    fn set_stream_params(&mut self, params: &StreamParams) -> io::Result<()>;

    /// Set the capture crop rectangle.
    fn set_crop(&mut self, rect: &CropRect) -> io::Result<()>;

    /// Set capture format. Returns the actual format set by the driver.
    fn set_format(&mut self, format: &Format) -> io::Result<Format>;

    /// Request `count` memory-mapped buffers. Returns the number granted.
    fn request_buffers(&mut self, count: u32) -> io::Result<u32>;

    /// Query length and offset of buffer `index`.
    fn query_buffer(&mut self, index: u32) -> io::Result<BufferInfo>;

    /// Map a queried buffer into process memory, shared and read/write.
    fn map_buffer(&mut self, info: &BufferInfo) -> io::Result<Self::Mapping>;

    /// Hand buffer `index` to the driver.
    fn queue_buffer(&mut self, index: u32) -> io::Result<()>;

    /// Take a filled buffer back from the driver.
    ///
    /// `WouldBlock` or `EIO` signal that no frame is available yet.
    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer>;

    /// Start streaming.
    fn stream_on(&mut self) -> io::Result<()>;

    /// Stop streaming.
    fn stream_off(&mut self) -> io::Result<()>;

    /// Block until a buffer is ready or `timeout` elapses.
    ///
    /// A signal interruption surfaces as an error of kind `Interrupted`.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<Readiness>;
}
