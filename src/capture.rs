//! Single-shot capture state machine.
//!
//! ```text
//! Configured -> Streaming -> WaitingFrame -> FrameReady -> Stopped
//!                                        \-> Failed -----/
//! ```
//!
//! Each wait is bounded by the session's wait timeout. A signal
//! interruption re-issues the wait; a transient dequeue error (`EAGAIN`,
//! `EIO`) goes back to waiting with a fresh bound. Streaming is turned off
//! on drop if [`CaptureLoop::stop`] was never reached.

use std::borrow::Cow;
use std::io;

use tracing::{debug, trace, warn};

use crate::buffer::BufferPool;
use crate::session::Session;
use crate::traits::{CameraError, FourCC, Operation, Readiness, Result, VideoDevice};

/// Where the loop is in its single capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Buffers queued, not streaming.
    Configured,
    /// Stream-on succeeded.
    Streaming,
    /// Blocked on the descriptor.
    WaitingFrame,
    /// A filled buffer was dequeued.
    FrameReady,
    /// A step failed.
    Failed,
    /// Stream-off issued.
    Stopped,
}

/// A filled buffer, valid until the pool is released.
#[derive(Debug)]
pub struct CapturedFrame<'a> {
    /// One frame of raw bytes, rows `stride` bytes apart.
    pub data: &'a [u8],
    /// Bytes from the start of one row to the next.
    pub stride: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub fourcc: FourCC,
    /// Kernel buffer index.
    pub index: u32,
    /// Driver sequence number.
    pub sequence: u32,
}

impl<'a> CapturedFrame<'a> {
    /// The frame with row padding removed. Borrows when rows are already
    /// packed.
    #[must_use]
    pub fn pixels(&self) -> Cow<'a, [u8]> {
        let row_len = self.width as usize * self.fourcc.bytes_per_pixel() as usize;
        let stride = self.stride as usize;
        if stride <= row_len {
            return Cow::Borrowed(self.data);
        }
        let mut packed = Vec::with_capacity(row_len * self.height as usize);
        for row in self.data.chunks(stride) {
            packed.extend_from_slice(row.get(..row_len).unwrap_or(row));
        }
        Cow::Owned(packed)
    }
}

/// Drives one stream-on, wait, dequeue, stream-off cycle.
pub struct CaptureLoop<'a, D: VideoDevice> {
    session: &'a mut Session<D>,
    pool: &'a mut BufferPool<D::Mapping>,
    state: CaptureState,
    streaming: bool,
}

impl<'a, D: VideoDevice> CaptureLoop<'a, D> {
    /// Wrap a configured session and its queued pool.
    pub fn new(session: &'a mut Session<D>, pool: &'a mut BufferPool<D::Mapping>) -> Self {
        Self {
            session,
            pool,
            state: CaptureState::Configured,
            streaming: false,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    /// Start streaming.
    pub fn start(&mut self) -> Result<()> {
        debug_assert!(self.pool.all_queued(), "buffers must be queued before streaming");

        if let Err(e) = self.session.device_mut().stream_on() {
            self.state = CaptureState::Failed;
            return Err(CameraError::io(Operation::StreamOn, e));
        }
        self.streaming = true;
        self.state = CaptureState::Streaming;
        debug!("streaming started");
        Ok(())
    }

    /// Block until the driver hands back a filled buffer.
    pub fn wait_frame(&mut self) -> Result<CapturedFrame<'_>> {
        let timeout = self.session.settings().wait_timeout;
        let (width, height, fourcc, stride, frame_len) = {
            let format = self.session.format();
            (
                format.width,
                format.height,
                format.fourcc,
                format.stride,
                format.frame_span(),
            )
        };

        self.state = CaptureState::WaitingFrame;
        let device = self.session.device_mut();

        let dequeued = loop {
            match device.wait_readable(timeout) {
                Ok(Readiness::Ready) => {}
                Ok(Readiness::TimedOut) => {
                    self.state = CaptureState::Failed;
                    return Err(CameraError::Timeout(timeout));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    trace!("wait interrupted by signal, retrying");
                    continue;
                }
                Err(e) => {
                    self.state = CaptureState::Failed;
                    return Err(CameraError::io(Operation::Wait, e));
                }
            }

            match device.dequeue_buffer() {
                Ok(buffer) => break buffer,
                Err(e) if is_transient(&e) => {
                    trace!(error = %e, "no frame yet, waiting again");
                }
                Err(e) => {
                    self.state = CaptureState::Failed;
                    return Err(CameraError::io(Operation::Dequeue, e));
                }
            }
        };

        let buffer = match self.pool.mark_filled(dequeued.index) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.state = CaptureState::Failed;
                return Err(e);
            }
        };

        let available = if dequeued.bytes_used == 0 {
            buffer.len()
        } else {
            buffer.len().min(dequeued.bytes_used as usize)
        };
        let Some(data) = buffer.data().get(..frame_len).filter(|_| available >= frame_len) else {
            self.state = CaptureState::Failed;
            return Err(CameraError::ShortFrame {
                expected: frame_len,
                actual: available,
            });
        };

        self.state = CaptureState::FrameReady;
        debug!(
            index = dequeued.index,
            sequence = dequeued.sequence,
            bytes = available,
            "frame dequeued"
        );

        Ok(CapturedFrame {
            data,
            stride,
            width,
            height,
            fourcc,
            index: dequeued.index,
            sequence: dequeued.sequence,
        })
    }

    /// Stop streaming. Does nothing if streaming never started.
    pub fn stop(&mut self) -> Result<()> {
        self.state = CaptureState::Stopped;
        if !self.streaming {
            return Ok(());
        }
        self.streaming = false;

        self.session
            .device_mut()
            .stream_off()
            .map_err(|e| CameraError::io(Operation::StreamOff, e))?;
        debug!("streaming stopped");
        Ok(())
    }
}

impl<D: VideoDevice> Drop for CaptureLoop<'_, D> {
    fn drop(&mut self) {
        if self.streaming {
            if let Err(e) = self.stop() {
                warn!(error = %e, "stream-off during teardown failed");
            }
        }
    }
}

/// `EAGAIN` or `EIO` from a dequeue: the driver has no frame yet.
fn is_transient(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EIO)
}
