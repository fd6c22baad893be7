//! Memory-mapped kernel buffer pool.
//!
//! The pool owns every mapping. Mappings unmap when dropped, so any early
//! return during allocation releases what was already mapped.

use tracing::{debug, trace};

use crate::session::Session;
use crate::traits::{CameraError, MappedRegion, Operation, Result, VideoDevice};

/// Fewest buffers the capture protocol works with.
pub const MIN_BUFFERS: u32 = 2;

/// Ownership state of one kernel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Mapped, not yet handed to the driver.
    Free,
    /// Owned by the driver, waiting to be filled.
    Queued,
    /// Returned by the driver with a frame.
    Filled,
}

/// One mapped kernel buffer.
#[derive(Debug)]
pub struct FrameBuffer<M> {
    index: u32,
    length: usize,
    state: BufferState,
    mapping: M,
}

impl<M: MappedRegion> FrameBuffer<M> {
    /// Kernel buffer index.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Mapped length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.length
    }

    /// Whether the mapping is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> BufferState {
        self.state
    }

    /// The mapped bytes.
    pub fn data(&self) -> &[u8] {
        self.mapping.bytes()
    }
}

/// The set of buffers shared with the driver for one capture.
#[derive(Debug)]
pub struct BufferPool<M> {
    buffers: Vec<FrameBuffer<M>>,
}

impl<M: MappedRegion> BufferPool<M> {
    /// Request `count` buffers from the session's device, map each one, and
    /// queue them all.
    pub fn allocate<D>(session: &mut Session<D>, count: u32) -> Result<Self>
    where
        D: VideoDevice<Mapping = M>,
    {
        let device = session.device_mut();

        let granted = device
            .request_buffers(count)
            .map_err(|e| CameraError::io(Operation::RequestBuffers, e))?;
        if granted < MIN_BUFFERS {
            return Err(CameraError::InsufficientBuffers {
                granted,
                required: MIN_BUFFERS,
            });
        }
        debug!(requested = count, granted, "buffers granted");

        let mut pool = Self {
            buffers: Vec::with_capacity(granted as usize),
        };

        for index in 0..granted {
            let info = device
                .query_buffer(index)
                .map_err(|e| CameraError::io(Operation::QueryBuffer, e))?;
            let mapping = device
                .map_buffer(&info)
                .map_err(|e| CameraError::io(Operation::Mmap, e))?;
            trace!(index, length = info.length, offset = info.offset, "buffer mapped");

            pool.buffers.push(FrameBuffer {
                index,
                length: info.length as usize,
                state: BufferState::Free,
                mapping,
            });
        }

        for buffer in &mut pool.buffers {
            device
                .queue_buffer(buffer.index)
                .map_err(|e| CameraError::io(Operation::Enqueue, e))?;
            buffer.state = BufferState::Queued;
        }
        debug!(count = pool.buffers.len(), "buffers queued");

        Ok(pool)
    }

    /// Number of buffers in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether the pool holds no buffers (after release).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Whether every buffer is with the driver.
    #[must_use]
    pub fn all_queued(&self) -> bool {
        !self.buffers.is_empty()
            && self
                .buffers
                .iter()
                .all(|b| b.state == BufferState::Queued)
    }

    /// Buffer with kernel index `index`.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&FrameBuffer<M>> {
        self.buffers.iter().find(|b| b.index == index)
    }

    /// Record that the driver returned buffer `index` filled.
    pub fn mark_filled(&mut self, index: u32) -> Result<&FrameBuffer<M>> {
        let buffer = self
            .buffers
            .iter_mut()
            .find(|b| b.index == index)
            .ok_or(CameraError::UnknownBuffer(index))?;
        buffer.state = BufferState::Filled;
        Ok(buffer)
    }

    /// Unmap every buffer. Safe to call more than once.
    pub fn release(&mut self) {
        if !self.buffers.is_empty() {
            debug!(count = self.buffers.len(), "unmapping buffers");
            self.buffers.clear();
        }
    }
}

impl<M> Drop for BufferPool<M> {
    fn drop(&mut self) {
        self.buffers.clear();
    }
}
