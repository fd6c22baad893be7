//! Raw kernel requests that `v4l` does not wrap, plus evdev access.
//!
//! V4L2 structs, request numbers, `ioctl` and `mmap` come from `v4l`'s
//! generated bindings; this module only fills in the requests the safe API
//! lacks (input routing, `VIDIOC_S_CTRL`, capture mode, cropping,
//! per-buffer queueing) and the evdev ioctls.
#![allow(unsafe_code)]

use std::ffi::c_void;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::ptr::{self, NonNull};

use v4l::buffer::Type;
use v4l::memory::Memory;
use v4l::v4l2;
use v4l::v4l2::vidioc;
use v4l::v4l_sys::{
    v4l2_buffer, v4l2_captureparm, v4l2_control, v4l2_crop, v4l2_cropcap, v4l2_fract,
    v4l2_input, v4l2_rect, v4l2_requestbuffers, v4l2_streamparm, v4l2_streamparm__bindgen_ty_1,
};

const CAPTURE: u32 = Type::VideoCapture as u32;
const MMAP: u32 = Memory::Mmap as u32;

/// Issue a V4L2 request, retrying while it is interrupted by a signal.
fn xioctl<T>(fd: RawFd, request: vidioc::_IOC_TYPE, arg: &mut T) -> io::Result<()> {
    loop {
        // SAFETY: `arg` is the argument struct the kernel expects for
        // `request` and stays borrowed for the duration of the call.
        match unsafe { v4l2::ioctl(fd, request, ptr::from_mut(arg).cast()) } {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            other => return other,
        }
    }
}

fn mmap_buffer(index: u32) -> v4l2_buffer {
    v4l2_buffer {
        index,
        type_: CAPTURE,
        memory: MMAP,
        // SAFETY: all-zero is a valid `v4l2_buffer`.
        ..unsafe { mem::zeroed() }
    }
}

/// `VIDIOC_G_INPUT`
pub fn current_input(fd: RawFd) -> io::Result<u32> {
    let mut index: libc::c_int = 0;
    xioctl(fd, vidioc::VIDIOC_G_INPUT, &mut index)?;
    u32::try_from(index).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))
}

/// `VIDIOC_ENUMINPUT`, returning the input's name.
pub fn input_name(fd: RawFd, index: u32) -> io::Result<String> {
    let mut input = v4l2_input {
        index,
        // SAFETY: all-zero is a valid `v4l2_input`.
        ..unsafe { mem::zeroed() }
    };
    xioctl(fd, vidioc::VIDIOC_ENUMINPUT, &mut input)?;
    let len = input
        .name
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(input.name.len());
    Ok(String::from_utf8_lossy(input.name.get(..len).unwrap_or_default()).into_owned())
}

/// `VIDIOC_S_CTRL`. `Device::set_control` goes through the extended-control
/// API, which private sensor controls do not support.
pub fn set_control(fd: RawFd, id: u32, value: i32) -> io::Result<()> {
    let mut ctrl = v4l2_control { id, value };
    xioctl(fd, vidioc::VIDIOC_S_CTRL, &mut ctrl)
}

/// Capture parameters for `VIDIOC_S_PARM`, carrying the raw driver mode.
fn capture_params(numerator: u32, denominator: u32, capture_mode: u32) -> v4l2_streamparm {
    v4l2_streamparm {
        type_: CAPTURE,
        parm: v4l2_streamparm__bindgen_ty_1 {
            capture: v4l2_captureparm {
                capturemode: capture_mode,
                timeperframe: v4l2_fract {
                    numerator,
                    denominator,
                },
                // SAFETY: all-zero is a valid `v4l2_captureparm`.
                ..unsafe { mem::zeroed() }
            },
        },
    }
}

/// `VIDIOC_S_PARM` for video capture. `Capture::set_params` masks the
/// capture mode down to the standard flags, so the request is built here.
pub fn set_stream_params(
    fd: RawFd,
    numerator: u32,
    denominator: u32,
    capture_mode: u32,
) -> io::Result<()> {
    let mut parm = capture_params(numerator, denominator, capture_mode);
    xioctl(fd, vidioc::VIDIOC_S_PARM, &mut parm)
}

/// `VIDIOC_CROPCAP` followed by `VIDIOC_S_CROP`.
pub fn set_crop(fd: RawFd, left: i32, top: i32, width: u32, height: u32) -> io::Result<()> {
    let mut cropcap = v4l2_cropcap {
        type_: CAPTURE,
        // SAFETY: all-zero is a valid `v4l2_cropcap`.
        ..unsafe { mem::zeroed() }
    };
    xioctl(fd, vidioc::VIDIOC_CROPCAP, &mut cropcap)?;

    let mut crop = v4l2_crop {
        type_: CAPTURE,
        c: v4l2_rect {
            left,
            top,
            width,
            height,
        },
    };
    xioctl(fd, vidioc::VIDIOC_S_CROP, &mut crop)
}

/// `VIDIOC_REQBUFS` for memory-mapped capture buffers. Returns the count
/// granted by the driver.
pub fn request_buffers(fd: RawFd, count: u32) -> io::Result<u32> {
    let mut req = v4l2_requestbuffers {
        count,
        type_: CAPTURE,
        memory: MMAP,
        // SAFETY: all-zero is a valid `v4l2_requestbuffers`.
        ..unsafe { mem::zeroed() }
    };
    xioctl(fd, vidioc::VIDIOC_REQBUFS, &mut req)?;
    Ok(req.count)
}

/// `VIDIOC_QUERYBUF`, returning `(length, offset)`.
pub fn query_buffer(fd: RawFd, index: u32) -> io::Result<(u32, u32)> {
    let mut buf = mmap_buffer(index);
    xioctl(fd, vidioc::VIDIOC_QUERYBUF, &mut buf)?;
    // SAFETY: for MMAP buffers the driver fills `m.offset`.
    let offset = unsafe { buf.m.offset };
    Ok((buf.length, offset))
}

/// `VIDIOC_QBUF`
pub fn queue_buffer(fd: RawFd, index: u32) -> io::Result<()> {
    let mut buf = mmap_buffer(index);
    xioctl(fd, vidioc::VIDIOC_QBUF, &mut buf)
}

/// `VIDIOC_DQBUF`, returning `(index, bytesused, sequence)`.
pub fn dequeue_buffer(fd: RawFd) -> io::Result<(u32, u32, u32)> {
    let mut buf = mmap_buffer(0);
    xioctl(fd, vidioc::VIDIOC_DQBUF, &mut buf)?;
    Ok((buf.index, buf.bytesused, buf.sequence))
}

/// `VIDIOC_STREAMON`
pub fn stream_on(fd: RawFd) -> io::Result<()> {
    let mut kind = CAPTURE;
    xioctl(fd, vidioc::VIDIOC_STREAMON, &mut kind)
}

/// `VIDIOC_STREAMOFF`
pub fn stream_off(fd: RawFd) -> io::Result<()> {
    let mut kind = CAPTURE;
    xioctl(fd, vidioc::VIDIOC_STREAMOFF, &mut kind)
}

/// A shared read/write mapping of a driver buffer, unmapped on drop.
#[derive(Debug)]
pub struct MmapRegion {
    ptr: NonNull<c_void>,
    len: usize,
}

impl MmapRegion {
    /// Map `len` bytes of `fd` at `offset`.
    pub fn map(fd: RawFd, len: usize, offset: u32) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        let offset = libc::off_t::try_from(offset)
            .map_err(|_| io::Error::from_raw_os_error(libc::EOVERFLOW))?;
        // SAFETY: a fresh mapping at a kernel-chosen address; failure is
        // reported as an error before the pointer is used.
        let ptr = unsafe {
            v4l2::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                offset,
            )?
        };
        NonNull::new(ptr)
            .map(|ptr| Self { ptr, len })
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOMEM))
    }

    /// The mapped bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the region is mapped readable for `len` bytes until drop.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().cast::<u8>(), self.len) }
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` describe a mapping created by `map` and not
        // yet unmapped.
        if let Err(err) = unsafe { v4l2::munmap(self.ptr.as_ptr(), self.len) } {
            tracing::warn!(error = %err, len = self.len, "munmap failed");
        }
    }
}

const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

/// `_IOC` for the evdev requests, which `v4l` does not carry.
const fn evdev_ioc(dir: u32, nr: u8, size: usize) -> libc::c_ulong {
    #[allow(clippy::cast_possible_truncation)]
    let size = size as u32;
    ((dir << 30) | (size << 16) | ((b'E' as u32) << 8) | nr as u32) as libc::c_ulong
}

const EVIOCGRAB: libc::c_ulong = evdev_ioc(IOC_WRITE, 0x90, mem::size_of::<libc::c_int>());

/// `EVIOCGSW(len)`
const fn eviocgsw(len: usize) -> libc::c_ulong {
    evdev_ioc(IOC_READ, 0x1b, len)
}

/// Size of one kernel `struct input_event`.
pub const INPUT_EVENT_SIZE: usize = mem::size_of::<libc::input_event>();

/// Raw fields of one input event: `(sec, usec, type, code, value)`.
pub type RawInputEvent = (i64, i64, u16, u16, i32);

/// Decode events packed in `bytes`; trailing partial events are ignored.
pub fn decode_input_events(bytes: &[u8]) -> Vec<RawInputEvent> {
    bytes
        .chunks_exact(INPUT_EVENT_SIZE)
        .map(|chunk| {
            // SAFETY: `chunk` holds exactly one `input_event` worth of bytes,
            // every bit pattern is a valid `input_event`, and
            // `read_unaligned` tolerates the byte buffer's alignment.
            let event: libc::input_event =
                unsafe { std::ptr::read_unaligned(chunk.as_ptr().cast()) };
            (
                i64::from(event.time.tv_sec),
                i64::from(event.time.tv_usec),
                event.type_,
                event.code,
                event.value,
            )
        })
        .collect()
}

/// `EVIOCGRAB`
pub fn grab_input(fd: RawFd, exclusive: bool) -> io::Result<()> {
    let flag = libc::c_ulong::from(exclusive);
    // SAFETY: EVIOCGRAB takes its argument by value.
    let ret = unsafe { libc::ioctl(fd, EVIOCGRAB as _, flag) };
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// `EVIOCGSW`, filling `bits` with the switch state bitmask.
pub fn switch_bits(fd: RawFd, bits: &mut [u8]) -> io::Result<()> {
    loop {
        // SAFETY: the kernel writes at most `bits.len()` bytes, the size
        // encoded in the request.
        let ret = unsafe { libc::ioctl(fd, eviocgsw(bits.len()) as _, bits.as_mut_ptr()) };
        if ret != -1 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
