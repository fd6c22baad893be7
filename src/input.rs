//! Machine switch events from a Linux evdev node.
//!
//! A thin pass-through: reads and ioctls go straight to the kernel and no
//! state is kept between calls.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::sys::{self, INPUT_EVENT_SIZE};

/// Most events returned by one [`InputDevice::read_events`] call.
pub const MAX_BURST: usize = 64;

/// `SW_MAX` from `linux/input-event-codes.h`.
const SW_MAX: usize = 0x10;
/// Bytes needed for a bitmask covering every switch code.
const SW_BITS_LEN: usize = SW_MAX / 8 + 1;

/// Event types the switch node emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// `EV_SYN`
    Sync,
    /// `EV_SW`
    Switch,
    /// Any other type code.
    Other(u16),
}

impl From<u16> for EventType {
    fn from(code: u16) -> Self {
        match code {
            0x00 => Self::Sync,
            0x05 => Self::Switch,
            other => Self::Other(other),
        }
    }
}

/// Switches wired to the machine's input node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputSwitch {
    /// Lid door 1.
    Door1 = 0x00,
    /// Lid door 2.
    Door2 = 0x01,
    /// Front button.
    Button = 0x02,
    /// Both doors.
    Doors = 0x03,
    /// Emergency stop.
    EStop = 0x04,
    /// Laser interlock.
    Interlock = 0x05,
    /// Latched interlock.
    InterlockLatch = 0x06,
    /// Print head presence.
    Head = 0x07,
}

impl InputSwitch {
    /// Every switch, in code order.
    pub const ALL: [Self; 8] = [
        Self::Door1,
        Self::Door2,
        Self::Button,
        Self::Doors,
        Self::EStop,
        Self::Interlock,
        Self::InterlockLatch,
        Self::Head,
    ];

    /// Kernel switch code.
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u16> for InputSwitch {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, u16> {
        Self::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or(code)
    }
}

/// One decoded `input_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    /// Kernel timestamp.
    pub time: Duration,
    /// Event type.
    pub kind: EventType,
    /// Type-specific code; for switch events, the switch code.
    pub code: u16,
    /// Event value; for switch events, 1 when closed.
    pub value: i32,
}

impl InputEvent {
    fn from_raw((sec, usec, kind, code, value): sys::RawInputEvent) -> Self {
        let secs = u64::try_from(sec).unwrap_or_default();
        let micros = u64::try_from(usec).unwrap_or_default();
        Self {
            time: Duration::from_secs(secs) + Duration::from_micros(micros),
            kind: EventType::from(kind),
            code,
            value,
        }
    }

    /// The switch this event reports, if it is a known switch event.
    #[must_use]
    pub fn switch(&self) -> Option<InputSwitch> {
        if self.kind == EventType::Switch {
            InputSwitch::try_from(self.code).ok()
        } else {
            None
        }
    }
}

/// Snapshot of the `EV_SW` state bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwitchStates {
    bits: [u8; SW_BITS_LEN],
}

impl SwitchStates {
    /// Wrap a raw bitmask.
    #[must_use]
    pub const fn from_bits(bits: [u8; SW_BITS_LEN]) -> Self {
        Self { bits }
    }

    /// Whether `switch` is active.
    #[must_use]
    pub fn is_set(&self, switch: InputSwitch) -> bool {
        let code = usize::from(switch.code());
        self.bits
            .get(code / 8)
            .is_some_and(|byte| byte & (1 << (code % 8)) != 0)
    }

    /// Active switches, in code order.
    pub fn active(&self) -> impl Iterator<Item = InputSwitch> + '_ {
        InputSwitch::ALL.into_iter().filter(|s| self.is_set(*s))
    }
}

/// An open evdev node.
#[derive(Debug)]
pub struct InputDevice {
    file: File,
}

impl InputDevice {
    /// Open `path` read-only and non-blocking.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "opened input device");
        Ok(Self::from_file(file))
    }

    /// Wrap an already-open descriptor.
    #[must_use]
    pub const fn from_file(file: File) -> Self {
        Self { file }
    }

    /// Read one event. Returns `None` when nothing is pending.
    pub fn read_event(&mut self) -> io::Result<Option<InputEvent>> {
        let mut buf = [0u8; INPUT_EVENT_SIZE];
        match self.file.read(&mut buf) {
            Ok(n) => Ok(sys::decode_input_events(buf.get(..n).unwrap_or_default())
                .into_iter()
                .next()
                .map(InputEvent::from_raw)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read up to [`MAX_BURST`] pending events in one call.
    ///
    /// An empty queue surfaces as a `WouldBlock` error.
    pub fn read_events(&mut self) -> io::Result<Vec<InputEvent>> {
        let mut buf = vec![0u8; INPUT_EVENT_SIZE * MAX_BURST];
        let n = self.file.read(&mut buf)?;
        Ok(sys::decode_input_events(buf.get(..n).unwrap_or_default())
            .into_iter()
            .map(InputEvent::from_raw)
            .collect())
    }

    /// Take or drop exclusive access to the device.
    pub fn grab(&mut self, exclusive: bool) -> io::Result<()> {
        sys::grab_input(self.fd(), exclusive)
    }

    /// Current switch bitmask.
    pub fn switch_states(&self) -> io::Result<SwitchStates> {
        let mut bits = [0u8; SW_BITS_LEN];
        sys::switch_bits(self.fd(), &mut bits)?;
        Ok(SwitchStates::from_bits(bits))
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
