//! Sensor and ISP control table.
//!
//! The table is applied in order, once per session. Two entries carry an
//! override slot whose value comes from the validated capture request
//! instead of the table default.

use crate::config::CaptureConfig;

const V4L2_CID_BASE: u32 = 0x0098_0900;
const V4L2_CID_CAMERA_CLASS_BASE: u32 = 0x009a_0900;
const V4L2_CID_FLASH_CLASS_BASE: u32 = 0x009c_0900;

/// `V4L2_CID_AUTO_WHITE_BALANCE`
pub const CID_AUTO_WHITE_BALANCE: u32 = V4L2_CID_BASE + 12;
/// `V4L2_CID_RED_BALANCE`
pub const CID_RED_BALANCE: u32 = V4L2_CID_BASE + 14;
/// `V4L2_CID_BLUE_BALANCE`
pub const CID_BLUE_BALANCE: u32 = V4L2_CID_BASE + 15;
/// `V4L2_CID_EXPOSURE`
pub const CID_EXPOSURE: u32 = V4L2_CID_BASE + 17;
/// `V4L2_CID_AUTOGAIN`
pub const CID_AUTOGAIN: u32 = V4L2_CID_BASE + 18;
/// `V4L2_CID_GAIN`
pub const CID_GAIN: u32 = V4L2_CID_BASE + 19;
/// `V4L2_CID_HFLIP`
pub const CID_HFLIP: u32 = V4L2_CID_BASE + 20;
/// `V4L2_CID_VFLIP`
pub const CID_VFLIP: u32 = V4L2_CID_BASE + 21;
/// `V4L2_CID_EXPOSURE_AUTO`
pub const CID_EXPOSURE_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 1;
/// `V4L2_CID_FLASH_LED_MODE`
pub const CID_FLASH_LED_MODE: u32 = V4L2_CID_FLASH_CLASS_BASE + 1;
/// `V4L2_CID_FLASH_TORCH_INTENSITY`
pub const CID_FLASH_TORCH_INTENSITY: u32 = V4L2_CID_FLASH_CLASS_BASE + 8;
/// Driver-private control routing the CSI port to the lid or head sensor
/// (`V4L2_CID_PRIVATE_BASE + 8`).
pub const CID_CAMERA_SELECT: u32 = 0x0800_0000 + 8;

/// Request parameter that replaces a table default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Override {
    /// Use the requested exposure.
    Exposure,
    /// Use the requested gain.
    Gain,
}

/// One control to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlEntry {
    /// V4L2 control id.
    pub id: u32,
    /// Name used in logs and errors.
    pub name: &'static str,
    /// Value applied when no override slot is set.
    pub default: i32,
    /// Optional override slot.
    pub slot: Option<Override>,
}

impl ControlEntry {
    /// A control that is always set to `default`.
    #[must_use]
    pub const fn fixed(id: u32, name: &'static str, default: i32) -> Self {
        Self {
            id,
            name,
            default,
            slot: None,
        }
    }

    /// A control whose value comes from the request.
    #[must_use]
    pub const fn overridable(id: u32, name: &'static str, default: i32, slot: Override) -> Self {
        Self {
            id,
            name,
            default,
            slot: Some(slot),
        }
    }

    /// The value to apply for `config`.
    #[must_use]
    pub fn value_for(&self, config: &CaptureConfig) -> i32 {
        match self.slot {
            Some(Override::Exposure) => i32::from(config.exposure()),
            Some(Override::Gain) => i32::from(config.gain()),
            None => self.default,
        }
    }
}

/// Controls of the lid/head sensor, in application order.
pub const SENSOR_CONTROLS: [ControlEntry; 11] = [
    ControlEntry::fixed(CID_EXPOSURE_AUTO, "exposure-auto", 0),
    ControlEntry::overridable(CID_EXPOSURE, "exposure", 3000, Override::Exposure),
    ControlEntry::fixed(CID_AUTOGAIN, "gain-auto", 0),
    ControlEntry::overridable(CID_GAIN, "gain", 30, Override::Gain),
    ControlEntry::fixed(CID_AUTO_WHITE_BALANCE, "white-balance-auto", 2),
    ControlEntry::fixed(CID_RED_BALANCE, "red-balance", 1100),
    ControlEntry::fixed(CID_BLUE_BALANCE, "blue-balance", 1400),
    ControlEntry::fixed(CID_FLASH_LED_MODE, "flash-led-mode", 2),
    ControlEntry::fixed(CID_FLASH_TORCH_INTENSITY, "flash-intensity", 0),
    ControlEntry::fixed(CID_HFLIP, "flip-h", 1),
    ControlEntry::fixed(CID_VFLIP, "flip-v", 0),
];

/// Ordered list of controls applied during session setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlTable {
    entries: Vec<ControlEntry>,
}

impl Default for ControlTable {
    fn default() -> Self {
        Self::new(SENSOR_CONTROLS.to_vec())
    }
}

impl ControlTable {
    /// Build a table from entries in application order.
    #[must_use]
    pub const fn new(entries: Vec<ControlEntry>) -> Self {
        Self { entries }
    }

    /// A table that applies nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Entries in application order.
    #[must_use]
    pub fn entries(&self) -> &[ControlEntry] {
        &self.entries
    }

    /// Entries paired with the value to apply for `config`.
    pub fn resolve<'a>(
        &'a self,
        config: &'a CaptureConfig,
    ) -> impl Iterator<Item = (&'a ControlEntry, i32)> + 'a {
        self.entries
            .iter()
            .map(move |entry| (entry, entry.value_for(config)))
    }
}
