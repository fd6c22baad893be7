//! gfcam: single-shot still capture from the Glowforge lid and head cameras.
//!
//! One call negotiates the V4L2 device, maps a pair of kernel buffers,
//! streams until one raw BGGR frame arrives, demosaics it to RGB24 and
//! optionally compresses it to JPEG. Every descriptor and mapping is
//! released before the call returns, on success or failure.
//!
//! The device layer sits behind the [`VideoBackend`] / [`VideoDevice`]
//! traits so the pipeline can be exercised against a simulated driver.

pub mod buffer;
pub mod camera;
pub mod capture;
pub mod config;
pub mod controls;
pub mod demosaic;
pub mod device;
pub mod encode;
pub mod input;
pub mod session;
mod sys;
pub mod traits;
pub mod validation;

#[cfg(test)]
pub mod mock;

pub use camera::{capture_jpeg, capture_rgb, Camera};
pub use config::{CameraSelect, CaptureConfig, CaptureRequest, DeviceSettings};
pub use controls::{ControlEntry, ControlTable};
pub use demosaic::{demosaic, BayerLayout, DecodedImage};
pub use device::{V4L2Backend, V4L2Device};
pub use encode::{encode, EncodedImage};
pub use input::{InputDevice, InputEvent, InputSwitch, SwitchStates};
pub use traits::{
    CameraError, DeviceCapabilities, ErrorKind, Format, FourCC, VideoBackend, VideoDevice,
};
