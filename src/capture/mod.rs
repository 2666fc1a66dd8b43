//! Capture platform and device definitions
//!
//! The recorder never touches audio APIs directly; these types describe the
//! host backend and devices so the encoder can be pointed at them.

pub mod platform;
pub mod types;

pub use platform::CapturePlatform;
pub use types::{DeviceDescriptor, DeviceSelector};
