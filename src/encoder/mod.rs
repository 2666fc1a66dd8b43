//! FFmpeg encoder integration
//!
//! This module provides argument construction, binary resolution and device
//! discovery for the external FFmpeg encoder.

pub mod args;
pub mod binary;
pub mod devices;

pub use args::{
    build_list_devices_args, build_recording_args, ArgsError, EncoderArgs, FallbackSelection,
    PlatformArgs,
};
pub use binary::EncoderLocator;
pub use devices::{list_devices, parse_device_catalog, DeviceListing};
