//! Capture device types

use serde::{Deserialize, Serialize};

/// An audio device reported by the encoder's device listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    /// Index used to address the device in encoder arguments
    pub index: u32,

    /// Display name
    pub name: String,
}

/// Caller's choice of capture device for a session
///
/// The meaning is platform specific: AVFoundation addresses devices by
/// index, while on Windows the only choice is which DirectShow fallback
/// candidate to try when WASAPI loopback is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum DeviceSelector {
    /// AVFoundation audio device index
    Index(u32),
    /// DirectShow fallback candidate index (clamped to the candidate list)
    Fallback(usize),
}

impl DeviceSelector {
    pub fn device_index(&self) -> Option<u32> {
        match self {
            Self::Index(index) => Some(*index),
            Self::Fallback(_) => None,
        }
    }

    pub fn fallback_index(&self) -> Option<usize> {
        match self {
            Self::Index(_) => None,
            Self::Fallback(index) => Some(*index),
        }
    }
}
