//! Host platform classification
//!
//! The encoder is driven differently depending on which audio capture
//! backend the host OS offers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Capture backend family of the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "os", content = "name")]
pub enum CapturePlatform {
    /// WASAPI loopback, with DirectShow as the legacy fallback
    Windows,
    /// AVFoundation, devices addressed by index; system audio needs a
    /// virtual loopback driver such as BlackHole
    MacOs,
    /// No argument mapping exists
    Unsupported(String),
}

impl CapturePlatform {
    /// Detect the platform this binary was built for
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Classify an OS name as reported by `std::env::consts::OS`
    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => Self::Windows,
            "macos" => Self::MacOs,
            other => Self::Unsupported(other.to_string()),
        }
    }

    /// Whether the OS can capture its own output without extra drivers
    pub fn has_native_loopback(&self) -> bool {
        matches!(self, Self::Windows)
    }

    /// Whether the encoder's device listing uses `[index] name` lines
    pub fn has_indexed_device_listing(&self) -> bool {
        matches!(self, Self::MacOs)
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

impl fmt::Display for CapturePlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Windows => write!(f, "windows"),
            Self::MacOs => write!(f, "macos"),
            Self::Unsupported(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_os() {
        assert_eq!(CapturePlatform::from_os("windows"), CapturePlatform::Windows);
        assert_eq!(CapturePlatform::from_os("macos"), CapturePlatform::MacOs);
        assert_eq!(
            CapturePlatform::from_os("linux"),
            CapturePlatform::Unsupported("linux".to_string())
        );
    }

    #[test]
    fn test_loopback_capabilities() {
        assert!(CapturePlatform::Windows.has_native_loopback());
        assert!(!CapturePlatform::MacOs.has_native_loopback());
        assert!(CapturePlatform::MacOs.has_indexed_device_listing());
        assert!(!CapturePlatform::Unsupported("linux".into()).is_supported());
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&CapturePlatform::MacOs).unwrap();
        assert_eq!(json, r#"{"os":"macos"}"#);

        let parsed: CapturePlatform = serde_json::from_str(r#"{"os":"windows"}"#).unwrap();
        assert_eq!(parsed, CapturePlatform::Windows);
    }
}
