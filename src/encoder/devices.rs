//! Capture device discovery
//!
//! Runs the encoder in its device-listing mode and parses the AVFoundation
//! section of the output into indexed devices.

use crate::capture::{CapturePlatform, DeviceDescriptor};
use crate::encoder::args::build_list_devices_args;
use crate::utils::error::{RecorderError, RecorderResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

const AUDIO_SECTION_MARKER: &str = "AVFoundation audio devices:";
const VIDEO_SECTION_MARKER: &str = "AVFoundation video devices:";

static DEVICE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+)\]\s+(.+)").expect("device line pattern is valid"));

/// Output of a device listing run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListing {
    pub platform: CapturePlatform,
    /// Unparsed encoder output
    pub raw_text: String,
    /// Only present where the listing uses `[index] name` lines
    pub parsed_devices: Option<Vec<DeviceDescriptor>>,
}

/// Parse the audio section of an AVFoundation device listing
///
/// Duplicated indices are kept as reported.
pub fn parse_device_catalog(diagnostic_text: &str) -> Vec<DeviceDescriptor> {
    let mut devices = Vec::new();
    let mut in_audio_section = false;

    for line in diagnostic_text.lines() {
        if line.contains(AUDIO_SECTION_MARKER) {
            in_audio_section = true;
            continue;
        }

        if !in_audio_section {
            continue;
        }

        if line.contains(VIDEO_SECTION_MARKER) {
            break;
        }

        let Some(captures) = DEVICE_LINE.captures(line) else {
            continue;
        };

        // Indices too large for u32 are not real devices
        let Ok(index) = captures[1].parse::<u32>() else {
            continue;
        };

        devices.push(DeviceDescriptor {
            index,
            name: captures[2].trim().to_string(),
        });
    }

    devices
}

/// Run the encoder's device listing and collect its output
pub async fn list_devices(
    encoder_path: &Path,
    platform: &CapturePlatform,
) -> RecorderResult<DeviceListing> {
    let encoder_args = build_list_devices_args(platform)?;

    tracing::info!("Listing capture devices: {:?}", encoder_args.args);

    let output = Command::new(encoder_path)
        .args(&encoder_args.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(RecorderError::SpawnFailure)?;

    // The listing goes to stderr and the encoder exits non-zero because the
    // dummy input cannot be opened, so the status is not checked.
    tracing::debug!("Device listing exited with {}", output.status);

    let stderr = String::from_utf8_lossy(&output.stderr);
    let raw_text = if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout).into_owned()
    } else {
        stderr.into_owned()
    };

    let parsed_devices = platform
        .has_indexed_device_listing()
        .then(|| parse_device_catalog(&raw_text));

    Ok(DeviceListing {
        platform: platform.clone(),
        raw_text,
        parsed_devices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
[AVFoundation indev @ 0x7f8] AVFoundation audio devices:
[AVFoundation indev @ 0x7f8] [0] Built-in Microphone
[AVFoundation indev @ 0x7f8] [1] BlackHole 2ch
[AVFoundation indev @ 0x7f8] AVFoundation video devices:
[AVFoundation indev @ 0x7f8] [0] FaceTime HD Camera
";

    #[test]
    fn test_parse_single_device() {
        let text = "AVFoundation audio devices:\n[0] Built-in Output\nAVFoundation video devices:\n[1] Camera\n";
        let devices = parse_device_catalog(text);
        assert_eq!(
            devices,
            vec![DeviceDescriptor {
                index: 0,
                name: "Built-in Output".to_string()
            }]
        );
    }

    #[test]
    fn test_parse_prefixed_lines() {
        let devices = parse_device_catalog(LISTING);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].index, 1);
        assert_eq!(devices[1].name, "BlackHole 2ch");
    }

    #[test]
    fn test_lines_before_audio_section_are_ignored() {
        let text = "[3] Not a device\nAVFoundation audio devices:\n[0] Speakers  \n";
        let devices = parse_device_catalog(text);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "Speakers");
    }

    #[test]
    fn test_duplicates_are_preserved() {
        let text = "AVFoundation audio devices:\n[0] A\n[0] B\nnoise line\n";
        let devices = parse_device_catalog(text);
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().all(|d| d.index == 0));
    }

    #[test]
    fn test_no_marker_yields_nothing() {
        assert!(parse_device_catalog("[0] Something\n[1] Else").is_empty());
    }

    #[tokio::test]
    async fn test_list_devices_unsupported_platform() {
        let result = list_devices(
            Path::new("ffmpeg"),
            &CapturePlatform::Unsupported("linux".to_string()),
        )
        .await;
        assert!(matches!(result, Err(RecorderError::UnsupportedPlatform(_))));
    }
}
