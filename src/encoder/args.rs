//! FFmpeg argument construction for audio capture
//!
//! Maps the host platform and the caller's device choice to an ordered
//! argument list. Every recording uses the same MP3 profile and overwrites
//! an existing file at the output path.

use crate::capture::CapturePlatform;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed output encoding profile
pub const AUDIO_CODEC: &str = "libmp3lame";
pub const AUDIO_BITRATE: &str = "192k";
pub const AUDIO_SAMPLE_RATE: u32 = 44100;
pub const AUDIO_CHANNELS: u32 = 2;

/// AVFoundation index used when the caller does not pick a device.
/// Index 1 is where BlackHole usually lands next to the built-in microphone.
pub const DEFAULT_AVFOUNDATION_INDEX: u32 = 1;

/// DirectShow device names commonly exposing system output as an input,
/// tried in order when WASAPI loopback is unavailable
pub const FALLBACK_DEVICE_CANDIDATES: [&str; 8] = [
    "Stereo Mix (Realtek High Definition Audio)",
    "Stereo Mix (Realtek Audio)",
    "Stereo Mix",
    "What U Hear",
    "Wave Out Mix",
    "virtual-audio-capturer",
    "CABLE Input",
    "VB-Audio Virtual Cable",
];

/// Argument construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgsError {
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Output path must not be empty")]
    EmptyOutputPath,
}

/// Which fallback candidate was chosen, so the caller can retry with the next
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackSelection {
    pub index: usize,
    pub total: usize,
    pub device_name: String,
}

impl FallbackSelection {
    /// Index to try after this one fails, if any candidates remain
    pub fn next_index(&self) -> Option<usize> {
        let next = self.index + 1;
        (next < self.total).then_some(next)
    }
}

/// A ready-to-spawn encoder invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderArgs {
    pub args: Vec<String>,
    pub fallback: Option<FallbackSelection>,
}

/// Result of argument construction: either arguments or the reason there are none
pub type PlatformArgs = Result<EncoderArgs, ArgsError>;

/// Build the arguments for a recording session
///
/// `device_index` only applies to AVFoundation. `fallback_mode` switches
/// Windows from WASAPI loopback to DirectShow, using the candidate at
/// `fallback_index` (clamped to the candidate list).
pub fn build_recording_args(
    platform: &CapturePlatform,
    output_path: &str,
    device_index: Option<u32>,
    fallback_mode: bool,
    fallback_index: usize,
) -> PlatformArgs {
    if output_path.is_empty() {
        return Err(ArgsError::EmptyOutputPath);
    }

    match platform {
        CapturePlatform::Windows if fallback_mode => {
            let selection = select_fallback_device(fallback_index);
            tracing::info!(
                "Trying DirectShow device {}/{}: {}",
                selection.index + 1,
                selection.total,
                selection.device_name
            );

            let mut args = input_args("dshow", format!("audio={}", selection.device_name));
            args.extend(output_args(output_path));

            Ok(EncoderArgs {
                args,
                fallback: Some(selection),
            })
        }
        CapturePlatform::Windows => {
            let mut args = input_args("wasapi", "loopback".to_string());
            args.extend(output_args(output_path));

            Ok(EncoderArgs {
                args,
                fallback: None,
            })
        }
        CapturePlatform::MacOs => {
            let index = device_index.unwrap_or(DEFAULT_AVFOUNDATION_INDEX);
            tracing::info!("Using AVFoundation audio device :{}", index);

            let mut args = input_args("avfoundation", format!(":{}", index));
            args.extend(output_args(output_path));

            Ok(EncoderArgs {
                args,
                fallback: None,
            })
        }
        CapturePlatform::Unsupported(name) => Err(ArgsError::UnsupportedPlatform(name.clone())),
    }
}

/// Build the arguments that make the encoder print its capture devices
pub fn build_list_devices_args(platform: &CapturePlatform) -> PlatformArgs {
    let args = match platform {
        CapturePlatform::Windows => ["-f", "wasapi", "-list_devices", "true", "-i", "dummy"],
        CapturePlatform::MacOs => ["-f", "avfoundation", "-list_devices", "true", "-i", ""],
        CapturePlatform::Unsupported(name) => {
            return Err(ArgsError::UnsupportedPlatform(name.clone()))
        }
    };

    Ok(EncoderArgs {
        args: args.iter().map(|arg| arg.to_string()).collect(),
        fallback: None,
    })
}

/// Pick a fallback candidate, clamping out-of-range indices to the last one
pub fn select_fallback_device(index: usize) -> FallbackSelection {
    let total = FALLBACK_DEVICE_CANDIDATES.len();
    let index = index.min(total - 1);

    FallbackSelection {
        index,
        total,
        device_name: FALLBACK_DEVICE_CANDIDATES[index].to_string(),
    }
}

fn input_args(format: &str, input: String) -> Vec<String> {
    vec!["-f".to_string(), format.to_string(), "-i".to_string(), input]
}

fn output_args(output_path: &str) -> Vec<String> {
    vec![
        "-acodec".to_string(),
        AUDIO_CODEC.to_string(),
        "-b:a".to_string(),
        AUDIO_BITRATE.to_string(),
        "-ar".to_string(),
        AUDIO_SAMPLE_RATE.to_string(),
        "-ac".to_string(),
        AUDIO_CHANNELS.to_string(),
        "-y".to_string(),
        output_path.to_string(),
    ]
}
