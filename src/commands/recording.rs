//! Recording commands
//!
//! Session operations as seen by a host: every call returns a serializable
//! `{success, ...}` response instead of an error.

use crate::capture::{CapturePlatform, DeviceDescriptor, DeviceSelector};
use crate::config::RecorderConfig;
use crate::encoder::FallbackSelection;
use crate::recorder::{RecordingEvent, RecordingManager, SessionState};
use crate::utils::error::{ErrorResponse, RecorderError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Application state for recording
#[derive(Clone)]
pub struct RecorderState {
    pub manager: Arc<RecordingManager>,
}

impl RecorderState {
    pub fn new(config: &RecorderConfig) -> Self {
        Self {
            manager: Arc::new(RecordingManager::new(config)),
        }
    }
}

impl Default for RecorderState {
    fn default() -> Self {
        Self::new(&RecorderConfig::default().with_env_overrides())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// DirectShow candidate in use, when recording through the fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDevicesResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<CapturePlatform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_devices: Option<Vec<DeviceDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

/// File name used when the host has no save dialog
pub fn default_output_name() -> String {
    format!("recording-{}.mp3", chrono::Utc::now().timestamp_millis())
}

/// Start recording into `output_path`
///
/// `None` means the user dismissed the save dialog.
pub fn start_recording(
    state: &RecorderState,
    output_path: Option<PathBuf>,
    device: Option<DeviceSelector>,
) -> StartResponse {
    let result = output_path
        .ok_or(RecorderError::UserCancelled)
        .and_then(|path| state.manager.start(path, device));

    match result {
        Ok(started) => StartResponse {
            success: true,
            path: Some(started.output_path),
            fallback: started.fallback,
            error: None,
        },
        Err(e) => {
            if !matches!(e, RecorderError::UserCancelled) {
                tracing::error!("start_recording failed: {}", e);
            }
            StartResponse {
                success: false,
                path: None,
                fallback: None,
                error: Some(e.into()),
            }
        }
    }
}

/// Stop the current recording
///
/// Success only means the stop was accepted; the result of the recording
/// arrives as an event.
pub fn stop_recording(state: &RecorderState) -> StopResponse {
    match state.manager.stop() {
        Ok(()) => StopResponse {
            success: true,
            error: None,
        },
        Err(e) => StopResponse {
            success: false,
            error: Some(e.into()),
        },
    }
}

pub fn is_recording(state: &RecorderState) -> bool {
    state.manager.is_recording()
}

pub fn get_recording_state(state: &RecorderState) -> SessionState {
    state.manager.state()
}

/// Subscribe to recording events
pub fn recording_events(state: &RecorderState) -> broadcast::Receiver<RecordingEvent> {
    state.manager.subscribe()
}

/// List the capture devices the encoder reports
pub async fn list_audio_devices(state: &RecorderState) -> ListDevicesResponse {
    match state.manager.list_devices().await {
        Ok(listing) => ListDevicesResponse {
            success: true,
            platform: Some(listing.platform),
            raw_text: Some(listing.raw_text),
            parsed_devices: listing.parsed_devices,
            error: None,
        },
        Err(e) => {
            tracing::error!("list_audio_devices failed: {}", e);
            ListDevicesResponse {
                success: false,
                platform: Some(state.manager.platform().clone()),
                raw_text: None,
                parsed_devices: None,
                error: Some(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn state_without_encoder(dir: &std::path::Path) -> RecorderState {
        RecorderState::new(&RecorderConfig {
            encoder_path: Some(dir.join("missing-ffmpeg")),
            platform: Some(CapturePlatform::MacOs),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_cancelled_picker() {
        let dir = tempdir().unwrap();
        let state = state_without_encoder(dir.path());

        let response = start_recording(&state, None, None);
        assert!(!response.success);
        let error = response.error.unwrap();
        assert_eq!(error.code, "USER_CANCELLED");
        assert_eq!(error.message, "Cancelled by user");
        assert!(!is_recording(&state));
    }

    #[tokio::test]
    async fn test_start_without_encoder() {
        let dir = tempdir().unwrap();
        let state = state_without_encoder(dir.path());

        let response = start_recording(&state, Some(dir.path().join("a.mp3")), None);
        assert!(!response.success);
        assert_eq!(response.error.unwrap().code, "BINARY_MISSING");
        assert_eq!(get_recording_state(&state), SessionState::Idle);
    }

    #[test]
    fn test_stop_when_idle() {
        let dir = tempdir().unwrap();
        let state = state_without_encoder(dir.path());

        let response = stop_recording(&state);
        assert!(!response.success);
        assert_eq!(response.error.unwrap().code, "NOT_ACTIVE");
    }

    #[tokio::test]
    async fn test_list_devices_without_encoder() {
        let dir = tempdir().unwrap();
        let state = state_without_encoder(dir.path());

        let response = list_audio_devices(&state).await;
        assert!(!response.success);
        assert_eq!(response.platform, Some(CapturePlatform::MacOs));
        assert!(response.raw_text.is_none());

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("rawText").is_none());
        assert_eq!(json["error"]["code"], "BINARY_MISSING");
    }

    #[test]
    fn test_start_response_serializes_fallback() {
        let response = StartResponse {
            success: true,
            path: Some(PathBuf::from("C:\\rec.mp3")),
            fallback: Some(crate::encoder::args::select_fallback_device(2)),
            error: None,
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["fallback"]["index"], 2);
        assert_eq!(json["fallback"]["total"], 8);
        assert_eq!(json["fallback"]["deviceName"], "Stereo Mix");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_default_output_name() {
        let name = default_output_name();
        assert!(name.starts_with("recording-"));
        assert!(name.ends_with(".mp3"));
    }
}
