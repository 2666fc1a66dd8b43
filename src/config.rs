//! Recorder configuration
//!
//! Loaded from an optional JSON file; every field has a default so an empty
//! object is a valid configuration.

use crate::capture::CapturePlatform;
use crate::utils::error::RecorderResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the encoder path
pub const ENCODER_ENV_VAR: &str = "LOOPBACK_RECORDER_ENCODER";

/// Time given to the encoder to quit on its own before it is interrupted
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 2000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecorderConfig {
    /// Explicit encoder binary, skipping resolution
    pub encoder_path: Option<PathBuf>,

    /// Whether the application runs from a packaged build
    pub packaged: bool,

    /// Bundled resources root for packaged builds
    pub resources_dir: Option<PathBuf>,

    /// Grace interval between the quit command and the interrupt signal
    pub grace_period_ms: u64,

    /// Override of the detected host platform
    pub platform: Option<CapturePlatform>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            encoder_path: None,
            packaged: false,
            resources_dir: None,
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
            platform: None,
        }
    }
}

impl RecorderConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> RecorderResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;

        tracing::debug!("Loaded recorder config from {:?}", path);

        Ok(config)
    }

    /// Apply environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(path) = std::env::var_os(ENCODER_ENV_VAR) {
            if !path.is_empty() {
                self.encoder_path = Some(PathBuf::from(path));
            }
        }
        self
    }

    pub fn platform(&self) -> CapturePlatform {
        self.platform.clone().unwrap_or_else(CapturePlatform::current)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config: RecorderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.grace_period_ms, DEFAULT_GRACE_PERIOD_MS);
        assert!(!config.packaged);
        assert!(config.encoder_path.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recorder.json");
        std::fs::write(
            &path,
            r#"{"encoderPath":"/opt/ffmpeg","gracePeriodMs":500,"platform":{"os":"macos"}}"#,
        )
        .unwrap();

        let config = RecorderConfig::load(&path).unwrap();
        assert_eq!(config.encoder_path, Some(PathBuf::from("/opt/ffmpeg")));
        assert_eq!(config.grace_period(), Duration::from_millis(500));
        assert_eq!(config.platform(), CapturePlatform::MacOs);
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(RecorderConfig::load(&path).is_err());
    }
}
