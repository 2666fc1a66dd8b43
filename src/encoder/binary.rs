//! FFmpeg binary resolution
//!
//! Packaged builds ship FFmpeg next to the application resources; development
//! builds use whatever FFmpeg is on PATH.

use crate::config::RecorderConfig;
use crate::utils::error::{RecorderError, RecorderResult};
use std::path::{Path, PathBuf};

#[cfg(windows)]
const FFMPEG_BINARY: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const FFMPEG_BINARY: &str = "ffmpeg";

/// Locates the encoder executable
#[derive(Debug, Clone)]
pub struct EncoderLocator {
    explicit_path: Option<PathBuf>,
    packaged: bool,
    resources_dir: Option<PathBuf>,
}

impl EncoderLocator {
    pub fn new(explicit_path: Option<PathBuf>, packaged: bool, resources_dir: Option<PathBuf>) -> Self {
        Self {
            explicit_path,
            packaged,
            resources_dir,
        }
    }

    pub fn from_config(config: &RecorderConfig) -> Self {
        Self::new(
            config.encoder_path.clone(),
            config.packaged,
            config.resources_dir.clone(),
        )
    }

    /// Resolve the path the encoder is expected at. The path may not exist.
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.explicit_path {
            return path.clone();
        }

        if self.packaged {
            let resources = self.resources_dir.clone().unwrap_or_else(default_resources_dir);
            return resolve_packaged(&resources, std::env::consts::OS, std::env::consts::ARCH);
        }

        which::which(FFMPEG_BINARY).unwrap_or_else(|_| PathBuf::from(FFMPEG_BINARY))
    }

    /// Resolve the encoder and fail with a remediation hint if it is absent
    pub fn validate(&self) -> RecorderResult<PathBuf> {
        let path = self.resolve();
        if exists(&path) {
            return Ok(path);
        }

        let hint = if self.packaged {
            "The bundled FFmpeg is missing. Reinstall the application.".to_string()
        } else {
            "Install FFmpeg and make sure it is on PATH, or set encoderPath in the config."
                .to_string()
        };

        tracing::error!("FFmpeg not found: {:?}", path);
        Err(RecorderError::BinaryMissing { path, hint })
    }
}

pub fn exists(path: &Path) -> bool {
    path.is_file()
}

/// Packaged layout: `ffmpeg/<os>-<arch>/ffmpeg`, with `ffmpeg/bin/<os>/<arch>/ffmpeg`
/// used by some bundles. The primary path is returned when neither exists.
fn resolve_packaged(resources: &Path, os: &str, arch: &str) -> PathBuf {
    let primary = resources
        .join("ffmpeg")
        .join(format!("{}-{}", os, arch))
        .join(FFMPEG_BINARY);

    if exists(&primary) {
        return primary;
    }

    let alternate = resources
        .join("ffmpeg")
        .join("bin")
        .join(os)
        .join(arch)
        .join(FFMPEG_BINARY);

    if exists(&alternate) {
        tracing::debug!("Using alternate FFmpeg location {:?}", alternate);
        return alternate;
    }

    primary
}

fn default_resources_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("resources")))
        .unwrap_or_else(|| PathBuf::from("resources"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_packaged_primary_layout() {
        let dir = tempdir().unwrap();
        let primary = dir.path().join("ffmpeg").join("macos-aarch64");
        fs::create_dir_all(&primary).unwrap();
        fs::write(primary.join(FFMPEG_BINARY), b"").unwrap();

        let resolved = resolve_packaged(dir.path(), "macos", "aarch64");
        assert_eq!(resolved, primary.join(FFMPEG_BINARY));
    }

    #[test]
    fn test_packaged_alternate_layout() {
        let dir = tempdir().unwrap();
        let alternate = dir.path().join("ffmpeg").join("bin").join("windows").join("x86_64");
        fs::create_dir_all(&alternate).unwrap();
        fs::write(alternate.join(FFMPEG_BINARY), b"").unwrap();

        let resolved = resolve_packaged(dir.path(), "windows", "x86_64");
        assert_eq!(resolved, alternate.join(FFMPEG_BINARY));
    }

    #[test]
    fn test_packaged_missing_returns_primary() {
        let dir = tempdir().unwrap();
        let resolved = resolve_packaged(dir.path(), "macos", "x86_64");
        assert!(resolved.ends_with(Path::new("ffmpeg").join("macos-x86_64").join(FFMPEG_BINARY)));
    }

    #[test]
    fn test_validate_missing_packaged_binary() {
        let dir = tempdir().unwrap();
        let locator = EncoderLocator::new(None, true, Some(dir.path().to_path_buf()));

        match locator.validate() {
            Err(RecorderError::BinaryMissing { hint, .. }) => assert!(hint.contains("Reinstall")),
            other => panic!("expected BinaryMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_path_wins() {
        let dir = tempdir().unwrap();
        let binary = dir.path().join("my-ffmpeg");
        fs::write(&binary, b"").unwrap();

        let locator = EncoderLocator::new(Some(binary.clone()), true, None);
        assert_eq!(locator.validate().unwrap(), binary);
    }
}
