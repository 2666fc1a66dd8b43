//! Error types and handling
//!
//! Errors returned synchronously by the recorder's caller-facing operations.
//! Failures that only become known when the encoder exits are reported through
//! [`crate::recorder::TerminationOutcome`] instead.

use crate::encoder::ArgsError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Recorder-wide error type
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Cancelled by user")]
    UserCancelled,

    #[error("A recording is already in progress")]
    AlreadyActive,

    #[error("No recording is in progress")]
    NotActive,

    #[error("FFmpeg not found at {path}. {hint}")]
    BinaryMissing { path: PathBuf, hint: String },

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Output path must not be empty")]
    EmptyOutputPath,

    #[error("Failed to start the recording process: {0}")]
    SpawnFailure(std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ArgsError> for RecorderError {
    fn from(error: ArgsError) -> Self {
        match error {
            ArgsError::UnsupportedPlatform(name) => RecorderError::UnsupportedPlatform(name),
            ArgsError::EmptyOutputPath => RecorderError::EmptyOutputPath,
        }
    }
}

/// Error response for callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<RecorderError> for ErrorResponse {
    fn from(error: RecorderError) -> Self {
        let code = match &error {
            RecorderError::UserCancelled => "USER_CANCELLED",
            RecorderError::AlreadyActive => "ALREADY_ACTIVE",
            RecorderError::NotActive => "NOT_ACTIVE",
            RecorderError::BinaryMissing { .. } => "BINARY_MISSING",
            RecorderError::UnsupportedPlatform(_) => "UNSUPPORTED_PLATFORM",
            RecorderError::EmptyOutputPath => "EMPTY_OUTPUT_PATH",
            RecorderError::SpawnFailure(_) => "SPAWN_FAILURE",
            RecorderError::Io(_) => "IO_ERROR",
            RecorderError::Serialization(_) => "SERIALIZATION_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
